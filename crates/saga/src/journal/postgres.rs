use async_trait::async_trait;
use billing::InvoiceId;
use common::SagaId;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{InFlightCall, JournalEntry, SagaJournal};
use crate::error::JournalError;
use crate::report::WorkingEntry;
use crate::state::SagaPhase;

/// PostgreSQL-backed saga journal on the `saga_journal` table.
///
/// The table is created by the billing migrations.
#[derive(Clone)]
pub struct PostgresSagaJournal {
    pool: PgPool,
}

impl PostgresSagaJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: PgRow) -> Result<JournalEntry, JournalError> {
        let invoice_id = InvoiceId::new(row.try_get("invoice_id")?);
        let phase: String = row.try_get("phase")?;
        let phase = phase
            .parse::<SagaPhase>()
            .map_err(|reason| JournalError::Corrupt { invoice_id, reason })?;

        let entries: Vec<WorkingEntry> = serde_json::from_value(row.try_get("entries")?)?;
        let in_flight: Option<serde_json::Value> = row.try_get("in_flight")?;
        let in_flight: Option<InFlightCall> = in_flight.map(serde_json::from_value).transpose()?;

        Ok(JournalEntry {
            invoice_id,
            saga_id: SagaId::from_uuid(row.try_get("saga_id")?),
            phase,
            entries,
            in_flight,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl SagaJournal for PostgresSagaJournal {
    async fn record(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let entries = serde_json::to_value(&entry.entries)?;
        let in_flight = entry.in_flight.map(serde_json::to_value).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO saga_journal (invoice_id, saga_id, phase, entries, in_flight, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (invoice_id) DO UPDATE
            SET saga_id = EXCLUDED.saga_id,
                phase = EXCLUDED.phase,
                entries = EXCLUDED.entries,
                in_flight = EXCLUDED.in_flight,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(entry.invoice_id.as_i64())
        .bind(entry.saga_id.as_uuid())
        .bind(entry.phase.as_str())
        .bind(entries)
        .bind(in_flight)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, invoice_id: InvoiceId) -> Result<(), JournalError> {
        sqlx::query("DELETE FROM saga_journal WHERE invoice_id = $1")
            .bind(invoice_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let rows = sqlx::query(
            r#"
            SELECT invoice_id, saga_id, phase, entries, in_flight, updated_at
            FROM saga_journal
            ORDER BY invoice_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}
