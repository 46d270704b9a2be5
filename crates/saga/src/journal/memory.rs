use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use billing::InvoiceId;
use tokio::sync::RwLock;

use super::{JournalEntry, SagaJournal};
use crate::error::JournalError;

/// In-memory saga journal.
///
/// Only live entries are kept. A journal built with
/// [`InMemorySagaJournal::with_history`] also keeps every write in order,
/// which lets tests check that state was journaled before each call.
#[derive(Debug, Clone, Default)]
pub struct InMemorySagaJournal {
    entries: Arc<RwLock<BTreeMap<InvoiceId, JournalEntry>>>,
    history: Option<Arc<RwLock<Vec<JournalEntry>>>>,
}

impl InMemorySagaJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal that also records every write. The log is never
    /// trimmed.
    pub fn with_history() -> Self {
        Self {
            entries: Arc::default(),
            history: Some(Arc::default()),
        }
    }

    /// Returns every entry written so far, oldest first. Always empty
    /// unless built with [`InMemorySagaJournal::with_history`].
    pub async fn history(&self) -> Vec<JournalEntry> {
        match &self.history {
            Some(history) => history.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// Returns the live entry for an invoice.
    pub async fn get(&self, invoice_id: InvoiceId) -> Option<JournalEntry> {
        self.entries.read().await.get(&invoice_id).cloned()
    }
}

#[async_trait]
impl SagaJournal for InMemorySagaJournal {
    async fn record(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        self.entries
            .write()
            .await
            .insert(entry.invoice_id, entry.clone());
        if let Some(history) = &self.history {
            history.write().await.push(entry.clone());
        }
        Ok(())
    }

    async fn clear(&self, invoice_id: InvoiceId) -> Result<(), JournalError> {
        self.entries.write().await.remove(&invoice_id);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<JournalEntry>, JournalError> {
        Ok(self.entries.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SagaPhase;
    use chrono::Utc;
    use common::SagaId;

    fn entry(invoice_id: i64, phase: SagaPhase) -> JournalEntry {
        JournalEntry {
            invoice_id: InvoiceId::new(invoice_id),
            saga_id: SagaId::new(),
            phase,
            entries: Vec::new(),
            in_flight: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_replaces_and_clear_removes() {
        let journal = InMemorySagaJournal::with_history();
        journal
            .record(&entry(1, SagaPhase::Reserving))
            .await
            .unwrap();
        journal
            .record(&entry(1, SagaPhase::Confirming))
            .await
            .unwrap();
        journal
            .record(&entry(2, SagaPhase::Reserving))
            .await
            .unwrap();

        let pending = journal.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].phase, SagaPhase::Confirming);
        assert_eq!(journal.history().await.len(), 3);

        journal.clear(InvoiceId::new(1)).await.unwrap();
        journal.clear(InvoiceId::new(9)).await.unwrap();
        assert!(journal.get(InvoiceId::new(1)).await.is_none());
        assert_eq!(journal.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_default_journal_keeps_no_history() {
        let journal = InMemorySagaJournal::new();
        for _ in 0..3 {
            journal
                .record(&entry(1, SagaPhase::Reserving))
                .await
                .unwrap();
        }
        journal.clear(InvoiceId::new(1)).await.unwrap();

        assert!(journal.history().await.is_empty());
        assert!(journal.pending().await.unwrap().is_empty());
    }
}
