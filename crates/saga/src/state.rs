//! Saga phases, outcomes, and working-set entry states.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The phase a saga run has reached.
///
/// ```text
/// Started ──► Reserving ──► Confirming ──► Closing ──► Completed
/// ```
/// A failed run stops in the phase where the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaPhase {
    /// Invoice loaded, no remote call made yet.
    #[default]
    Started,
    Reserving,
    Confirming,
    Closing,
    Completed,
}

impl SagaPhase {
    /// Returns true once every confirmation has gone through.
    ///
    /// From here on the run is committed and is no longer abandoned on
    /// cancellation.
    pub fn is_committed(&self) -> bool {
        matches!(self, SagaPhase::Closing | SagaPhase::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaPhase::Started => "started",
            SagaPhase::Reserving => "reserving",
            SagaPhase::Confirming => "confirming",
            SagaPhase::Closing => "closing",
            SagaPhase::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(SagaPhase::Started),
            "reserving" => Ok(SagaPhase::Reserving),
            "confirming" => Ok(SagaPhase::Confirming),
            "closing" => Ok(SagaPhase::Closing),
            "completed" => Ok(SagaPhase::Completed),
            other => Err(format!("unknown saga phase: {other}")),
        }
    }
}

/// Terminal outcome of one saga run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaOutcome {
    /// Every line reserved and confirmed, invoice closed.
    Success,
    /// A reservation failed; prior reservations were cancel-attempted.
    FailedAtReservation,
    /// A confirmation failed; some lines may be confirmed, the rest were
    /// cancel-attempted.
    FailedAtConfirmation,
    /// All lines confirmed but the invoice could not be closed.
    FailedAtClose,
    /// The caller cancelled the run before it committed.
    Cancelled,
}

impl SagaOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SagaOutcome::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaOutcome::Success => "success",
            SagaOutcome::FailedAtReservation => "failed_at_reservation",
            SagaOutcome::FailedAtConfirmation => "failed_at_confirmation",
            SagaOutcome::FailedAtClose => "failed_at_close",
            SagaOutcome::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SagaOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where one working-set entry stands with the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Reserved,
    Confirmed,
    /// Reservation released by a compensating cancel.
    Cancelled,
}
