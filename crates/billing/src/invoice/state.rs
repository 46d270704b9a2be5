//! Invoice status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an invoice.
///
/// ```text
/// Open ──► Closed
/// ```
/// Closing is one-way; a closed invoice accepts no further changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    #[default]
    Open,
    Closed,
}

impl InvoiceStatus {
    /// Returns true if items can still be added.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, InvoiceStatus::Open)
    }

    /// Returns the stored / wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "OPEN",
            InvoiceStatus::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a stored status string is not recognised.
#[derive(Debug, thiserror::Error)]
#[error("unknown invoice status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(InvoiceStatus::Open),
            "CLOSED" => Ok(InvoiceStatus::Closed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
