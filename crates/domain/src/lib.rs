// Rust guideline compliant 2026-10-09

//! Shared domain types for the transaction fraud pipeline.
//!
//! Defines `Transaction`, `TransactionStatus`, `Verdict`, `ConnectionState`,
//! the fraud-analysis wire event ([`AnalysisEvent`]), the error taxonomy, and
//! the hexagonal port traits in [`ports`]. All pipeline crates depend on this
//! crate; no pipeline crate is imported here.

mod event;
pub mod ports;

pub use event::AnalysisEvent;
pub use ports::{
    BrokerChannel, Connector, Delivery, StatusCallback, TransactionRepository,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned transaction identifier.
pub type TransactionId = i64;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Lifecycle status of a transaction.
///
/// Starts at `Pending` and moves exactly once to a terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    /// Created, awaiting fraud analysis.
    Pending,
    /// Analysis found no triggered rule.
    Approved,
    /// At least one rule triggered.
    Rejected,
}

impl TransactionStatus {
    /// Wire and storage representation (`"PENDING"`, `"APPROVED"`, `"REJECTED"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// `true` for `Approved` and `Rejected`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(StoreError::Invalid {
                reason: format!("unknown transaction status {other:?}"),
            }),
        }
    }
}

/// A persisted financial transaction.
///
/// Serialized with the field names of the external message and HTTP schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identifier.
    pub id: TransactionId,
    /// Origin account.
    #[serde(rename = "cuenta_origen")]
    pub origin_account: String,
    /// Destination account.
    #[serde(rename = "cuenta_destino")]
    pub destination_account: String,
    /// Non-negative amount.
    #[serde(rename = "monto")]
    pub amount: f64,
    /// Free-text location (e.g. `"Madrid"`).
    #[serde(rename = "ubicacion")]
    pub location: String,
    /// Creation time, stamped by the store.
    #[serde(rename = "hora")]
    pub created_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: TransactionStatus,
}

/// Caller-supplied fields for a transaction that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Origin account.
    #[serde(rename = "cuenta_origen")]
    pub origin_account: String,
    /// Destination account.
    #[serde(rename = "cuenta_destino")]
    pub destination_account: String,
    /// Amount; must be finite and non-negative.
    #[serde(rename = "monto")]
    pub amount: f64,
    /// Free-text location.
    #[serde(rename = "ubicacion")]
    pub location: String,
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Identifier of a fraud rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RuleId {
    /// Amount above the configured threshold.
    HighAmount,
    /// Location in the configured risk set.
    RiskyLocation,
    /// Hour of day inside the configured risk window.
    RiskyHour,
}

impl RuleId {
    /// Human-readable rule name (`"high amount"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighAmount => "high amount",
            Self::RiskyLocation => "risky location",
            Self::RiskyHour => "risky hour",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating every rule against one event.
///
/// The final status is derived: `Rejected` iff at least one rule triggered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verdict {
    triggered: Vec<RuleId>,
}

impl Verdict {
    /// Build a verdict from the rules that triggered, in evaluation order.
    #[must_use]
    pub fn new(triggered: Vec<RuleId>) -> Self {
        Self { triggered }
    }

    /// Rules that triggered; empty for an approved transaction.
    #[must_use]
    pub fn triggered(&self) -> &[RuleId] {
        &self.triggered
    }

    /// `true` if `rule` is in the triggered set.
    #[must_use]
    pub fn has(&self, rule: RuleId) -> bool {
        self.triggered.contains(&rule)
    }

    /// Final terminal status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        if self.triggered.is_empty() {
            TransactionStatus::Approved
        } else {
            TransactionStatus::Rejected
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// State of the broker connection, owned by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    /// No open channel; the next use starts a connect cycle.
    Disconnected,
    /// A connect cycle is in progress.
    Connecting,
    /// Channel open and queue declared.
    Connected,
    /// The last connect cycle exhausted its attempts.
    Failed,
}

impl ConnectionState {
    /// Upper-case label used in logs and health output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the broker ports and the connection manager.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    /// Connection attempts exhausted.
    #[error("broker unreachable after {attempts} attempt(s)")]
    Unreachable {
        /// Number of attempts made.
        attempts: u32,
    },
    /// A single connection attempt failed.
    #[error("broker connection failed: {reason}")]
    Connect {
        /// Human-readable description.
        reason: String,
    },
    /// The channel or its connection is not open.
    #[error("broker channel closed")]
    ChannelClosed,
    /// The broker rejected an operation on an open channel.
    #[error("broker protocol error: {reason}")]
    Protocol {
        /// Human-readable description.
        reason: String,
    },
}

/// An analysis event could not be encoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("event serialization failed: {reason}")]
pub struct SerializationError {
    /// Human-readable description.
    pub reason: String,
}

/// A received payload does not match the event schema.
///
/// Such a message never becomes valid; it is acknowledged and dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed message: {reason}")]
pub struct MalformedMessage {
    /// Human-readable description.
    pub reason: String,
}

/// Failures of the status-update callback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallbackError {
    /// The store does not know the transaction.
    #[error("transaction {id} not found")]
    NotFound {
        /// Transaction id sent.
        id: TransactionId,
    },
    /// Any other non-2xx response.
    #[error("unexpected status {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },
    /// No response within the configured timeout.
    #[error("status callback timed out")]
    Timeout,
    /// Connection-level failure.
    #[error("status callback transport error: {reason}")]
    Transport {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the transaction store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// No transaction with this id.
    #[error("transaction {id} not found")]
    NotFound {
        /// Requested id.
        id: TransactionId,
    },
    /// Status change not allowed by the lifecycle.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: TransactionStatus,
        /// Requested status.
        to: TransactionStatus,
    },
    /// Input rejected by validation.
    #[error("invalid transaction: {reason}")]
    Invalid {
        /// Human-readable description.
        reason: String,
    },
    /// The storage backend failed.
    #[error("storage backend error: {reason}")]
    Backend {
        /// Human-readable description.
        reason: String,
    },
}
