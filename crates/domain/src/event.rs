// Rust guideline compliant 2026-10-09

//! Fraud-analysis event: the message published for each new transaction.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::{MalformedMessage, SerializationError, Transaction, TransactionId};

/// Immutable snapshot of a transaction, sufficient for rule evaluation.
///
/// Wire form is a JSON object using the external field names
/// (`id`, `cuenta_origen`, `cuenta_destino`, `monto`, `ubicacion`, `hora`,
/// `status`). Only `id`, `monto`, `ubicacion` and `hora` are required on
/// receipt. `hora` stays a string: a malformed timestamp must not make the
/// whole message unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    /// Transaction id; `id_transaccion` is accepted from older producers.
    #[serde(alias = "id_transaccion")]
    pub id: TransactionId,
    /// Origin account, informational.
    #[serde(rename = "cuenta_origen", default, skip_serializing_if = "Option::is_none")]
    pub origin_account: Option<String>,
    /// Destination account, informational.
    #[serde(rename = "cuenta_destino", default, skip_serializing_if = "Option::is_none")]
    pub destination_account: Option<String>,
    /// Transaction amount.
    #[serde(rename = "monto")]
    pub amount: f64,
    /// Free-text location.
    #[serde(rename = "ubicacion")]
    pub location: String,
    /// ISO-8601 creation timestamp.
    #[serde(rename = "hora")]
    pub timestamp: String,
    /// Status at publish time, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AnalysisEvent {
    /// Parse and validate a received payload.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedMessage`] when the payload is not JSON, misses a
    /// required field, carries a non-positive id, or a negative amount.
    pub fn decode(payload: &[u8]) -> Result<Self, MalformedMessage> {
        let event: Self = serde_json::from_slice(payload).map_err(|e| MalformedMessage {
            reason: e.to_string(),
        })?;
        if event.id <= 0 {
            return Err(MalformedMessage {
                reason: format!("transaction id must be positive, got {}", event.id),
            });
        }
        if event.amount < 0.0 {
            return Err(MalformedMessage {
                reason: format!("amount must be non-negative, got {}", event.amount),
            });
        }
        Ok(event)
    }

    /// Serialize to the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if `serde_json` fails, which does not
    /// happen for finite amounts.
    pub fn encode(&self) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(self).map_err(|e| SerializationError { reason: e.to_string() })
    }
}

impl From<&Transaction> for AnalysisEvent {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            origin_account: Some(tx.origin_account.clone()),
            destination_account: Some(tx.destination_account.clone()),
            amount: tx.amount,
            location: tx.location.clone(),
            timestamp: tx.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            status: Some(tx.status.as_str().to_owned()),
        }
    }
}
