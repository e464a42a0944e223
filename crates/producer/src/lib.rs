// Rust guideline compliant 2026-10-10

//! Producer component: publishes one fraud-analysis event per newly created
//! transaction through a shared [`ConnectionManager`].
//!
//! Entry point: [`Producer::publish`]. The [`generator`] module builds random
//! transaction requests for load testing.

pub mod generator;

use std::sync::Arc;

use broker::ConnectionManager;
use domain::{
    AnalysisEvent, BrokerError, Connector, SerializationError, Transaction, TransactionId,
    TransactionStatus,
};

// ---------------------------------------------------------------------------
// ProducerError
// ---------------------------------------------------------------------------

/// Errors that can occur while publishing an analysis event.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// The broker stayed unavailable after one reconnect.
    #[error("broker error: {source}")]
    Broker {
        /// The underlying broker error.
        #[from]
        source: BrokerError,
    },
    /// The event could not be encoded.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    /// Only PENDING transactions are submitted for analysis.
    #[error("transaction {id} is {status}, not PENDING")]
    NotPending {
        /// Transaction id.
        id: TransactionId,
        /// Its current status.
        status: TransactionStatus,
    },
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Publishes analysis events. Cheap to clone; clones share the connection.
#[derive(Debug)]
pub struct Producer<C: Connector> {
    broker: Arc<ConnectionManager<C>>,
}

impl<C: Connector> Clone for Producer<C> {
    fn clone(&self) -> Self {
        Self { broker: Arc::clone(&self.broker) }
    }
}

impl<C: Connector> Producer<C> {
    /// Create a producer on top of a shared connection manager.
    #[must_use]
    pub fn new(broker: Arc<ConnectionManager<C>>) -> Self {
        Self { broker }
    }

    /// The connection manager this producer publishes through.
    #[must_use]
    pub fn broker(&self) -> &Arc<ConnectionManager<C>> {
        &self.broker
    }

    /// Publish the analysis event for `tx`.
    ///
    /// Call only after the transaction is committed. A lost channel triggers
    /// exactly one reconnect (under the manager's retry policy) and one
    /// retry; the store is never rolled back on failure.
    ///
    /// # Errors
    ///
    /// - [`ProducerError::NotPending`] if `tx` is already settled.
    /// - [`ProducerError::Serialization`] if the event cannot be encoded.
    /// - [`ProducerError::Broker`] if the broker stays unavailable.
    pub async fn publish(&self, tx: &Transaction) -> Result<(), ProducerError> {
        if tx.status != TransactionStatus::Pending {
            return Err(ProducerError::NotPending { id: tx.id, status: tx.status });
        }
        let payload = AnalysisEvent::from(tx).encode()?;

        match self.broker.publish(&payload).await {
            Ok(()) => {}
            Err(BrokerError::ChannelClosed) => {
                tracing::warn!(id = tx.id, "producer.publish.reconnecting");
                self.broker.connect().await.inspect_err(|error| {
                    tracing::error!(id = tx.id, %error, "producer.publish.failed");
                })?;
                self.broker.publish(&payload).await.inspect_err(|error| {
                    tracing::error!(id = tx.id, %error, "producer.publish.failed");
                })?;
            }
            Err(error) => {
                tracing::error!(id = tx.id, %error, "producer.publish.failed");
                return Err(error.into());
            }
        }

        tracing::info!(id = tx.id, queue = %self.broker.queue(), "producer.event.published");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
