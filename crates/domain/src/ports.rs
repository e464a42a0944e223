// Rust guideline compliant 2026-10-09

//! Hexagonal port traits.
//!
//! Ports on the request path (`Connector`, `BrokerChannel`,
//! `TransactionRepository`) return `Send` futures so they can back axum
//! handlers on a multi-threaded runtime. Ports used only inside the worker's
//! cooperative loop (`Delivery`, `StatusCallback`) use plain `async fn`.

use chrono::{DateTime, Utc};
use futures::Stream;

use crate::{
    BrokerError, CallbackError, NewTransaction, StoreError, Transaction, TransactionId,
    TransactionStatus,
};

/// Opens channels to a message broker.
///
/// One successful `open` yields one logical connection with one channel.
pub trait Connector: Send + Sync {
    /// Channel type produced by this connector.
    type Channel: BrokerChannel;

    /// Open a connection and a channel on it.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connect`] when the broker cannot be reached.
    fn open(&self) -> impl Future<Output = Result<Self::Channel, BrokerError>> + Send;
}

/// An open broker channel.
pub trait BrokerChannel: Send + Sync {
    /// A single received message.
    type Delivery: Delivery + Send;
    /// Stream of deliveries for one consumer subscription.
    type Deliveries: Stream<Item = Result<Self::Delivery, BrokerError>> + Send + Unpin;

    /// `true` while both the channel and its connection are open.
    fn is_open(&self) -> bool;

    /// Declare `queue` as durable. Idempotent for matching properties.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClosed`] or [`BrokerError::Protocol`].
    fn declare_queue(&self, queue: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Limit the number of unacknowledged deliveries on this channel.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClosed`] or [`BrokerError::Protocol`].
    fn set_prefetch(&self, count: u16) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Publish `payload` as a persistent message routed directly to `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClosed`] if the channel is not open, or
    /// [`BrokerError::Protocol`] if the broker refuses the message.
    fn publish(
        &self,
        queue: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Subscribe to `queue` with manual acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClosed`] or [`BrokerError::Protocol`].
    fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> impl Future<Output = Result<Self::Deliveries, BrokerError>> + Send;

    /// Close the channel and its connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Protocol`] if the close handshake fails.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A message received from the broker, pending acknowledgement.
#[expect(
    async_fn_in_trait,
    reason = "settled inside one cooperative worker loop; no Send bound needed"
)]
pub trait Delivery {
    /// Raw message body.
    fn payload(&self) -> &[u8];

    /// `true` if the broker delivered this message before.
    fn redelivered(&self) -> bool;

    /// Remove the message from the queue permanently.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClosed`] if the channel was lost; the
    /// broker then redelivers the message.
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Return the message to the queue for redelivery.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClosed`] if the channel was lost; the
    /// broker then redelivers the message anyway.
    async fn requeue(&self) -> Result<(), BrokerError>;
}

/// Idempotent status update on the transaction store.
#[expect(
    async_fn_in_trait,
    reason = "called from one cooperative worker loop; no Send bound needed"
)]
pub trait StatusCallback {
    /// Advance transaction `id` to the terminal `status`.
    ///
    /// Succeeds when the store moved from PENDING to `status` or was already
    /// at `status`. Safe to call repeatedly with the same arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError`] for not-found, non-2xx, timeout, or
    /// transport failures.
    async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), CallbackError>;
}

/// Persistence port for the minimal transaction record.
pub trait TransactionRepository: Send + Sync {
    /// Insert a new transaction with status PENDING and assign its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn insert(
        &self,
        new: NewTransaction,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Transaction, StoreError>> + Send;

    /// Look up a transaction by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn find(
        &self,
        id: TransactionId,
    ) -> impl Future<Output = Result<Option<Transaction>, StoreError>> + Send;

    /// Set `status` only if the stored status is still PENDING.
    ///
    /// Returns `true` if a row changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn set_status_if_pending(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// PENDING transactions created strictly before `cutoff`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Transaction>, StoreError>> + Send;
}
