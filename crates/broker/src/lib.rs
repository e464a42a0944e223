// Rust guideline compliant 2026-10-10

//! Connection manager for the fraud-analysis queue.
//!
//! [`ConnectionManager`] owns one logical connection and channel obtained
//! from an injected [`Connector`] port. It declares the durable queue on every
//! (re)connect, retries connection establishment under a [`RetryPolicy`], and
//! drops back to DISCONNECTED when it detects a lost channel so the next
//! caller starts a fresh connect cycle. Callers with a bounded policy that
//! waited behind a cycle which failed get that failure instead of running
//! their own.
//!
//! The [`memory`] module provides an in-process broker adapter.

pub mod memory;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use domain::{BrokerChannel, BrokerError, ConnectionState, Connector};

// ---------------------------------------------------------------------------
// ConnectionConfigError
// ---------------------------------------------------------------------------

/// Errors raised while building a [`ConnectionConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    /// The supplied configuration is invalid.
    #[error("invalid connection configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Connection retry schedule: a fixed delay between attempts, optionally bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    delay: Duration,
}

impl RetryPolicy {
    /// Give up after `attempts` failed attempts (fail-fast callers).
    ///
    /// `attempts` below 1 is treated as 1.
    #[must_use]
    pub fn bounded(attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: Some(attempts.max(1)), delay }
    }

    /// Never give up (long-running consumers).
    #[must_use]
    pub fn unbounded(delay: Duration) -> Self {
        Self { max_attempts: None, delay }
    }

    /// Attempt limit; `None` means unbounded.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Delay between consecutive attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn exhausted_after(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    /// Ten attempts, five seconds apart.
    fn default() -> Self {
        Self::bounded(10, Duration::from_secs(5))
    }
}

// ---------------------------------------------------------------------------
// ConnectionConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`ConnectionManager`].
///
/// Construct via [`ConnectionConfig::builder`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Durable queue declared on every connect.
    pub queue: String,
    /// Schedule used by [`ConnectionManager::connect`].
    pub retry: RetryPolicy,
    /// Unacknowledged-delivery limit applied to each new channel.
    pub prefetch: Option<u16>,
}

/// Builder for [`ConnectionConfig`].
///
/// Obtain via [`ConnectionConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct ConnectionConfigBuilder {
    queue: String,
    retry: RetryPolicy,
    prefetch: Option<u16>,
}

impl ConnectionConfig {
    /// Create a builder. `queue` is the only required parameter.
    ///
    /// Default values: `retry = RetryPolicy::default()`, `prefetch = None`.
    #[must_use]
    pub fn builder(queue: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            queue: queue.into(),
            retry: RetryPolicy::default(),
            prefetch: None,
        }
    }
}

impl ConnectionConfigBuilder {
    /// Override the connect retry schedule.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-channel prefetch limit (consumers only).
    #[must_use]
    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionConfigError::InvalidConfig`] when the queue name is
    /// blank or the prefetch limit is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<ConnectionConfig, ConnectionConfigError> {
        if self.queue.trim().is_empty() {
            return Err(ConnectionConfigError::InvalidConfig {
                reason: "queue name must not be empty".to_owned(),
            });
        }
        if self.prefetch == Some(0) {
            return Err(ConnectionConfigError::InvalidConfig {
                reason: "prefetch must be >= 1".to_owned(),
            });
        }
        Ok(ConnectionConfig {
            queue: self.queue,
            retry: self.retry,
            prefetch: self.prefetch,
        })
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Exhausted connect cycles seen so far.
#[derive(Debug, Clone, Copy, Default)]
struct FailedCycles {
    count: u64,
    last_attempts: u32,
}

/// Owns the single broker channel shared by a producer or a worker.
///
/// Channel operations are serialized by an async mutex; the connection state
/// sits behind its own lock so [`state`](Self::state) never waits on a
/// connect cycle in progress.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: ConnectionConfig,
    channel: tokio::sync::Mutex<Option<C::Channel>>,
    state: Mutex<ConnectionState>,
    failures: Mutex<FailedCycles>,
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager in DISCONNECTED state. No I/O happens until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self {
            connector,
            config,
            channel: tokio::sync::Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            failures: Mutex::new(FailedCycles::default()),
        }
    }

    /// Name of the managed queue.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.config.queue
    }

    /// The configuration this manager was built with.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Snapshot of the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn failed_cycles(&self) -> FailedCycles {
        *self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_failed_cycle(&self, attempts: u32) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.count += 1;
        failures.last_attempts = attempts;
    }

    /// Connect using the configured retry policy.
    ///
    /// A no-op when the channel is already open.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unreachable`] once the policy is exhausted.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        let policy = self.config.retry;
        self.connect_with(&policy).await
    }

    /// Connect using an explicit retry policy.
    ///
    /// Opens a channel, declares the durable queue and applies the prefetch
    /// limit. Failed attempts are spaced by `policy.delay()`.
    ///
    /// With a bounded policy, a caller that waited while another caller's
    /// cycle was exhausted returns that failure without retrying.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unreachable`] once `policy` is exhausted; an
    /// unbounded policy only returns on success.
    pub async fn connect_with(&self, policy: &RetryPolicy) -> Result<(), BrokerError> {
        let seen = self.failed_cycles().count;
        let mut slot = self.channel.lock().await;
        if slot.as_ref().is_some_and(|ch| ch.is_open()) {
            self.set_state(ConnectionState::Connected);
            return Ok(());
        }
        let latest = self.failed_cycles();
        if policy.max_attempts().is_some() && latest.count != seen {
            tracing::debug!(attempts = latest.last_attempts, "broker.connect.skipped");
            return Err(BrokerError::Unreachable { attempts: latest.last_attempts });
        }
        Self::discard(&mut slot).await;

        let mut attempt = 0u32;
        loop {
            attempt = attempt.saturating_add(1);
            self.set_state(ConnectionState::Connecting);
            match self.open_channel().await {
                Ok(channel) => {
                    *slot = Some(channel);
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(attempt, queue = %self.config.queue, "broker.connect.established");
                    return Ok(());
                }
                Err(error) if policy.exhausted_after(attempt) => {
                    self.record_failed_cycle(attempt);
                    self.set_state(ConnectionState::Failed);
                    tracing::error!(attempts = attempt, %error, "broker.connect.exhausted");
                    return Err(BrokerError::Unreachable { attempts: attempt });
                }
                Err(error) => {
                    tracing::warn!(
                        attempt,
                        %error,
                        retry_in_ms = u64::try_from(policy.delay().as_millis()).unwrap_or(u64::MAX),
                        "broker.connect.retrying"
                    );
                    tokio::time::sleep(policy.delay()).await;
                }
            }
        }
    }

    async fn open_channel(&self) -> Result<C::Channel, BrokerError> {
        let channel = self.connector.open().await?;
        let setup = async {
            channel.declare_queue(&self.config.queue).await?;
            if let Some(prefetch) = self.config.prefetch {
                channel.set_prefetch(prefetch).await?;
            }
            Ok::<(), BrokerError>(())
        };
        match setup.await {
            Ok(()) => Ok(channel),
            Err(error) => {
                if let Err(close_error) = channel.close().await {
                    tracing::debug!(%close_error, "broker.connect.cleanup_failed");
                }
                Err(error)
            }
        }
    }

    /// Publish `payload` as a persistent message on the managed queue.
    ///
    /// Does not reconnect: a closed channel moves the manager to
    /// DISCONNECTED and is reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClosed`] if no channel is open, or the
    /// channel's own publish error.
    pub async fn publish(&self, payload: &[u8]) -> Result<(), BrokerError> {
        let mut slot = self.channel.lock().await;
        if !slot.as_ref().is_some_and(|ch| ch.is_open()) {
            self.mark_lost(&mut slot).await;
            return Err(BrokerError::ChannelClosed);
        }
        let result = match slot.as_ref() {
            Some(channel) => channel.publish(&self.config.queue, payload).await,
            None => Err(BrokerError::ChannelClosed),
        };
        if matches!(result, Err(BrokerError::ChannelClosed)) {
            self.mark_lost(&mut slot).await;
        }
        result
    }

    /// Subscribe to the managed queue.
    ///
    /// The returned stream ends when the channel is lost; report that with
    /// [`connection_lost`](Self::connection_lost) and reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClosed`] if no channel is open, or the
    /// channel's own consume error.
    pub async fn consume(
        &self,
        consumer_tag: &str,
    ) -> Result<<C::Channel as BrokerChannel>::Deliveries, BrokerError> {
        let mut slot = self.channel.lock().await;
        if !slot.as_ref().is_some_and(|ch| ch.is_open()) {
            self.mark_lost(&mut slot).await;
            return Err(BrokerError::ChannelClosed);
        }
        let result = match slot.as_ref() {
            Some(channel) => channel.consume(&self.config.queue, consumer_tag).await,
            None => Err(BrokerError::ChannelClosed),
        };
        if matches!(result, Err(BrokerError::ChannelClosed)) {
            self.mark_lost(&mut slot).await;
        }
        result
    }

    /// Record that the channel was observed lost (e.g. a delivery stream ended).
    pub async fn connection_lost(&self) {
        let mut slot = self.channel.lock().await;
        self.mark_lost(&mut slot).await;
    }

    async fn mark_lost(&self, slot: &mut Option<C::Channel>) {
        Self::discard(slot).await;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ConnectionState::Connected {
            tracing::warn!(queue = %self.config.queue, "broker.connection.lost");
        }
        if *state != ConnectionState::Failed {
            *state = ConnectionState::Disconnected;
        }
    }

    /// Close and drop the channel in `slot`, if any.
    async fn discard(slot: &mut Option<C::Channel>) {
        if let Some(channel) = slot.take()
            && let Err(error) = channel.close().await
        {
            tracing::warn!(%error, "broker.close.failed");
        }
    }

    /// Close the channel and connection. Idempotent.
    pub async fn close(&self) {
        let mut slot = self.channel.lock().await;
        Self::discard(&mut slot).await;
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(queue = %self.config.queue, "broker.closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{ConnectionConfig, ConnectionConfigError, ConnectionManager, RetryPolicy};
    use crate::memory::MemoryBroker;
    use domain::{BrokerError, ConnectionState};
    use std::time::Duration;

    const QUEUE: &str = "cola_analisis_fraude";

    fn make_manager(broker: &MemoryBroker, attempts: u32) -> ConnectionManager<MemoryBroker> {
        let config = ConnectionConfig::builder(QUEUE)
            .retry(RetryPolicy::bounded(attempts, Duration::ZERO))
            .prefetch(10)
            .build()
            .unwrap();
        ConnectionManager::new(broker.clone(), config)
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    #[test]
    fn config_rejects_blank_queue() {
        let result = ConnectionConfig::builder("  ").build();
        assert!(matches!(result, Err(ConnectionConfigError::InvalidConfig { .. })));
    }

    #[test]
    fn config_rejects_zero_prefetch() {
        let result = ConnectionConfig::builder(QUEUE).prefetch(0).build();
        assert!(matches!(result, Err(ConnectionConfigError::InvalidConfig { .. })));
    }

    #[test]
    fn default_retry_policy_is_ten_by_five_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), Some(10));
        assert_eq!(policy.delay(), Duration::from_secs(5));
        assert_eq!(RetryPolicy::bounded(0, Duration::ZERO).max_attempts(), Some(1));
        assert_eq!(RetryPolicy::unbounded(Duration::ZERO).max_attempts(), None);
    }

    // ------------------------------------------------------------------
    // connect
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn starts_disconnected() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 3);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(broker.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn connect_declares_queue_and_applies_prefetch() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 3);
        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(broker.is_declared(QUEUE));
        assert_eq!(broker.prefetch(), Some(10));
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_open() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 3);
        manager.connect().await.unwrap();
        manager.connect().await.unwrap();
        assert_eq!(broker.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn connect_retries_until_success() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(2);
        let manager = make_manager(&broker, 3);
        manager.connect().await.unwrap();
        assert_eq!(broker.connect_attempts(), 3);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn connect_fails_after_exhausting_attempts() {
        let broker = MemoryBroker::new();
        broker.set_reachable(false);
        let manager = make_manager(&broker, 4);
        let result = manager.connect().await;
        assert_eq!(result, Err(BrokerError::Unreachable { attempts: 4 }));
        assert_eq!(broker.connect_attempts(), 4);
        assert_eq!(manager.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn unbounded_policy_keeps_trying() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(25);
        let manager = make_manager(&broker, 1);
        manager.connect_with(&RetryPolicy::unbounded(Duration::ZERO)).await.unwrap();
        assert_eq!(broker.connect_attempts(), 26);
    }

    #[tokio::test]
    async fn failed_manager_can_connect_again() {
        let broker = MemoryBroker::new();
        broker.set_reachable(false);
        let manager = make_manager(&broker, 1);
        assert!(manager.connect().await.is_err());
        broker.set_reachable(true);
        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn waiting_callers_share_an_exhausted_cycle() {
        let broker = MemoryBroker::new();
        broker.set_reachable(false);
        let config = ConnectionConfig::builder(QUEUE)
            .retry(RetryPolicy::bounded(3, Duration::from_millis(20)))
            .build()
            .unwrap();
        let manager = ConnectionManager::new(broker.clone(), config);

        let started = std::time::Instant::now();
        let (a, b, c, d) =
            tokio::join!(manager.connect(), manager.connect(), manager.connect(), manager.connect());
        let elapsed = started.elapsed();

        for result in [a, b, c, d] {
            assert_eq!(result, Err(BrokerError::Unreachable { attempts: 3 }));
        }
        assert_eq!(broker.connect_attempts(), 3);
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn unbounded_waiter_keeps_trying_after_a_failed_cycle() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(2);
        let manager = make_manager(&broker, 2);

        let unbounded_policy = RetryPolicy::unbounded(Duration::ZERO);
        let (bounded, unbounded) = tokio::join!(
            manager.connect(),
            manager.connect_with(&unbounded_policy)
        );
        assert_eq!(bounded, Err(BrokerError::Unreachable { attempts: 2 }));
        assert_eq!(unbounded, Ok(()));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    // ------------------------------------------------------------------
    // publish / consume / loss detection
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn publish_before_connect_is_channel_closed() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 1);
        assert_eq!(manager.publish(b"{}").await, Err(BrokerError::ChannelClosed));
        assert_eq!(broker.published(QUEUE), 0);
    }

    #[tokio::test]
    async fn publish_reaches_queue() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 1);
        manager.connect().await.unwrap();
        manager.publish(b"hello").await.unwrap();
        assert_eq!(broker.published(QUEUE), 1);
        assert_eq!(broker.ready(QUEUE), vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn severed_channel_is_detected_and_recovered() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 1);
        manager.connect().await.unwrap();
        broker.sever();

        assert_eq!(manager.publish(b"lost").await, Err(BrokerError::ChannelClosed));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.connect().await.unwrap();
        manager.publish(b"again").await.unwrap();
        assert_eq!(broker.ready(QUEUE), vec![b"again".to_vec()]);
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn consume_requires_open_channel() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 1);
        assert!(matches!(manager.consume("tag").await, Err(BrokerError::ChannelClosed)));
        manager.connect().await.unwrap();
        assert!(manager.consume("tag").await.is_ok());
    }

    #[tokio::test]
    async fn connection_lost_moves_to_disconnected() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 1);
        manager.connect().await.unwrap();
        manager.connection_lost().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn lost_channel_is_closed_before_it_is_dropped() {
        let broker = MemoryBroker::new();
        broker.refuse_consume(true);
        let manager = make_manager(&broker, 1);
        manager.connect().await.unwrap();

        assert!(matches!(manager.consume("tag").await, Err(BrokerError::Protocol { .. })));
        manager.connection_lost().await;
        assert_eq!(broker.channels_closed(), 1);

        manager.connect().await.unwrap();
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let broker = MemoryBroker::new();
        let manager = make_manager(&broker, 1);
        manager.connect().await.unwrap();
        manager.close().await;
        manager.close().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.publish(b"x").await, Err(BrokerError::ChannelClosed));
    }
}
