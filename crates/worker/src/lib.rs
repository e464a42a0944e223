// Rust guideline compliant 2026-10-11

//! Fraud worker: consumes analysis events, evaluates the rule engine, reports
//! the verdict through the status callback and settles each delivery.
//!
//! Entry points: [`FraudWorker::handle`], [`FraudWorker::settle`],
//! [`FraudWorker::run`]. Configuration via [`WorkerConfig::builder`].
//!
//! Acknowledgement policy: a delivery is acked once the callback succeeded or
//! the payload is poison (it can never succeed). Every other failure requeues
//! the delivery after [`WorkerConfig::requeue_delay`].

use std::cell::Cell;
use std::time::Duration;

use broker::{ConnectionManager, RetryPolicy};
use domain::{
    AnalysisEvent, BrokerError, CallbackError, Connector, Delivery, MalformedMessage,
    StatusCallback, TransactionId, TransactionStatus, Verdict,
};
use futures::StreamExt as _;
use rule_engine::RuleEngine;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// WorkerError
// ---------------------------------------------------------------------------

/// Errors that stop the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The supplied configuration is invalid.
    #[error("invalid worker configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The broker could not be reached at startup.
    #[error("broker error: {source}")]
    Broker {
        /// The underlying broker error.
        #[from]
        source: BrokerError,
    },
}

// ---------------------------------------------------------------------------
// WorkerConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`FraudWorker`].
///
/// Construct via [`WorkerConfig::builder`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of deliveries processed concurrently.
    pub prefetch: u16,
    /// Consumer tag announced to the broker.
    pub consumer_tag: String,
    /// Pause before a failed delivery is requeued.
    pub requeue_delay: Duration,
    /// Delay between reconnect attempts after a lost connection.
    pub reconnect_delay: Duration,
}

/// Builder for [`WorkerConfig`].
///
/// Obtain via [`WorkerConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct WorkerConfigBuilder {
    prefetch: u16,
    consumer_tag: String,
    requeue_delay: Duration,
    reconnect_delay: Duration,
}

impl WorkerConfig {
    /// Create a builder. `prefetch` is the only required parameter.
    ///
    /// Default values: `consumer_tag = "fraud-worker"`, `requeue_delay = 1 s`,
    /// `reconnect_delay = 5 s`.
    #[must_use]
    pub fn builder(prefetch: u16) -> WorkerConfigBuilder {
        WorkerConfigBuilder {
            prefetch,
            consumer_tag: "fraud-worker".to_owned(),
            requeue_delay: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl WorkerConfigBuilder {
    /// Override the consumer tag.
    #[must_use]
    pub fn consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    /// Override the requeue delay. Zero requeues immediately.
    #[must_use]
    pub fn requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidConfig`] when `prefetch` is zero or the
    /// consumer tag is blank.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<WorkerConfig, WorkerError> {
        if self.prefetch == 0 {
            return Err(WorkerError::InvalidConfig {
                reason: "prefetch must be >= 1".to_owned(),
            });
        }
        if self.consumer_tag.trim().is_empty() {
            return Err(WorkerError::InvalidConfig {
                reason: "consumer tag must not be empty".to_owned(),
            });
        }
        Ok(WorkerConfig {
            prefetch: self.prefetch,
            consumer_tag: self.consumer_tag,
            requeue_delay: self.requeue_delay,
            reconnect_delay: self.reconnect_delay,
        })
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What happened to one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Verdict reported to the store.
    Processed {
        /// Transaction id.
        id: TransactionId,
        /// Rule evaluation result.
        verdict: Verdict,
    },
    /// Payload can never be processed.
    Poison {
        /// Why decoding failed.
        reason: MalformedMessage,
    },
    /// Callback failed; the message must be redelivered.
    Retry {
        /// Transaction id.
        id: TransactionId,
        /// Status that could not be reported.
        status: TransactionStatus,
        /// Callback failure.
        error: CallbackError,
    },
}

impl Outcome {
    /// `true` if the delivery is to be acknowledged rather than requeued.
    #[must_use]
    pub fn should_ack(&self) -> bool {
        !matches!(self, Self::Retry { .. })
    }
}

// ---------------------------------------------------------------------------
// FraudWorker
// ---------------------------------------------------------------------------

/// Consumer of the fraud-analysis queue.
#[derive(Debug)]
pub struct FraudWorker<S> {
    config: WorkerConfig,
    engine: RuleEngine,
    callback: S,
}

impl<S: StatusCallback> FraudWorker<S> {
    /// Create a worker.
    #[must_use]
    pub fn new(config: WorkerConfig, engine: RuleEngine, callback: S) -> Self {
        Self { config, engine, callback }
    }

    /// The configuration this worker was built with.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Decode, evaluate and report one payload. Never acks or requeues.
    pub async fn handle(&self, payload: &[u8]) -> Outcome {
        let event = match AnalysisEvent::decode(payload) {
            Ok(event) => event,
            Err(reason) => {
                tracing::warn!(%reason, bytes = payload.len(), "worker.message.poison");
                return Outcome::Poison { reason };
            }
        };

        let verdict = self.engine.evaluate_event(&event);
        let status = verdict.status();
        let rules: Vec<&str> = verdict.triggered().iter().map(|r| r.as_str()).collect();
        tracing::info!(id = event.id, %status, ?rules, "worker.transaction.evaluated");

        match self.callback.update_status(event.id, status).await {
            Ok(()) => Outcome::Processed { id: event.id, verdict },
            Err(error) => {
                tracing::warn!(id = event.id, %status, %error, "worker.callback.failed");
                Outcome::Retry { id: event.id, status, error }
            }
        }
    }

    /// Handle one delivery and settle it: ack, or requeue after the delay.
    ///
    /// A settle failure is logged only; the broker redelivers unsettled
    /// messages once the channel is gone.
    pub async fn settle<D: Delivery>(&self, delivery: &D) -> Outcome {
        if delivery.redelivered() {
            tracing::debug!("worker.message.redelivered");
        }
        let outcome = self.handle(delivery.payload()).await;
        let settled = if outcome.should_ack() {
            delivery.ack().await
        } else {
            tokio::time::sleep(self.config.requeue_delay).await;
            delivery.requeue().await
        };
        if let Err(error) = settled {
            tracing::warn!(%error, ack = outcome.should_ack(), "worker.settle.failed");
        }
        outcome
    }

    /// Consume until `shutdown` is cancelled.
    ///
    /// The startup connect uses the manager's retry policy. Once consuming, a
    /// lost connection is retried without limit every
    /// [`WorkerConfig::reconnect_delay`]; a subscription that failed or ended
    /// without a delivery waits that delay before the reconnect. On
    /// cancellation no new deliveries are taken, in-flight ones are settled,
    /// and the connection is closed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Broker`] if the startup connect is exhausted.
    pub async fn run<C: Connector>(
        &self,
        broker: &ConnectionManager<C>,
        shutdown: &CancellationToken,
    ) -> Result<(), WorkerError> {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!(reason = "cancelled before connect", "worker.run.stopped");
                return Ok(());
            }
            result = broker.connect() => result?,
        }

        let concurrency = usize::from(self.config.prefetch);
        loop {
            let received = Cell::new(false);
            match broker.consume(&self.config.consumer_tag).await {
                Ok(deliveries) => {
                    tracing::info!(
                        queue = %broker.queue(),
                        prefetch = self.config.prefetch,
                        "worker.consume.started"
                    );
                    deliveries
                        .take_until(shutdown.cancelled())
                        .for_each_concurrent(concurrency, |next| {
                            if next.is_ok() {
                                received.set(true);
                            }
                            async move {
                                match next {
                                    Ok(delivery) => {
                                        self.settle(&delivery).await;
                                    }
                                    Err(error) => tracing::warn!(%error, "worker.delivery.failed"),
                                }
                            }
                        })
                        .await;
                }
                Err(error) => tracing::warn!(%error, "worker.consume.failed"),
            }

            if shutdown.is_cancelled() {
                break;
            }
            broker.connection_lost().await;

            // Failed or empty subscriptions are spaced by the reconnect delay.
            if !received.get() {
                let delay = self.config.reconnect_delay;
                tracing::warn!(
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "worker.consume.backoff"
                );
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }

            let policy = RetryPolicy::unbounded(self.config.reconnect_delay);
            tokio::select! {
                () = shutdown.cancelled() => break,
                result = broker.connect_with(&policy) => result?,
            }
        }

        broker.close().await;
        tracing::info!("worker.run.stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{FraudWorker, Outcome, WorkerConfig, WorkerError};
    use broker::memory::MemoryBroker;
    use broker::{ConnectionConfig, ConnectionManager, RetryPolicy};
    use domain::{
        BrokerError, CallbackError, ConnectionState, RuleId, StatusCallback, TransactionId,
        TransactionStatus,
    };
    use rule_engine::RuleEngine;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const QUEUE: &str = "cola_analisis_fraude";

    // ------------------------------------------------------------------
    // Test helpers
    // ------------------------------------------------------------------

    /// Records every call; answers from a scripted queue, then `Ok`.
    #[derive(Default)]
    struct RecordingCallback {
        calls: RefCell<Vec<(TransactionId, TransactionStatus)>>,
        script: RefCell<VecDeque<Result<(), CallbackError>>>,
        active: Cell<usize>,
        peak: Cell<usize>,
        held: Cell<bool>,
        release: tokio::sync::Notify,
    }

    impl RecordingCallback {
        fn failing_first(errors: usize) -> Self {
            let cb = Self::default();
            for _ in 0..errors {
                cb.script
                    .borrow_mut()
                    .push_back(Err(CallbackError::UnexpectedStatus { status: 500 }));
            }
            cb
        }

        fn calls(&self) -> Vec<(TransactionId, TransactionStatus)> {
            self.calls.borrow().clone()
        }
    }

    impl StatusCallback for RecordingCallback {
        async fn update_status(
            &self,
            id: TransactionId,
            status: TransactionStatus,
        ) -> Result<(), CallbackError> {
            self.active.set(self.active.get() + 1);
            self.peak.set(self.peak.get().max(self.active.get()));
            if self.held.get() {
                self.release.notified().await;
            }
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            self.active.set(self.active.get() - 1);
            self.calls.borrow_mut().push((id, status));
            let next = self.script.borrow_mut().pop_front();
            next.unwrap_or(Ok(()))
        }
    }

    fn make_worker(prefetch: u16, callback: RecordingCallback) -> FraudWorker<RecordingCallback> {
        let config = WorkerConfig::builder(prefetch)
            .requeue_delay(Duration::ZERO)
            .reconnect_delay(Duration::from_millis(1))
            .build()
            .unwrap();
        FraudWorker::new(config, RuleEngine::default(), callback)
    }

    fn make_manager(broker: &MemoryBroker, retry: RetryPolicy) -> ConnectionManager<MemoryBroker> {
        let config = ConnectionConfig::builder(QUEUE).retry(retry).prefetch(10).build().unwrap();
        ConnectionManager::new(broker.clone(), config)
    }

    fn event(id: i64, amount: f64, location: &str, hora: &str) -> Vec<u8> {
        format!(r#"{{"id": {id}, "monto": {amount}, "ubicacion": "{location}", "hora": "{hora}"}}"#)
            .into_bytes()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    #[test]
    fn config_rejects_zero_prefetch() {
        let result = WorkerConfig::builder(0).build();
        assert!(matches!(result, Err(WorkerError::InvalidConfig { .. })));
    }

    #[test]
    fn config_defaults() {
        let config = WorkerConfig::builder(10).build().unwrap();
        assert_eq!(config.requeue_delay, Duration::from_secs(1));
        assert_eq!(config.consumer_tag, "fraud-worker");
    }

    // ------------------------------------------------------------------
    // handle: per-message decisions
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn clean_transaction_is_approved() {
        let worker = make_worker(1, RecordingCallback::default());
        let outcome = worker.handle(&event(1, 100.0, "Madrid", "2024-05-01T10:00:00")).await;
        assert!(matches!(&outcome, Outcome::Processed { id: 1, verdict } if verdict.triggered().is_empty()));
        assert_eq!(worker.callback.calls(), vec![(1, TransactionStatus::Approved)]);
    }

    #[tokio::test]
    async fn high_amount_is_rejected() {
        let worker = make_worker(1, RecordingCallback::default());
        let outcome = worker.handle(&event(2, 9000.0, "Madrid", "2024-05-01T10:00:00")).await;
        let Outcome::Processed { verdict, .. } = outcome else {
            panic!("expected Processed, got {outcome:?}");
        };
        assert_eq!(verdict.triggered(), &[RuleId::HighAmount]);
        assert_eq!(worker.callback.calls(), vec![(2, TransactionStatus::Rejected)]);
    }

    #[tokio::test]
    async fn all_three_rules_trigger_together() {
        let worker = make_worker(1, RecordingCallback::default());
        let outcome = worker.handle(&event(3, 6000.0, "Suiza", "2024-05-01T03:15:00")).await;
        let Outcome::Processed { verdict, .. } = outcome else {
            panic!("expected Processed, got {outcome:?}");
        };
        assert!(verdict.has(RuleId::HighAmount));
        assert!(verdict.has(RuleId::RiskyLocation));
        assert!(verdict.has(RuleId::RiskyHour));
    }

    #[tokio::test]
    async fn poison_message_skips_callback() {
        let worker = make_worker(1, RecordingCallback::default());
        let outcome = worker.handle(b"{}").await;
        assert!(matches!(outcome, Outcome::Poison { .. }));
        assert!(outcome.should_ack());
        assert!(worker.callback.calls().is_empty());
    }

    #[tokio::test]
    async fn callback_failure_means_retry() {
        let worker = make_worker(1, RecordingCallback::failing_first(1));
        let outcome = worker.handle(&event(4, 10.0, "Madrid", "2024-05-01T10:00:00")).await;
        assert_eq!(
            outcome,
            Outcome::Retry {
                id: 4,
                status: TransactionStatus::Approved,
                error: CallbackError::UnexpectedStatus { status: 500 },
            }
        );
        assert!(!outcome.should_ack());
    }

    // ------------------------------------------------------------------
    // run: end-to-end over the in-memory broker
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn run_acks_processed_and_poison_messages() {
        let broker = MemoryBroker::new();
        broker.inject(QUEUE, event(1, 100.0, "Madrid", "2024-05-01T10:00:00"));
        broker.inject(QUEUE, "not json");
        let manager = make_manager(&broker, RetryPolicy::bounded(1, Duration::ZERO));
        let worker = make_worker(4, RecordingCallback::default());
        let token = CancellationToken::new();

        let drive = async {
            wait_until(|| broker.acked(QUEUE).len() == 2).await;
            token.cancel();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(&manager, &token), drive)
        })
        .await
        .unwrap();

        result.unwrap();
        assert_eq!(worker.callback.calls(), vec![(1, TransactionStatus::Approved)]);
        assert_eq!(broker.requeued(QUEUE), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn poison_message_does_not_block_the_next_one() {
        let broker = MemoryBroker::new();
        broker.inject(QUEUE, "not json");
        broker.inject(QUEUE, event(5, 100.0, "Madrid", "2024-05-01T10:00:00"));
        let manager = make_manager(&broker, RetryPolicy::bounded(1, Duration::ZERO));
        let worker = make_worker(1, RecordingCallback::default());
        let token = CancellationToken::new();

        let drive = async {
            wait_until(|| broker.acked(QUEUE).len() == 2).await;
            token.cancel();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(&manager, &token), drive)
        })
        .await
        .unwrap();

        result.unwrap();
        assert_eq!(broker.acked(QUEUE)[0], b"not json".to_vec());
        assert_eq!(worker.callback.calls(), vec![(5, TransactionStatus::Approved)]);
        assert_eq!(broker.requeued(QUEUE), 0);
    }

    #[tokio::test]
    async fn cancel_settles_the_in_flight_delivery_before_closing() {
        let broker = MemoryBroker::new();
        broker.inject(QUEUE, event(9, 100.0, "Madrid", "2024-05-01T10:00:00"));
        let manager = make_manager(&broker, RetryPolicy::bounded(1, Duration::ZERO));
        let callback = RecordingCallback::default();
        callback.held.set(true);
        let worker = make_worker(1, callback);
        let token = CancellationToken::new();

        let drive = async {
            wait_until(|| worker.callback.active.get() == 1).await;
            token.cancel();
            tokio::task::yield_now().await;
            assert!(broker.acked(QUEUE).is_empty());
            worker.callback.release.notify_one();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(&manager, &token), drive)
        })
        .await
        .unwrap();

        result.unwrap();
        assert_eq!(broker.acked(QUEUE).len(), 1);
        assert_eq!(broker.in_flight(QUEUE), 0);
        assert!(broker.ready(QUEUE).is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn failed_callback_is_requeued_then_acked() {
        let broker = MemoryBroker::new();
        broker.inject(QUEUE, event(6, 100.0, "Madrid", "2024-05-01T10:00:00"));
        let manager = make_manager(&broker, RetryPolicy::bounded(1, Duration::ZERO));
        let worker = make_worker(1, RecordingCallback::failing_first(1));
        let token = CancellationToken::new();

        let drive = async {
            wait_until(|| broker.acked(QUEUE).len() == 1).await;
            token.cancel();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(&manager, &token), drive)
        })
        .await
        .unwrap();

        result.unwrap();
        assert_eq!(broker.requeued(QUEUE), 1);
        assert_eq!(worker.callback.calls().len(), 2);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_prefetch() {
        let broker = MemoryBroker::new();
        for id in 1..=8 {
            broker.inject(QUEUE, event(id, 100.0, "Madrid", "2024-05-01T10:00:00"));
        }
        let manager = make_manager(&broker, RetryPolicy::bounded(1, Duration::ZERO));
        let worker = make_worker(2, RecordingCallback::default());
        let token = CancellationToken::new();

        let drive = async {
            wait_until(|| broker.acked(QUEUE).len() == 8).await;
            token.cancel();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(&manager, &token), drive)
        })
        .await
        .unwrap();

        result.unwrap();
        assert!(worker.callback.peak.get() <= 2, "peak {}", worker.callback.peak.get());
    }

    #[tokio::test]
    async fn run_resumes_after_connection_loss() {
        let broker = MemoryBroker::new();
        broker.inject(QUEUE, event(1, 100.0, "Madrid", "2024-05-01T10:00:00"));
        let manager = make_manager(&broker, RetryPolicy::bounded(1, Duration::ZERO));
        let worker = make_worker(1, RecordingCallback::default());
        let token = CancellationToken::new();

        let drive = async {
            wait_until(|| broker.acked(QUEUE).len() == 1).await;
            broker.sever();
            broker.inject(QUEUE, event(2, 100.0, "Madrid", "2024-05-01T10:00:00"));
            wait_until(|| broker.acked(QUEUE).len() == 2).await;
            token.cancel();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(&manager, &token), drive)
        })
        .await
        .unwrap();

        result.unwrap();
        assert_eq!(broker.connect_attempts(), 2);
        let ids: Vec<TransactionId> = worker.callback.calls().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn refused_consume_backs_off_between_reconnects() {
        let broker = MemoryBroker::new();
        broker.refuse_consume(true);
        let manager = make_manager(&broker, RetryPolicy::bounded(1, Duration::ZERO));
        let config = WorkerConfig::builder(1)
            .reconnect_delay(Duration::from_millis(50))
            .build()
            .unwrap();
        let worker = FraudWorker::new(config, RuleEngine::default(), RecordingCallback::default());
        let token = CancellationToken::new();

        let drive = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(&manager, &token), drive)
        })
        .await
        .unwrap();

        result.unwrap();
        let attempts = broker.connect_attempts();
        assert!((2..=6).contains(&attempts), "{attempts} connects in 200ms");
        assert_eq!(broker.channels_closed(), attempts);
    }

    #[tokio::test]
    async fn bounded_startup_failure_is_fatal() {
        let broker = MemoryBroker::new();
        broker.set_reachable(false);
        let manager = make_manager(&broker, RetryPolicy::bounded(2, Duration::ZERO));
        let worker = make_worker(1, RecordingCallback::default());

        let result = worker.run(&manager, &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(WorkerError::Broker { source: BrokerError::Unreachable { attempts: 2 } })
        ));
    }

    #[tokio::test]
    async fn cancel_during_unbounded_startup_returns_ok() {
        let broker = MemoryBroker::new();
        broker.set_reachable(false);
        let manager = make_manager(&broker, RetryPolicy::unbounded(Duration::from_millis(1)));
        let worker = make_worker(1, RecordingCallback::default());
        let token = CancellationToken::new();

        let drive = async {
            wait_until(|| broker.connect_attempts() >= 3).await;
            token.cancel();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(&manager, &token), drive)
        })
        .await
        .unwrap();
        result.unwrap();
    }
}
