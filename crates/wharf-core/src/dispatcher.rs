//! The polling loop that drives a queue: claim, dispatch, settle.
//!
//! States `Idle -> Claiming -> Dispatching -> Settling -> Idle` are internal
//! to `run_once`; they are not externally observable and are not modeled as
//! a type, only as the shape of the method below.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::backoff::{BackoffPolicy, ExponentialBackoff};
use crate::clock::{MonotonicClock, SystemMonotonicClock};
use crate::error::WharfError;
use crate::handler::HandlerResolver;
use crate::ids::OwnerToken;
use crate::metrics::{MetricsSink, NoopMetricsSink};
use crate::queue::{QueueId, QueueStore};
use crate::readiness::SchemaReadyGate;
use crate::store_provider::{IdentifiedStore, RoundRobin, SelectionStrategy, StoreProvider};

pub struct DispatcherConfig {
    pub lease_seconds: i64,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub poll_interval: StdDuration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            lease_seconds: 30,
            batch_size: 20,
            max_attempts: 5,
            poll_interval: StdDuration::from_secs(1),
        }
    }
}

enum FailureReason {
    MissingHandler,
    HandlerError(String),
    /// The claimed row vanished before it could be fetched. Retrying would
    /// only repeat the same `abandon` against an id that no longer exists,
    /// so this is terminal rather than fed through backoff.
    RowVanished,
    FetchError(String),
}

struct Failure<Id> {
    id: Id,
    reason: FailureReason,
    /// Attempt count known at dispatch time, when available from the
    /// fetched record; `None` forces a round-trip to the store.
    known_attempts: Option<i32>,
}

pub struct Dispatcher<Id, S> {
    queue_name: String,
    store_provider: Arc<dyn StoreProvider<S>>,
    selection: Arc<dyn SelectionStrategy<S>>,
    handlers: Arc<HandlerResolver<Id>>,
    backoff: Arc<dyn BackoffPolicy>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn MonotonicClock>,
    config: DispatcherConfig,
    _marker: PhantomData<Id>,
}

impl<Id, S> Dispatcher<Id, S>
where
    Id: QueueId,
    S: QueueStore<Id> + IdentifiedStore + Send + Sync + 'static,
{
    pub fn new(
        queue_name: impl Into<String>,
        store_provider: Arc<dyn StoreProvider<S>>,
        handlers: HandlerResolver<Id>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            store_provider,
            selection: Arc::new(RoundRobin::default()),
            handlers: Arc::new(handlers),
            backoff: Arc::new(ExponentialBackoff::default()),
            metrics: Arc::new(NoopMetricsSink),
            clock: Arc::new(SystemMonotonicClock),
            config,
            _marker: PhantomData,
        }
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_selection_strategy(mut self, selection: Arc<dyn SelectionStrategy<S>>) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn MonotonicClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Claim a batch, dispatch each row, and settle the outcomes.
    #[instrument(skip(self), fields(queue = %self.queue_name))]
    pub async fn run_once(&self, batch_size: u32) -> Result<usize, WharfError> {
        // 1. Mint a fresh owner token.
        let owner = OwnerToken::new();

        // 2. Ask the store provider for its stores and pick one.
        let stores = self.store_provider.all_stores().await?;
        let Some(store) = self.selection.select(&stores) else {
            return Ok(0);
        };

        // 3. Claim a bounded batch under a lease.
        let claimed = store
            .claim(owner, ChronoDuration::seconds(self.config.lease_seconds), batch_size)
            .await?;

        if claimed.is_empty() {
            return Ok(0);
        }
        self.metrics.record_claimed(&self.queue_name, claimed.len() as u64);

        // 4. Fetch, resolve a handler, invoke.
        let mut succeeded: Vec<Id> = Vec::new();
        let mut failures: Vec<Failure<Id>> = Vec::new();

        for id in &claimed {
            match store.fetch_record(id).await {
                Ok(Some(record)) => match self.handlers.resolve(&record.topic) {
                    None => {
                        warn!(topic = %record.topic, ?id, "no handler registered; failing permanently");
                        failures.push(Failure {
                            id: id.clone(),
                            reason: FailureReason::MissingHandler,
                            known_attempts: Some(record.attempts),
                        });
                    }
                    Some(handler) => {
                        let cancel = CancellationToken::new();
                        match handler.handle(&record, cancel).await {
                            Ok(()) => succeeded.push(id.clone()),
                            Err(err) => {
                                warn!(?id, error = %err, "handler failed");
                                failures.push(Failure {
                                    id: id.clone(),
                                    reason: FailureReason::HandlerError(err.to_string()),
                                    known_attempts: Some(record.attempts),
                                });
                            }
                        }
                    }
                },
                Ok(None) => {
                    warn!(?id, "claimed row vanished before dispatch");
                    failures.push(Failure {
                        id: id.clone(),
                        reason: FailureReason::RowVanished,
                        known_attempts: None,
                    });
                }
                Err(err) => {
                    warn!(?id, error = %err, "failed to fetch claimed record");
                    failures.push(Failure {
                        id: id.clone(),
                        reason: FailureReason::FetchError(err.to_string()),
                        known_attempts: None,
                    });
                }
            }
        }

        // 5. Ack successes first. Settling a slow fail/abandon path can
        // never revert a message that already completed.
        if !succeeded.is_empty() {
            store.ack(owner, &succeeded).await?;
            self.metrics.record_acked(&self.queue_name, succeeded.len() as u64);
        }

        // 6-7. Partition failures into fail vs abandon-with-backoff and
        // issue both.
        let mut failed_count = 0u64;
        let mut abandoned_count = 0u64;

        for failure in failures {
            let attempt = match failure.known_attempts {
                Some(a) => a,
                None => store.attempts(&failure.id).await.unwrap_or(0),
            };

            let error_message = match &failure.reason {
                FailureReason::MissingHandler => {
                    "no handler registered for topic".to_string()
                }
                FailureReason::HandlerError(msg) => msg.clone(),
                FailureReason::RowVanished => "claimed row vanished before dispatch".to_string(),
                FailureReason::FetchError(msg) => msg.clone(),
            };

            let non_retryable = matches!(
                failure.reason,
                FailureReason::MissingHandler | FailureReason::RowVanished
            );
            let exhausted = attempt + 1 > self.config.max_attempts as i32;

            if non_retryable || exhausted {
                store.fail(owner, &[failure.id], error_message).await?;
                failed_count += 1;
            } else {
                let delay = self.backoff.delay_for_attempt((attempt + 1) as u32);
                store
                    .abandon(
                        owner,
                        &[failure.id],
                        Some(error_message),
                        Some(ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero())),
                    )
                    .await?;
                abandoned_count += 1;
            }
        }

        if failed_count > 0 {
            self.metrics.record_failed(&self.queue_name, failed_count);
        }
        if abandoned_count > 0 {
            self.metrics.record_abandoned(&self.queue_name, abandoned_count);
        }

        // 8. Total claimed, whether successful or failed.
        Ok(claimed.len())
    }

    /// The outer polling loop: await schema readiness once, then claim/
    /// dispatch/settle on a fixed cadence paced by the monotonic clock until
    /// `cancel` fires. Errors from `run_once` are logged and swallowed; the
    /// loop exits only on cancellation.
    pub async fn run(&self, gate: &SchemaReadyGate, cancel: CancellationToken) {
        if !gate.await_ready().await {
            return;
        }

        loop {
            if cancel.is_cancelled() {
                return;
            }

            let next_tick = self.clock.now() + self.config.poll_interval;

            match self.run_once(self.config.batch_size).await {
                Ok(_) => {}
                Err(err) => {
                    warn!(queue = %self.queue_name, error = %err, "dispatcher cycle failed; continuing");
                }
            }

            let now = self.clock.now();
            let sleep_for = next_tick.saturating_duration_since(now);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }
}
