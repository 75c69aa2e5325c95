use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use wharf_testing::{InMemoryQueueStore, RecordingMetricsSink};

use crate::async_trait;
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::WharfError;
use crate::handler::{Handler, HandlerResolver};
use crate::queue::{QueueRecord, QueueStatus};
use crate::store_provider::StaticStoreProvider;

struct AlwaysSucceeds;

#[async_trait]
impl Handler<Uuid> for AlwaysSucceeds {
    fn topic(&self) -> &str {
        "welcome-email"
    }

    async fn handle(
        &self,
        _message: &QueueRecord<Uuid>,
        _cancel: CancellationToken,
    ) -> Result<(), WharfError> {
        Ok(())
    }
}

struct AlwaysFails {
    calls: AtomicUsize,
}

#[async_trait]
impl Handler<Uuid> for AlwaysFails {
    fn topic(&self) -> &str {
        "flaky-export"
    }

    async fn handle(
        &self,
        _message: &QueueRecord<Uuid>,
        _cancel: CancellationToken,
    ) -> Result<(), WharfError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(WharfError::Handler(anyhow::anyhow!("downstream unavailable")))
    }
}

/// Delegates everything to an inner store except `fetch_record`, which
/// always reports the row missing, simulating a claimed row that vanished
/// (e.g. deleted by an out-of-band operator query) between claim and fetch.
struct VanishingStore {
    inner: Arc<InMemoryQueueStore<Uuid>>,
}

impl crate::IdentifiedStore for VanishingStore {
    fn identifier(&self) -> String {
        self.inner.identifier()
    }
}

#[async_trait]
impl crate::queue::QueueStore<Uuid> for VanishingStore {
    async fn claim(
        &self,
        owner: crate::ids::OwnerToken,
        lease_for: chrono::Duration,
        batch_size: u32,
    ) -> Result<Vec<Uuid>, WharfError> {
        self.inner.claim(owner, lease_for, batch_size).await
    }

    async fn ack(&self, owner: crate::ids::OwnerToken, ids: &[Uuid]) -> Result<(), WharfError> {
        self.inner.ack(owner, ids).await
    }

    async fn abandon(
        &self,
        owner: crate::ids::OwnerToken,
        ids: &[Uuid],
        error: Option<String>,
        delay: Option<chrono::Duration>,
    ) -> Result<(), WharfError> {
        self.inner.abandon(owner, ids, error, delay).await
    }

    async fn fail(&self, owner: crate::ids::OwnerToken, ids: &[Uuid], error: String) -> Result<(), WharfError> {
        self.inner.fail(owner, ids, error).await
    }

    async fn reap_expired(&self) -> Result<u64, WharfError> {
        self.inner.reap_expired().await
    }

    async fn attempts(&self, id: &Uuid) -> Result<i32, WharfError> {
        self.inner.attempts(id).await
    }

    async fn fetch_record(&self, _id: &Uuid) -> Result<Option<QueueRecord<Uuid>>, WharfError> {
        Ok(None)
    }
}

fn config(max_attempts: u32) -> DispatcherConfig {
    DispatcherConfig {
        lease_seconds: 30,
        batch_size: 10,
        max_attempts,
        poll_interval: std::time::Duration::from_millis(10),
    }
}

#[tokio::test]
async fn successful_handler_acks_the_row() {
    let store = Arc::new(InMemoryQueueStore::new("primary"));
    let id = Uuid::new_v4();
    store.seed(id, "welcome-email", json!({"to": "a@example.com"}));

    let provider = Arc::new(StaticStoreProvider::new(vec![store.clone()]));
    let handlers = HandlerResolver::new().register(Arc::new(AlwaysSucceeds));
    let metrics = Arc::new(RecordingMetricsSink::new());

    let dispatcher = Dispatcher::new("outbox", provider, handlers, config(3)).with_metrics(metrics.clone());

    let claimed = dispatcher.run_once(10).await.unwrap();
    assert_eq!(claimed, 1);
    assert_eq!(store.status_of(&id), Some(QueueStatus::Done));
    assert_eq!(metrics.snapshot().acked, 1);
}

#[tokio::test]
async fn missing_handler_fails_without_retry() {
    let store = Arc::new(InMemoryQueueStore::new("primary"));
    let id = Uuid::new_v4();
    store.seed(id, "nobody-registered-this", json!({}));

    let provider = Arc::new(StaticStoreProvider::new(vec![store.clone()]));
    let handlers: HandlerResolver<Uuid> = HandlerResolver::new();

    let dispatcher = Dispatcher::new("outbox", provider, handlers, config(5));

    dispatcher.run_once(10).await.unwrap();

    assert_eq!(store.status_of(&id), Some(QueueStatus::Failed));
    assert_eq!(store.attempts_of(&id), Some(0));
}

#[tokio::test]
async fn first_failure_abandons_with_incremented_attempts() {
    let store = Arc::new(InMemoryQueueStore::new("primary"));
    let id = Uuid::new_v4();
    store.seed(id, "flaky-export", json!({}));

    let provider = Arc::new(StaticStoreProvider::new(vec![store.clone()]));
    let handler = Arc::new(AlwaysFails {
        calls: AtomicUsize::new(0),
    });
    let handlers = HandlerResolver::new().register(handler.clone());

    let dispatcher = Dispatcher::new("outbox", provider, handlers, config(3));
    dispatcher.run_once(10).await.unwrap();

    assert_eq!(store.status_of(&id), Some(QueueStatus::Ready));
    assert_eq!(store.attempts_of(&id), Some(1));
    assert!(store.last_error_of(&id).unwrap().contains("downstream"));
}

#[tokio::test]
async fn exhausting_max_attempts_fails_the_row_instead_of_retrying() {
    let store = Arc::new(InMemoryQueueStore::new("primary"));
    let id = Uuid::new_v4();
    // Already at max_attempts - 1; this cycle's failure should push it over
    // the limit and fail it rather than abandon it for another retry.
    store.seed_with_attempts(id, "flaky-export", json!({}), None, 2);

    let provider = Arc::new(StaticStoreProvider::new(vec![store.clone()]));
    let handler = Arc::new(AlwaysFails {
        calls: AtomicUsize::new(0),
    });
    let handlers = HandlerResolver::new().register(handler.clone());

    let dispatcher = Dispatcher::new("outbox", provider, handlers, config(3));
    dispatcher.run_once(10).await.unwrap();

    assert_eq!(store.status_of(&id), Some(QueueStatus::Failed));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_row_that_vanishes_between_claim_and_fetch_fails_instead_of_looping() {
    let inner = Arc::new(InMemoryQueueStore::new("primary"));
    let id = Uuid::new_v4();
    inner.seed(id, "welcome-email", json!({}));
    let store = Arc::new(VanishingStore { inner: inner.clone() });

    let provider = Arc::new(StaticStoreProvider::new(vec![store]));
    let handlers = HandlerResolver::new().register(Arc::new(AlwaysSucceeds));

    let dispatcher = Dispatcher::new("outbox", provider, handlers, config(3));
    dispatcher.run_once(10).await.unwrap();

    // Must be failed terminally, not abandoned back to `Ready` for another
    // retry cycle that would just rediscover the same vanished-row fetch
    // every tick.
    assert_eq!(inner.status_of(&id), Some(QueueStatus::Failed));
}

#[tokio::test]
async fn no_stores_available_is_a_no_op() {
    let provider: Arc<StaticStoreProvider<InMemoryQueueStore<Uuid>>> =
        Arc::new(StaticStoreProvider::new(vec![]));
    let handlers: HandlerResolver<Uuid> = HandlerResolver::new();
    let dispatcher = Dispatcher::new("outbox", provider, handlers, config(3));

    let claimed = dispatcher.run_once(10).await.unwrap();
    assert_eq!(claimed, 0);
}
