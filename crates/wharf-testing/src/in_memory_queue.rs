//! An in-process stand-in for a `QueueStore<Id>` table, used by wharf-core's
//! own unit tests and by handler-level tests in downstream crates.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use wharf_core::{async_trait, OwnerToken, QueueRecord, QueueStatus, QueueStore, WharfError};

#[derive(Debug, Clone)]
struct Row<Id> {
    id: Id,
    topic: String,
    payload: Value,
    status: QueueStatus,
    owner: Option<OwnerToken>,
    locked_until: Option<DateTime<Utc>>,
    due_time: Option<DateTime<Utc>>,
    attempts: i32,
    last_error: Option<String>,
    seq: u64,
}

/// Mirrors `wharf_postgres::queue_store::QueueTable::claim_order`: unordered
/// queues (outbox/inbox) claim oldest-arrival-first; scheduled queues
/// (timers/job-runs) claim earliest-due-first regardless of insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOrder {
    Arrival,
    DueTime,
}

/// A fake `QueueStore` backed by a `Vec` guarded by a mutex.
pub struct InMemoryQueueStore<Id> {
    identifier: String,
    order: ClaimOrder,
    rows: Mutex<Vec<Row<Id>>>,
    next_seq: Mutex<u64>,
}

impl<Id> InMemoryQueueStore<Id>
where
    Id: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Claims in arrival order, matching the outbox/inbox tables.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::with_claim_order(identifier, ClaimOrder::Arrival)
    }

    /// Claims in `due_time` order, matching the timers/job-runs tables.
    pub fn new_scheduled(identifier: impl Into<String>) -> Self {
        Self::with_claim_order(identifier, ClaimOrder::DueTime)
    }

    pub fn with_claim_order(identifier: impl Into<String>, order: ClaimOrder) -> Self {
        Self {
            identifier: identifier.into(),
            order,
            rows: Mutex::new(Vec::new()),
            next_seq: Mutex::new(0),
        }
    }

    /// Seeds a `Ready` row, as if a producer had just enqueued it.
    pub fn seed(&self, id: Id, topic: impl Into<String>, payload: Value) {
        self.seed_with_due_time(id, topic, payload, None);
    }

    pub fn seed_with_due_time(
        &self,
        id: Id,
        topic: impl Into<String>,
        payload: Value,
        due_time: Option<DateTime<Utc>>,
    ) {
        self.seed_with_attempts(id, topic, payload, due_time, 0);
    }

    /// Seeds a `Ready` row with a pre-set attempt count, for exercising the
    /// dispatcher's abandon-vs-fail decision without replaying every prior
    /// retry cycle.
    pub fn seed_with_attempts(
        &self,
        id: Id,
        topic: impl Into<String>,
        payload: Value,
        due_time: Option<DateTime<Utc>>,
        attempts: i32,
    ) {
        let mut seq_guard = self.next_seq.lock().unwrap();
        let seq = *seq_guard;
        *seq_guard += 1;
        drop(seq_guard);

        self.rows.lock().unwrap().push(Row {
            id,
            topic: topic.into(),
            payload,
            status: QueueStatus::Ready,
            owner: None,
            locked_until: None,
            due_time,
            attempts,
            last_error: None,
            seq,
        });
    }

    pub fn status_of(&self, id: &Id) -> Option<QueueStatus> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.id == id)
            .map(|r| r.status)
    }

    pub fn attempts_of(&self, id: &Id) -> Option<i32> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.id == id)
            .map(|r| r.attempts)
    }

    pub fn last_error_of(&self, id: &Id) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.id == id)
            .and_then(|r| r.last_error.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<Id> wharf_core::IdentifiedStore for InMemoryQueueStore<Id> {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }
}

fn is_visible<Id>(row: &Row<Id>, now: DateTime<Utc>) -> bool {
    let lease_expired = matches!(row.locked_until, Some(t) if t <= now);
    let admissible_status = row.status == QueueStatus::Ready
        || (row.status == QueueStatus::InProgress && lease_expired);
    let due = row.due_time.map(|t| t <= now).unwrap_or(true);
    admissible_status && due
}

#[async_trait]
impl<Id> QueueStore<Id> for InMemoryQueueStore<Id>
where
    Id: Clone + std::fmt::Debug + Eq + Hash + Send + Sync + 'static,
{
    async fn claim(
        &self,
        owner: OwnerToken,
        lease_for: Duration,
        batch_size: u32,
    ) -> Result<Vec<Id>, WharfError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();

        let mut candidates: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| is_visible(r, now))
            .map(|(i, _)| i)
            .collect();
        match self.order {
            ClaimOrder::Arrival => candidates.sort_by_key(|&i| rows[i].seq),
            ClaimOrder::DueTime => {
                candidates.sort_by_key(|&i| (rows[i].due_time.is_none(), rows[i].due_time, rows[i].seq))
            }
        }
        candidates.truncate(batch_size as usize);

        let mut claimed = Vec::with_capacity(candidates.len());
        for idx in candidates {
            let row = &mut rows[idx];
            row.status = QueueStatus::InProgress;
            row.owner = Some(owner);
            row.locked_until = Some(now + lease_for);
            claimed.push(row.id.clone());
        }
        Ok(claimed)
    }

    async fn ack(&self, owner: OwnerToken, ids: &[Id]) -> Result<(), WharfError> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if ids.contains(&row.id) && row.status == QueueStatus::InProgress && row.owner == Some(owner) {
                row.status = QueueStatus::Done;
                row.owner = None;
                row.locked_until = None;
            }
        }
        Ok(())
    }

    async fn abandon(
        &self,
        owner: OwnerToken,
        ids: &[Id],
        error: Option<String>,
        delay: Option<Duration>,
    ) -> Result<(), WharfError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if ids.contains(&row.id) && row.status == QueueStatus::InProgress && row.owner == Some(owner) {
                row.status = QueueStatus::Ready;
                row.owner = None;
                row.locked_until = None;
                row.attempts += 1;
                row.last_error = error.clone();
                row.due_time = delay.map(|d| now + d);
            }
        }
        Ok(())
    }

    async fn fail(&self, owner: OwnerToken, ids: &[Id], error: String) -> Result<(), WharfError> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if ids.contains(&row.id) && row.status == QueueStatus::InProgress && row.owner == Some(owner) {
                row.status = QueueStatus::Failed;
                row.owner = None;
                row.locked_until = None;
                row.last_error = Some(error.clone());
            }
        }
        Ok(())
    }

    async fn reap_expired(&self) -> Result<u64, WharfError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let mut reaped = 0u64;
        for row in rows.iter_mut() {
            if row.status == QueueStatus::InProgress && matches!(row.locked_until, Some(t) if t <= now) {
                row.status = QueueStatus::Ready;
                row.owner = None;
                row.locked_until = None;
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn attempts(&self, id: &Id) -> Result<i32, WharfError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.id == id)
            .map(|r| r.attempts)
            .unwrap_or(0))
    }

    async fn fetch_record(&self, id: &Id) -> Result<Option<QueueRecord<Id>>, WharfError> {
        Ok(self.rows.lock().unwrap().iter().find(|r| &r.id == id).map(|r| {
            QueueRecord {
                id: r.id.clone(),
                topic: r.topic.clone(),
                payload: r.payload.clone(),
                attempts: r.attempts,
            }
        }))
    }
}

/// Convenience map of independent in-memory queues keyed by name, mirroring
/// a multi-tenant `StoreProvider`'s rotation without any Postgres pool.
#[derive(Default)]
pub struct InMemoryQueueRegistry<Id> {
    queues: Mutex<HashMap<String, std::sync::Arc<InMemoryQueueStore<Id>>>>,
}

impl<Id> InMemoryQueueRegistry<Id>
where
    Id: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, name: &str) -> std::sync::Arc<InMemoryQueueStore<Id>> {
        self.queues
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(InMemoryQueueStore::new(name)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scheduled_claim_orders_by_due_time_not_insertion_order() {
        let store: InMemoryQueueStore<u32> = InMemoryQueueStore::new_scheduled("timers");
        let now = Utc::now();

        // Inserted latest but due soonest; must still be claimed first.
        store.seed_with_due_time(3, "reminder", Value::Null, Some(now - Duration::seconds(1)));
        store.seed_with_due_time(1, "reminder", Value::Null, Some(now - Duration::seconds(10)));
        store.seed_with_due_time(2, "reminder", Value::Null, Some(now - Duration::seconds(5)));

        let claimed = store.claim(OwnerToken::new(), Duration::seconds(30), 10).await.unwrap();
        assert_eq!(claimed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn arrival_claim_orders_by_insertion_regardless_of_due_time() {
        let store: InMemoryQueueStore<u32> = InMemoryQueueStore::new("outbox");
        let now = Utc::now();

        store.seed_with_due_time(1, "order-placed", Value::Null, Some(now));
        store.seed_with_due_time(2, "order-placed", Value::Null, Some(now - Duration::seconds(100)));

        let claimed = store.claim(OwnerToken::new(), Duration::seconds(30), 10).await.unwrap();
        assert_eq!(claimed, vec![1, 2]);
    }
}
