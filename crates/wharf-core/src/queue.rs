//! The claim/ack/abandon/fail/reap state machine shared by the outbox,
//! inbox, timer, and job-run queues.
//!
//! One generic implementation, instantiated over two id shapes: `Uuid` for
//! outbox/timers/job-runs, `String` for the inbox's caller-supplied message
//! id. The trait itself is storage-agnostic; the concrete Postgres
//! implementation lives in `wharf-postgres`.

use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;

use crate::error::WharfError;
use crate::ids::OwnerToken;

/// Bound satisfied by both the 128-bit opaque id (outbox/timers/job-runs)
/// and the caller-supplied string id (inbox).
pub trait QueueId: Clone + Debug + Eq + Hash + Send + Sync + 'static {}
impl<T: Clone + Debug + Eq + Hash + Send + Sync + 'static> QueueId for T {}

/// A queue row's lifecycle state. Every queue uses the same four-state
/// machine; only the public vocabulary differs (the inbox calls `Ready`
/// "Seen" and `Failed` "Dead"), so storage implementations map their own
/// status text onto this enum rather than exposing their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Ready,
    InProgress,
    Done,
    Failed,
}

/// A claimed row's full record, fetched by the dispatcher after `claim`
/// returns ids, and handed to the resolved handler.
#[derive(Debug, Clone)]
pub struct QueueRecord<Id> {
    pub id: Id,
    pub topic: String,
    pub payload: Value,
    pub attempts: i32,
}

/// The claim/ack/abandon/fail/reap engine. Implementations must uphold:
///
/// - Two concurrent `claim` calls on overlapping candidate sets return
///   disjoint id sets (achieved via row-level locking with skip-locked
///   semantics, so readers never block on in-flight claims).
/// - `ack`/`abandon`/`fail` with an owner token that doesn't currently own a
///   referenced row silently ignore that row (idempotent: the caller may
///   have lost its lease to a reclaim).
/// - `reap_expired` is safe to call at any time, from any number of callers,
///   concurrently with everything else; it is a projection restoring
///   invariants, not a destructive operation.
#[async_trait]
pub trait QueueStore<Id: QueueId>: Send + Sync {
    /// Atomically selects up to `batch_size` visible rows, orders them
    /// oldest-first by the queue's ordering column, and in the same
    /// transaction marks them `InProgress` under `owner` with a lease
    /// expiring in `lease_for`. Returns the ids actually claimed; never a
    /// partial claim followed by a rollback.
    async fn claim(
        &self,
        owner: OwnerToken,
        lease_for: Duration,
        batch_size: u32,
    ) -> Result<Vec<Id>, WharfError>;

    /// Terminal success. Only affects rows currently `InProgress` and owned
    /// by `owner`; rows that don't match are silently ignored.
    async fn ack(&self, owner: OwnerToken, ids: &[Id]) -> Result<(), WharfError>;

    /// Returns a row to `Ready` (or `Seen` for the inbox), increments
    /// `attempts`, records `last_error`. If `delay` is set, `due_time` is
    /// pushed out so the row is temporarily invisible (backoff). Same
    /// ownership guard as `ack`.
    async fn abandon(
        &self,
        owner: OwnerToken,
        ids: &[Id],
        error: Option<String>,
        delay: Option<Duration>,
    ) -> Result<(), WharfError>;

    /// Terminal failure: `Failed`/`Dead`. Same ownership guard as `ack`.
    async fn fail(&self, owner: OwnerToken, ids: &[Id], error: String) -> Result<(), WharfError>;

    /// Returns to `Ready` any `InProgress` row whose lease has expired.
    /// Does not touch `attempts`; only explicit `abandon`/`fail` bump it.
    /// Returns the number of rows reclaimed.
    async fn reap_expired(&self) -> Result<u64, WharfError>;

    /// Current attempt count for a row, used by the dispatcher to decide
    /// abandon-vs-fail against `max_attempts`.
    async fn attempts(&self, id: &Id) -> Result<i32, WharfError>;

    /// The full record for a claimed id, used by the dispatcher to resolve a
    /// handler and hand over the payload. `None` if the row no longer
    /// exists (should not happen under normal operation, but a defensive
    /// caller treats it as a non-retryable failure rather than panicking).
    async fn fetch_record(&self, id: &Id) -> Result<Option<QueueRecord<Id>>, WharfError>;
}
