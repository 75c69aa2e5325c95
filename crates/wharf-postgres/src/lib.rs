//! PostgreSQL storage layer for wharf: a `QueueStore<Id>` and `LeaseStore`
//! backed by `FOR UPDATE SKIP LOCKED` claim semantics and ownership-guarded
//! mutations, plus idempotent schema bootstrap.
//!
//! # Schema
//!
//! See [`schema::ensure_all`] for the exact DDL. In short: one table per
//! queue (`outbox_messages`, `inbox_messages`, `timers`, `job_runs`) sharing
//! the same `status`/`owner_token`/`locked_until`/`due_time`/`attempts`
//! columns, a `leases` table keyed by resource name, and a `scheduler_jobs`
//! table the scheduler planner reads cron definitions from.
//!
//! # Usage
//!
//! ```rust,ignore
//! use wharf_postgres::{ensure_schema, PgQueueStore, QueueTable};
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/wharf").await?;
//! ensure_schema(&pool).await?;
//! let outbox: PgQueueStore<uuid::Uuid> = PgQueueStore::new(pool.clone(), QueueTable::Outbox, "primary");
//! ```

mod lease_store;
mod queue_store;
mod schema;

pub use lease_store::PgLeaseStore;
pub use queue_store::{PgId, PgQueueStore, QueueTable};
pub use schema::ensure_all as ensure_schema;

#[cfg(test)]
mod tests;
