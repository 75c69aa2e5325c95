//! # wharf-core
//!
//! Storage-agnostic traits and engine for durable work queues, distributed
//! leases, and scheduled dispatch. Four concrete systems are built on top of
//! the same generic engine: a transactional outbox, a transactional inbox
//! with deduplication, a durable timer/cron scheduler, and a distributed
//! lease primitive for coordinating exclusive work across competing process
//! instances.
//!
//! ## Core Concepts
//!
//! - A **queue row** moves through `Ready -> InProgress -> {Done, Failed}`
//!   (inbox calls these `Seen`/`Processing`/`Done`/`Dead`), claimed under an
//!   [`OwnerToken`] and a time-bounded lease. [`QueueStore`] is the one
//!   generic implementation of that state machine, instantiated over two id
//!   shapes: a 128-bit opaque id for the outbox/timer/job-run queues, and a
//!   caller-supplied string for the inbox.
//! - A **lease** is a time-bounded grant of exclusive access to a named
//!   resource, guarded by a strictly increasing [`FencingToken`] so a stale
//!   holder can never be mistaken for the current one. [`LeaseRunner`] is
//!   the in-process object that holds an acquired lease, renews it on a
//!   timer, and exposes a cancellation signal when it's lost.
//! - A [`Dispatcher`] drives one queue: claim a batch, dispatch each row to
//!   a resolved [`Handler`], and settle (ack/abandon/fail) the results,
//!   retrying with backoff up to a configured attempt limit.
//!
//! ## Architecture
//!
//! ```text
//! Producer (business code)
//!     │ Enqueue() in its own transaction
//!     ▼
//! QueueStore (Ready rows)
//!     │
//!     │  Dispatcher.run_once():
//!     ▼
//! claim() ──► fetch_record() ──► HandlerResolver.resolve(topic) ──► Handler.handle()
//!     │                                                                   │
//!     │                                                    succeeded ─────┤
//!     │                                                    failed ────────┤
//!     ▼                                                                   ▼
//! ack(succeeded)                                        fail()/abandon(failed, backoff)
//! ```
//!
//! A reaper calls [`QueueStore::reap_expired`] to recover rows whose lease
//! elapsed without an ack; no separate daemon type is needed since reap is
//! idempotent and safe from any caller at any time.
//!
//! ## Guarantees
//!
//! - At-least-once delivery for outbox/inbox rows; handlers must be
//!   idempotent.
//! - Two concurrent claims on overlapping candidate sets return disjoint id
//!   sets.
//! - A resource's fencing-token sequence is strictly increasing across every
//!   acquire and renew.
//!
//! This crate has no Postgres dependency; see `wharf-postgres` for the
//! concrete storage layer, `wharf-outbox`/`wharf-scheduler` for the
//! producer-facing facades, and `wharf-testing` for in-memory fakes used in
//! this crate's own unit tests.

mod backoff;
mod clock;
mod dispatcher;
mod error;
mod handler;
mod ids;
mod lease;
mod lease_runner;
mod metrics;
mod queue;
mod readiness;
mod store_provider;

#[cfg(test)]
mod dispatcher_tests;
#[cfg(test)]
mod lease_runner_tests;

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use clock::{MonotonicClock, SystemMonotonicClock};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{Categorizable, ErrorCategory, WharfError};
pub use handler::{Handler, HandlerResolver};
pub use ids::{FencingToken, OwnerToken};
pub use lease::{LeaseOutcome, LeaseStore};
pub use lease_runner::{LeaseRunner, LeaseService};
pub use metrics::{MetricsSink, NoopMetricsSink};
pub use queue::{QueueId, QueueRecord, QueueStatus, QueueStore};
pub use readiness::{GateOutcome, SchemaReadyGate};
pub use store_provider::{
    DynamicStoreProvider, IdentifiedStore, RoundRobin, SelectionStrategy, StaticStoreProvider,
    StoreProvider,
};

pub use async_trait::async_trait;
