//! In-memory fakes for wharf-core's traits, used for fast unit tests that
//! don't need a Postgres instance. See `wharf-postgres`'s `#[sqlx::test]`
//! suite for the integration-level coverage of the real storage layer.

mod fake_clock;
mod in_memory_lease;
mod in_memory_queue;
mod recording_metrics;

pub use fake_clock::FakeClock;
pub use in_memory_lease::InMemoryLeaseStore;
pub use in_memory_queue::{ClaimOrder, InMemoryQueueRegistry, InMemoryQueueStore};
pub use recording_metrics::RecordingMetricsSink;
