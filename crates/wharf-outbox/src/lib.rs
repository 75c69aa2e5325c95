//! Producer-facing facades over the outbox and inbox queues. Everything
//! dispatch-shaped (claim, retry, dead-lettering) lives in `wharf-core`; this
//! crate is just the two narrow write paths a business transaction touches:
//! enqueueing an outgoing message alongside other writes, and deduplicating
//! an incoming one before it is processed.

mod inbox;
mod outbox;
mod scheduler;

pub use inbox::Inbox;
pub use outbox::{Outbox, OutboxRegistry};
pub use scheduler::Scheduler;
