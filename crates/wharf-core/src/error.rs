//! Error taxonomy shared by every subsystem.

use thiserror::Error;

use crate::ids::OwnerToken;

/// How the dispatcher should react to an error: retry it, fail the row
/// terminally, or surface it to the caller synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Terminal,
    Configuration,
}

pub trait Categorizable {
    fn category(&self) -> ErrorCategory;
}

#[derive(Debug, Error)]
pub enum WharfError {
    /// Connection reset, deadlock victim, lock timeout: surfaced to the
    /// dispatcher, counted as a failure, retried per backoff policy.
    #[error("transient infrastructure error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Any exception from a handler. Retryable until `max_attempts`.
    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// No handler registered for a topic. Terminal on first occurrence;
    /// retrying will not make a handler appear.
    #[error("no handler registered for topic `{0}`")]
    MissingHandler(String),

    /// The lease runner's cancellation signal has fired. The canonical form
    /// surfaced to a lease holder after loss.
    #[error("lease lost for resource `{resource}` (owner {owner})")]
    LeaseLost { resource: String, owner: OwnerToken },

    /// Empty message id, empty topic, etc. Surfaced synchronously at the
    /// enqueue boundary; never enters the queue.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Categorizable for WharfError {
    fn category(&self) -> ErrorCategory {
        match self {
            WharfError::Transient(_) => ErrorCategory::Transient,
            WharfError::Handler(_) => ErrorCategory::Transient,
            WharfError::MissingHandler(_) => ErrorCategory::Terminal,
            WharfError::LeaseLost { .. } => ErrorCategory::Terminal,
            WharfError::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

impl From<anyhow::Error> for WharfError {
    fn from(err: anyhow::Error) -> Self {
        WharfError::Transient(err)
    }
}
