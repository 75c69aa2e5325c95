//! The distributed lease primitive: monotonic fencing tokens over a named
//! resource. See [`crate::lease_runner`] for the in-process owner that wraps
//! an acquired lease with auto-renewal.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;

use crate::error::WharfError;
use crate::ids::{FencingToken, OwnerToken};

/// Result of an `acquire` or `renew` call. `granted` is `false` exactly when
/// the resource is held by someone else and not expired (acquire), or when
/// the caller no longer owns the lease (renew).
#[derive(Debug, Clone, Copy)]
pub struct LeaseOutcome {
    pub granted: bool,
    pub fencing_token: Option<FencingToken>,
}

impl LeaseOutcome {
    pub fn denied() -> Self {
        Self {
            granted: false,
            fencing_token: None,
        }
    }

    pub fn granted(token: FencingToken) -> Self {
        Self {
            granted: true,
            fencing_token: Some(token),
        }
    }
}

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Ensures a row exists for `resource`; if unowned, expired, or already
    /// owned by `owner` (re-entrant), grants it: sets `owner_token`,
    /// `lease_until := now + lease_for`, and bumps `fencing_token`. The bump
    /// on re-entrant acquire is required so downstream consumers see a new
    /// epoch even when the same process re-acquires.
    async fn acquire(
        &self,
        resource: &str,
        owner: OwnerToken,
        lease_for: Duration,
        context: Option<Value>,
    ) -> Result<LeaseOutcome, WharfError>;

    /// Only succeeds if the current row is owned by `owner` and not expired.
    /// Sets `lease_until := now + lease_for` and bumps `fencing_token`.
    async fn renew(
        &self,
        resource: &str,
        owner: OwnerToken,
        lease_for: Duration,
    ) -> Result<LeaseOutcome, WharfError>;

    /// Clears ownership iff currently owned by `owner`. Does not decrement
    /// `fencing_token`.
    async fn release(&self, resource: &str, owner: OwnerToken) -> Result<(), WharfError>;
}
