//! An in-process stand-in for the distributed lease table.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use wharf_core::{async_trait, FencingToken, LeaseOutcome, LeaseStore, OwnerToken, WharfError};

struct LeaseRow {
    owner: Option<OwnerToken>,
    lease_until: Option<DateTime<Utc>>,
    fencing_token: i64,
    context: Option<Value>,
}

impl Default for LeaseRow {
    fn default() -> Self {
        Self {
            owner: None,
            lease_until: None,
            fencing_token: 0,
            context: None,
        }
    }
}

#[derive(Default)]
pub struct InMemoryLeaseStore {
    rows: Mutex<HashMap<String, LeaseRow>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_owner(&self, resource: &str) -> Option<OwnerToken> {
        self.rows.lock().unwrap().get(resource).and_then(|r| r.owner)
    }

    pub fn current_fencing_token(&self, resource: &str) -> Option<i64> {
        self.rows.lock().unwrap().get(resource).map(|r| r.fencing_token)
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn acquire(
        &self,
        resource: &str,
        owner: OwnerToken,
        lease_for: Duration,
        context: Option<Value>,
    ) -> Result<LeaseOutcome, WharfError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let row = rows.entry(resource.to_string()).or_default();

        let expired = match row.lease_until {
            Some(t) => t <= now,
            None => true,
        };
        let unowned = row.owner.is_none();
        let reentrant = row.owner == Some(owner);

        if unowned || expired || reentrant {
            row.owner = Some(owner);
            row.lease_until = Some(now + lease_for);
            row.fencing_token += 1;
            row.context = context;
            Ok(LeaseOutcome::granted(FencingToken::from_raw(row.fencing_token)))
        } else {
            Ok(LeaseOutcome::denied())
        }
    }

    async fn renew(
        &self,
        resource: &str,
        owner: OwnerToken,
        lease_for: Duration,
    ) -> Result<LeaseOutcome, WharfError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(resource) else {
            return Ok(LeaseOutcome::denied());
        };

        let still_owned = row.owner == Some(owner)
            && row.lease_until.map(|t| t > now).unwrap_or(false);

        if still_owned {
            row.lease_until = Some(now + lease_for);
            row.fencing_token += 1;
            Ok(LeaseOutcome::granted(FencingToken::from_raw(row.fencing_token)))
        } else {
            Ok(LeaseOutcome::denied())
        }
    }

    async fn release(&self, resource: &str, owner: OwnerToken) -> Result<(), WharfError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(resource) {
            if row.owner == Some(owner) {
                row.owner = None;
                row.lease_until = None;
            }
        }
        Ok(())
    }
}
