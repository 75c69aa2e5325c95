//! The in-process owner of a live lease. Auto-renews on a timer, exposes a
//! cancellation signal when the lease is lost.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::WharfError;
use crate::ids::{FencingToken, OwnerToken};
use crate::lease::LeaseStore;

/// Renewal fires at `lease_seconds * RENEW_PERCENT`, plus jitter, so a
/// single missed tick still leaves margin before the lease actually expires.
const RENEW_PERCENT: f64 = 0.6;
const JITTER_MS: u64 = 250;

/// Acquires and holds `resource` until lost or dropped. `Acquire` returns
/// `None` rather than a runner when the resource is already held elsewhere.
pub struct LeaseService {
    store: Arc<dyn LeaseStore>,
}

impl LeaseService {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    pub async fn acquire(
        &self,
        resource: &str,
        lease_seconds: i64,
        context: Option<serde_json::Value>,
    ) -> Result<Option<LeaseRunner>, WharfError> {
        self.acquire_as(resource, OwnerToken::new(), lease_seconds, context).await
    }

    /// Like [`LeaseService::acquire`], but with the owner token supplied by
    /// the caller instead of minted fresh. This is what makes an owner's
    /// re-acquisition of a resource it still holds (or once held) visible as
    /// a single identity to the store, so `LeaseStore::acquire`'s re-entrant
    /// path bumps the fencing token rather than granting a brand new owner.
    pub async fn acquire_as(
        &self,
        resource: &str,
        owner: OwnerToken,
        lease_seconds: i64,
        context: Option<serde_json::Value>,
    ) -> Result<Option<LeaseRunner>, WharfError> {
        let outcome = self
            .store
            .acquire(
                resource,
                owner,
                ChronoDuration::seconds(lease_seconds),
                context,
            )
            .await?;

        if !outcome.granted {
            return Ok(None);
        }

        let token = outcome
            .fencing_token
            .expect("a granted lease outcome always carries a fencing token");

        Ok(Some(LeaseRunner::spawn(
            self.store.clone(),
            resource.to_string(),
            owner,
            lease_seconds,
            token,
        )))
    }
}

pub struct LeaseRunner {
    resource: String,
    owner: OwnerToken,
    store: Arc<dyn LeaseStore>,
    fencing_tx: watch::Sender<FencingToken>,
    fencing_token: watch::Receiver<FencingToken>,
    lost: CancellationToken,
    renew_task: Option<JoinHandle<()>>,
}

impl LeaseRunner {
    pub(crate) fn spawn(
        store: Arc<dyn LeaseStore>,
        resource: String,
        owner: OwnerToken,
        lease_seconds: i64,
        initial_fencing_token: FencingToken,
    ) -> Self {
        let (tx, rx) = watch::channel(initial_fencing_token);
        let lost = CancellationToken::new();

        let renew_store = store.clone();
        let renew_resource = resource.clone();
        let lost_signal = lost.clone();
        let renew_tx = tx.clone();

        let renew_task = tokio::spawn(async move {
            let base_secs = (lease_seconds as f64 * RENEW_PERCENT).max(0.05);
            loop {
                let jitter_ms = rand::thread_rng().gen_range(0..=JITTER_MS);
                let sleep_for =
                    StdDuration::from_millis((base_secs * 1000.0) as u64 + jitter_ms);

                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = lost_signal.cancelled() => return,
                }

                match renew_store
                    .renew(&renew_resource, owner, ChronoDuration::seconds(lease_seconds))
                    .await
                {
                    Ok(outcome) if outcome.granted => {
                        if let Some(token) = outcome.fencing_token {
                            let _ = renew_tx.send(token);
                        }
                        debug!(resource = %renew_resource, "lease renewed");
                    }
                    Ok(_) => {
                        warn!(resource = %renew_resource, "lease lost: renewal denied");
                        lost_signal.cancel();
                        return;
                    }
                    Err(err) => {
                        warn!(resource = %renew_resource, error = %err, "lease renewal errored");
                        lost_signal.cancel();
                        return;
                    }
                }
            }
        });

        Self {
            resource,
            owner,
            store,
            fencing_tx: tx,
            fencing_token: rx,
            lost,
            renew_task: Some(renew_task),
        }
    }

    pub fn fencing_token(&self) -> FencingToken {
        *self.fencing_token.borrow()
    }

    pub fn owner(&self) -> OwnerToken {
        self.owner
    }

    /// Fires exactly once when the lease is lost (or the runner is
    /// disposed). Borrowers that want to react to loss should `select!` on
    /// this alongside their own work.
    pub fn cancellation_signal(&self) -> CancellationToken {
        self.lost.clone()
    }

    /// The borrower must call this before any externally-visible action. If
    /// the lease has been lost, surfaces `WharfError::LeaseLost`.
    pub fn throw_if_lost(&self) -> Result<(), WharfError> {
        if self.lost.is_cancelled() {
            Err(WharfError::LeaseLost {
                resource: self.resource.clone(),
                owner: self.owner,
            })
        } else {
            Ok(())
        }
    }

    /// Forces an out-of-band renewal rather than waiting for the next timer
    /// tick. Returns `true` if the renewal succeeded.
    pub async fn try_renew_now(&self, lease_seconds: i64) -> Result<bool, WharfError> {
        if self.lost.is_cancelled() {
            return Ok(false);
        }
        let outcome = self
            .store
            .renew(&self.resource, self.owner, ChronoDuration::seconds(lease_seconds))
            .await?;
        if outcome.granted {
            if let Some(token) = outcome.fencing_token {
                let _ = self.fencing_tx.send(token);
            }
        } else {
            self.lost.cancel();
        }
        Ok(outcome.granted)
    }
}

impl Drop for LeaseRunner {
    fn drop(&mut self) {
        if let Some(handle) = self.renew_task.take() {
            handle.abort();
        }
        // Best-effort release. Loss of connectivity here is tolerated; the
        // lease expires naturally if this never lands.
        let store = self.store.clone();
        let resource = self.resource.clone();
        let owner = self.owner;
        tokio::spawn(async move {
            if let Err(err) = store.release(&resource, owner).await {
                debug!(%resource, error = %err, "lease release on drop failed; it will expire naturally");
            }
        });
    }
}
