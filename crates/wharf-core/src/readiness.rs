//! A process-wide one-shot latch the dispatcher and planner loops await at
//! startup, so they never poll a schema that isn't there yet.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::warn;

use crate::error::WharfError;

#[derive(Debug, Clone)]
pub enum GateOutcome {
    Succeeded,
    Failed(Arc<WharfError>),
    Cancelled,
}

pub struct SchemaReadyGate {
    cell: OnceCell<GateOutcome>,
}

impl Default for SchemaReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaReadyGate {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Called once by schema bootstrap. Later calls are no-ops; the gate is
    /// a one-shot latch, not a republishable signal.
    pub fn complete(&self, outcome: GateOutcome) {
        let _ = self.cell.set(outcome);
    }

    /// `true` means proceed to polling (schema succeeded, or failed but the
    /// caller should try anyway since it may have been deployed
    /// out-of-band); `false` means the process is shutting down and the
    /// loop should exit without ever polling.
    pub async fn await_ready(&self) -> bool {
        match self.cell.wait().await {
            GateOutcome::Succeeded => true,
            GateOutcome::Failed(err) => {
                warn!(error = %err, "schema readiness gate failed; proceeding anyway");
                true
            }
            GateOutcome::Cancelled => false,
        }
    }
}
