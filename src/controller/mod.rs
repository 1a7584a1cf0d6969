//! Reconciliation engine
//!
//! Shared by every resource kind: identity matching, diffing, merge
//! policy, observed-state fetch, deployment and convergence polling, all
//! sequenced by the [`ReconciliationController`].

pub mod deploy;
pub mod diff;
pub mod fetch;
pub mod matcher;
pub mod merge;
pub mod poller;
mod reconciler;

pub use deploy::{build_units, DeployOrchestrator, DeployReport, DeployUnit};
pub use diff::{CompareMode, DiffEngine, DiffResult, MismatchReasons};
pub use fetch::{fetch_have, fetch_inventory, SwitchInventory};
pub use merge::MergePolicy;
pub use poller::{ConvergencePoller, PollOutcome, Poller};
pub use reconciler::{
    DiffReport, MergeReport, ReconcileOutcome, ReconcileRequest, ReconciliationContext,
    ReconciliationController, Stage,
};
