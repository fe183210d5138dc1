pub mod classify;
pub mod config;
pub mod endpoint;
pub mod fee;
pub mod poller;
pub mod race;
pub mod reconcile;
pub mod trial_log;
pub mod trials;
pub mod txn;

pub use crate::classify::{classify, Basis, StateObservation, Verdict};
pub use crate::config::{HarnessConfig, OperationConfig, PollConfig, ScanConfig};
pub use crate::fee::{BasicFeeOracle, FeeOracle, FeePolicy};
pub use crate::race::DualSubmitter;
pub use crate::reconcile::{reconcile, reconcile_log, ReconcileOutcome, ReconcileReport};
pub use crate::trials::{run_race, OutcomeTally, RunSummary, Trial, TrialAggregator, TrialPlan, TrialRun};
pub use crate::txn::{AppCallSigner, OpSpec};
