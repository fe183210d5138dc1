use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{Fee, Round, TxId};
use crate::operation::Operation;

/// Why a node refused an operation at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitFailure {
    pub reason: String,
}

impl fmt::Display for SubmitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.reason) }
}

/// Outcome of dispatching one operation: the identifier or the refusal reason.
pub type SubmissionResult = Result<TxId, SubmitFailure>;

/// Terminal result of polling one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationOutcome {
    Confirmed { round: Round, fee: Fee },
    /// Dropped from the pending pool; final, never retried.
    Rejected { reason: String },
    /// Round budget spent without resolution. The operation may still land
    /// later, outside the observation window.
    TimedOut { last_round: Round },
}

impl ConfirmationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationOutcome::Confirmed { .. })
    }
}

/// Everything observed about one side of a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideOutcome {
    pub op: Operation,
    pub submission: SubmissionResult,
    /// `None` only when the submission itself failed.
    pub confirmation: Option<ConfirmationOutcome>,
    /// Proposer of the confirming block, when requested and available.
    pub proposer: Option<String>,
}

impl SideOutcome {
    pub fn submit_failed(op: Operation, reason: impl Into<String>) -> Self {
        Self {
            op,
            submission: Err(SubmitFailure { reason: reason.into() }),
            confirmation: None,
            proposer: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmation.as_ref().is_some_and(ConfirmationOutcome::is_confirmed)
    }

    /// True when some node accepted the operation into its pool.
    pub fn was_accepted(&self) -> bool { self.submission.is_ok() }

    pub fn tx_id(&self) -> Option<&TxId> { self.submission.as_ref().ok() }

    pub fn confirmed_round(&self) -> Option<Round> {
        match self.confirmation {
            Some(ConfirmationOutcome::Confirmed { round, .. }) => Some(round),
            _ => None,
        }
    }

    pub fn confirmed_fee(&self) -> Option<Fee> {
        match self.confirmation {
            Some(ConfirmationOutcome::Confirmed { fee, .. }) => Some(fee),
            _ => None,
        }
    }
}

/// Classification of one race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaceOutcome {
    /// A's write is the one visible last.
    AWon,
    /// B's write is the one visible last.
    BWon,
    /// No node accepted either operation.
    BothFailed,
    /// Neither side's effect can be attributed.
    Ambiguous,
    /// Final state could not be read.
    Unknown,
}

impl RaceOutcome {
    pub const ALL: [RaceOutcome; 5] = [
        RaceOutcome::AWon,
        RaceOutcome::BWon,
        RaceOutcome::BothFailed,
        RaceOutcome::Ambiguous,
        RaceOutcome::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RaceOutcome::AWon => "A-won",
            RaceOutcome::BWon => "B-won",
            RaceOutcome::BothFailed => "both-failed",
            RaceOutcome::Ambiguous => "ambiguous",
            RaceOutcome::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RaceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
