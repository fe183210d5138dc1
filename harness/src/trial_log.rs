//! Trial log: two CSV rows per trial, one per side, appended as trials finish.

use std::fs::File;
use std::io;
use std::path::Path;

use race_types::{ConfirmationOutcome, RaceOutcome, SideOutcome};
use serde::{Deserialize, Serialize};

use crate::trials::Trial;

pub const HEADER: [&str; 9] = [
    "trial_index",
    "operation_identifier",
    "correlation_note",
    "operation_kind",
    "method",
    "status",
    "confirmed_round",
    "race_outcome",
    "proposer",
];

/// Identifier written for a side whose submission never reached a node.
pub const NO_IDENTIFIER: &str = "N/A";

/// Whether a logged identifier names an operation some node accepted.
pub fn has_identifier(id: &str) -> bool {
    let id = id.trim();
    !id.is_empty() && id != NO_IDENTIFIER
}

#[derive(Debug, thiserror::Error)]
pub enum TrialLogError {
    #[error("trial log i/o: {0}")]
    Io(#[from] io::Error),
    #[error("trial log csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialLogRow {
    pub trial_index: usize,
    pub operation_identifier: String,
    pub correlation_note: String,
    /// Race side, `A` or `B`.
    pub operation_kind: String,
    pub method: String,
    pub status: String,
    pub confirmed_round: String,
    pub race_outcome: String,
    #[serde(default)]
    pub proposer: String,
}

impl TrialLogRow {
    pub fn from_side(trial_index: usize, side: &SideOutcome, outcome: RaceOutcome) -> Self {
        let (status, confirmed_round) = match (&side.submission, &side.confirmation) {
            (Err(failure), _) => (format!("Submission Failed: {failure}"), String::new()),
            (Ok(_), Some(ConfirmationOutcome::Confirmed { round, .. })) => {
                ("Confirmed".to_string(), round.to_string())
            }
            (Ok(_), Some(ConfirmationOutcome::Rejected { reason })) => {
                (format!("Rejected: {reason}"), String::new())
            }
            (Ok(_), Some(ConfirmationOutcome::TimedOut { last_round })) => {
                ("Not Confirmed".to_string(), format!("Timed out after round {last_round}"))
            }
            (Ok(_), None) => ("Not Confirmed".to_string(), String::new()),
        };
        Self {
            trial_index,
            operation_identifier: side
                .tx_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| NO_IDENTIFIER.to_string()),
            correlation_note: side.op.note.to_string(),
            operation_kind: side.op.kind.as_str().to_string(),
            method: side.op.method_name().to_string(),
            status,
            confirmed_round,
            race_outcome: outcome.as_str().to_string(),
            proposer: side.proposer.clone().unwrap_or_default(),
        }
    }
}

/// Both rows of a trial, A first.
pub fn rows_for(trial: &Trial) -> [TrialLogRow; 2] {
    [
        TrialLogRow::from_side(trial.index, &trial.a, trial.verdict.outcome),
        TrialLogRow::from_side(trial.index, &trial.b, trial.verdict.outcome),
    ]
}

pub struct TrialLogWriter<W: io::Write> {
    inner: csv::Writer<W>,
}

impl TrialLogWriter<File> {
    /// Start a fresh log at `path`, replacing any previous file.
    pub fn create(path: &Path) -> Result<Self, TrialLogError> {
        Ok(Self { inner: csv::Writer::from_path(path)? })
    }
}

impl<W: io::Write> TrialLogWriter<W> {
    pub fn from_writer(w: W) -> Self {
        Self { inner: csv::Writer::from_writer(w) }
    }

    /// Write both rows of `trial` and flush, so a crash keeps every finished trial.
    pub fn append(&mut self, trial: &Trial) -> Result<(), TrialLogError> {
        for row in rows_for(trial) {
            self.inner.serialize(row)?;
        }
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, TrialLogError> {
        self.inner
            .into_inner()
            .map_err(|e| TrialLogError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }
}

pub fn read_rows(path: &Path) -> Result<Vec<TrialLogRow>, TrialLogError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
