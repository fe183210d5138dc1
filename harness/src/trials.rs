//! Sequential trial runs and outcome tallies.

use std::collections::BTreeMap;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use endpoint_api::EndpointClient;
use race_types::{AppId, Note, OpKind, RaceOutcome, SideOutcome};
use serde::Serialize;
use tracing::{info, warn};

use crate::classify::{classify, StateObservation, Verdict};
use crate::config::{HarnessConfig, OperationConfig};
use crate::endpoint::probe;
use crate::fee::BasicFeeOracle;
use crate::race::DualSubmitter;
use crate::trial_log::TrialLogWriter;
use crate::txn::{AppCallSigner, OpSpec};

/// One completed race. Never mutated once classified.
#[derive(Debug, Clone)]
pub struct Trial {
    pub index: usize,
    pub a: SideOutcome,
    pub b: SideOutcome,
    pub pre_state: StateObservation,
    pub post_state: StateObservation,
    pub verdict: Verdict,
}

/// Running count of each outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeTally {
    counts: [usize; 5],
}

impl OutcomeTally {
    fn slot(outcome: RaceOutcome) -> usize {
        match outcome {
            RaceOutcome::AWon => 0,
            RaceOutcome::BWon => 1,
            RaceOutcome::BothFailed => 2,
            RaceOutcome::Ambiguous => 3,
            RaceOutcome::Unknown => 4,
        }
    }

    pub fn record(&mut self, outcome: RaceOutcome) {
        self.counts[Self::slot(outcome)] += 1;
    }

    pub fn get(&self, outcome: RaceOutcome) -> usize { self.counts[Self::slot(outcome)] }

    pub fn total(&self) -> usize { self.counts.iter().sum() }

    pub fn percent(&self, outcome: RaceOutcome) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.get(outcome) as f64 * 100.0 / total as f64
    }

    pub fn iter(&self) -> impl Iterator<Item = (RaceOutcome, usize)> + '_ {
        RaceOutcome::ALL.iter().map(move |o| (*o, self.get(*o)))
    }
}

/// Correlation notes `<prefix>_<run millis>_<trial>`, unique within a run.
#[derive(Debug, Clone)]
pub struct NoteFactory {
    run_id: i64,
    prefix_a: String,
    prefix_b: String,
}

impl NoteFactory {
    pub fn new(run_id: i64, prefix_a: &str, prefix_b: &str) -> Self {
        let (prefix_a, prefix_b) = if prefix_a == prefix_b {
            (format!("{prefix_a}-a"), format!("{prefix_b}-b"))
        } else {
            (prefix_a.to_string(), prefix_b.to_string())
        };
        Self { run_id, prefix_a, prefix_b }
    }

    pub fn starting_now(prefix_a: &str, prefix_b: &str) -> Self {
        Self::new(chrono::Utc::now().timestamp_millis(), prefix_a, prefix_b)
    }

    pub fn note(&self, kind: OpKind, trial: usize) -> Note {
        let prefix = match kind {
            OpKind::A => &self.prefix_a,
            OpKind::B => &self.prefix_b,
        };
        Note::new(format!("{prefix}_{}_{trial}", self.run_id))
    }
}

/// What each trial races.
#[derive(Debug, Clone)]
pub struct TrialPlan {
    pub op_a: OperationConfig,
    pub op_b: OperationConfig,
    pub app_id: AppId,
    pub state_key: Vec<u8>,
    pub trials: usize,
    pub pause: Duration,
}

impl TrialPlan {
    pub fn from_config(cfg: &HarnessConfig) -> Self {
        Self {
            op_a: cfg.op_a.clone(),
            op_b: cfg.op_b.clone(),
            app_id: cfg.app_id,
            state_key: cfg.state_key.as_bytes().to_vec(),
            trials: cfg.trials,
            pause: cfg.trial_pause(),
        }
    }

    fn spec(&self, kind: OpKind, notes: &NoteFactory, trial: usize) -> OpSpec {
        let op = match kind {
            OpKind::A => &self.op_a,
            OpKind::B => &self.op_b,
        };
        OpSpec {
            kind,
            method: op.method.clone(),
            tag: op.tag.as_bytes().to_vec(),
            note: notes.note(kind, trial),
            fee: op.fee,
            app_id: self.app_id,
        }
    }
}

/// The finished run handed back to the caller.
#[derive(Debug, Clone)]
pub struct TrialRun {
    pub trials: Vec<Trial>,
    pub tally: OutcomeTally,
}

impl TrialRun {
    pub fn summary(&self) -> RunSummary {
        let mut outcomes = BTreeMap::new();
        for (outcome, count) in self.tally.iter() {
            outcomes.insert(
                outcome.as_str().to_string(),
                OutcomeShare { count, percent: self.tally.percent(outcome) },
            );
        }
        RunSummary {
            trials: self.trials.len(),
            outcomes,
            confirmed_fee_a: self.trials.iter().filter_map(|t| t.a.confirmed_fee()).sum(),
            confirmed_fee_b: self.trials.iter().filter_map(|t| t.b.confirmed_fee()).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeShare {
    pub count: usize,
    pub percent: f64,
}

/// Serializable end-of-run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub trials: usize,
    pub outcomes: BTreeMap<String, OutcomeShare>,
    /// Fees paid by confirmed operations, as reported by the pending lookup.
    pub confirmed_fee_a: u64,
    pub confirmed_fee_b: u64,
}

/// Runs trials strictly one after another and owns their ordered log.
pub struct TrialAggregator {
    submitter: DualSubmitter,
    client_a: Arc<dyn EndpointClient>,
    client_b: Arc<dyn EndpointClient>,
    plan: TrialPlan,
    notes: NoteFactory,
    trials: Vec<Trial>,
    tally: OutcomeTally,
    log: Option<TrialLogWriter<File>>,
}

impl TrialAggregator {
    pub fn new(
        submitter: DualSubmitter,
        client_a: Arc<dyn EndpointClient>,
        client_b: Arc<dyn EndpointClient>,
        plan: TrialPlan,
    ) -> Self {
        let notes = NoteFactory::starting_now(plan.op_a.method_name(), plan.op_b.method_name());
        Self {
            submitter,
            client_a,
            client_b,
            plan,
            notes,
            trials: Vec::new(),
            tally: OutcomeTally::default(),
            log: None,
        }
    }

    /// Append each finished trial to `log` as it completes.
    pub fn with_log(mut self, log: TrialLogWriter<File>) -> Self {
        self.log = Some(log);
        self
    }

    /// Non-mutating read of the contended cell. Tries A's node first, then B's.
    async fn observe_state(&self) -> StateObservation {
        let read = match self.client_a.read_state(self.plan.app_id, &self.plan.state_key).await {
            Err(e) => {
                warn!(target: "trials", endpoint = self.client_a.label(), "state read failed, trying other node: {e}");
                self.client_b.read_state(self.plan.app_id, &self.plan.state_key).await
            }
            ok => ok,
        };
        StateObservation::from_read(read)
    }

    /// Run trial `index` to completion and append it.
    pub async fn run_trial(&mut self, index: usize) -> Result<&Trial> {
        let spec_a = self.plan.spec(OpKind::A, &self.notes, index);
        let spec_b = self.plan.spec(OpKind::B, &self.notes, index);

        let pre_state = self.observe_state().await;
        let (a, b) = self
            .submitter
            .race(&spec_a, &spec_b, self.client_a.clone(), self.client_b.clone())
            .await;
        let post_state = self.observe_state().await;
        let verdict = classify(&pre_state, &post_state, &a, &b);

        info!(
            target: "trials",
            trial = index,
            outcome = %verdict.outcome,
            basis = %verdict.basis,
            pre = %pre_state,
            post = %post_state,
            a_round = ?a.confirmed_round(),
            b_round = ?b.confirmed_round(),
            "trial classified"
        );

        let trial = Trial { index, a, b, pre_state, post_state, verdict };
        if let Some(log) = self.log.as_mut() {
            log.append(&trial)
                .with_context(|| format!("appending trial {index} to the trial log"))?;
        }
        self.tally.record(verdict.outcome);
        self.trials.push(trial);
        self.trials.last().context("trial missing right after append")
    }

    /// Run every planned trial. A trial that ends ambiguous or unknown still
    /// counts; only a trial log write failure stops the run.
    pub async fn run(mut self) -> Result<TrialRun> {
        let total = self.plan.trials;
        for index in 0..total {
            self.run_trial(index).await?;
            if index + 1 < total && !self.plan.pause.is_zero() {
                tokio::time::sleep(self.plan.pause).await;
            }
        }
        info!(
            target: "trials",
            trials = total,
            a_won = self.tally.get(RaceOutcome::AWon),
            b_won = self.tally.get(RaceOutcome::BWon),
            both_failed = self.tally.get(RaceOutcome::BothFailed),
            ambiguous = self.tally.get(RaceOutcome::Ambiguous),
            unknown = self.tally.get(RaceOutcome::Unknown),
            "run complete"
        );
        Ok(TrialRun { trials: self.trials, tally: self.tally })
    }
}

/// Probe both endpoints, then run the configured trials and write the log.
pub async fn run_race(
    cfg: &HarnessConfig,
    client_a: Arc<dyn EndpointClient>,
    client_b: Arc<dyn EndpointClient>,
) -> Result<TrialRun> {
    probe(client_a.as_ref()).await?;
    probe(client_b.as_ref()).await?;

    let signer = AppCallSigner::from_seed_hex(cfg.signer_seed()?)
        .context("loading signer seed")?
        .with_oracle(Arc::new(BasicFeeOracle { max_fee: cfg.max_fee }))
        .with_validity_rounds(cfg.validity_rounds);
    info!(target: "trials", sender = %signer.address(), trials = cfg.trials, app_id = cfg.app_id, "starting run");

    let submitter = DualSubmitter::new(signer, cfg.poll.clone()).with_proposer_lookup(cfg.record_proposer);
    let log = TrialLogWriter::create(&cfg.trial_log)
        .with_context(|| format!("creating trial log {}", cfg.trial_log.display()))?;

    TrialAggregator::new(submitter, client_a, client_b, TrialPlan::from_config(cfg))
        .with_log(log)
        .run()
        .await
}
