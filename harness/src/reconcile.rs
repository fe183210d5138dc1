//! Offline fee reconciliation by block scan.
//!
//! Identifier lookups stop working once a node prunes its pending records, but
//! the correlation note travels inside the operation and stays in block
//! history. The scan walks backward from the current round, matching decoded
//! notes against the outstanding set, and stops as soon as that set is empty
//! or the round window is spent.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::Path;

use endpoint_api::{EndpointClient, EndpointError};
use race_types::{BlockRecord, Fee, Note, Round, TxId};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::trial_log::has_identifier;

/// Fee column value for identifiers the scan could not resolve.
pub const NOT_FOUND: &str = "not found";
const PROGRESS_EVERY: u64 = 50;

const ID_COLUMNS: [&str; 2] = ["operation_identifier", "txid"];
const NOTE_COLUMNS: [&str; 2] = ["correlation_note", "note"];

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("cannot read the current round: {0}")]
    CurrentRound(#[source] EndpointError),
    #[error("input has no '{0}' column")]
    MissingColumn(&'static str),
    #[error("reconcile i/o: {0}")]
    Io(#[from] io::Error),
    #[error("reconcile csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub fees: BTreeMap<TxId, Fee>,
    pub proposers: BTreeMap<TxId, String>,
    pub not_found: BTreeSet<TxId>,
    pub unavailable_blocks: Vec<Round>,
    pub start_round: Round,
    pub rounds_scanned: u64,
}

impl ReconcileReport {
    pub fn fee_cell(&self, id: &TxId) -> String {
        self.fees.get(id).map(|f| f.to_string()).unwrap_or_else(|| NOT_FOUND.to_string())
    }
}

async fn fetch_block<C>(endpoint: &C, round: Round, cfg: &ScanConfig) -> Result<BlockRecord, EndpointError>
where
    C: EndpointClient + ?Sized,
{
    let mut attempt = 0u32;
    let mut backoff = cfg.block_backoff();
    loop {
        match endpoint.block_contents(round).await {
            Ok(block) => return Ok(block),
            Err(e) if attempt >= cfg.block_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                debug!(target: "reconcile", round, attempt, "block fetch failed, retrying: {e}");
                sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
    }
}

async fn current_round<C>(endpoint: &C, cfg: &ScanConfig) -> Result<Round, EndpointError>
where
    C: EndpointClient + ?Sized,
{
    let mut attempt = 0u32;
    loop {
        match endpoint.current_round().await {
            Ok(r) => return Ok(r),
            Err(e) if attempt >= cfg.block_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                debug!(target: "reconcile", attempt, "current round unavailable: {e}");
                sleep(cfg.block_backoff()).await;
            }
        }
    }
}

/// Resolve fees for `pending` notes by scanning at most `rounds_to_scan`
/// rounds backward from the current round (never below round 1).
pub async fn reconcile<C>(
    pending: &HashSet<Note>,
    note_to_id: &HashMap<Note, TxId>,
    endpoint: &C,
    cfg: &ScanConfig,
) -> Result<ReconcileReport, ReconcileError>
where
    C: EndpointClient + ?Sized,
{
    let mut remaining: HashSet<&Note> = pending.iter().collect();
    let mut report = ReconcileReport::default();

    let current = current_round(endpoint, cfg).await.map_err(ReconcileError::CurrentRound)?;
    report.start_round = current;

    let lowest = current.saturating_sub(cfg.rounds_to_scan.saturating_sub(1)).max(1);
    info!(
        target: "reconcile",
        endpoint = endpoint.label(),
        from = current,
        down_to = lowest,
        pending = remaining.len(),
        "scanning blocks"
    );

    let mut round = current;
    while !remaining.is_empty() && round >= lowest && cfg.rounds_to_scan > 0 {
        report.rounds_scanned += 1;
        match fetch_block(endpoint, round, cfg).await {
            Ok(block) => {
                for (note, fee) in block.decoded_notes() {
                    if !remaining.remove(&note) {
                        continue;
                    }
                    match note_to_id.get(&note) {
                        Some(id) => {
                            debug!(target: "reconcile", round, %note, %id, fee, "matched");
                            report.fees.insert(id.clone(), fee);
                            if let Some(p) = block.proposer.as_ref() {
                                report.proposers.insert(id.clone(), p.clone());
                            }
                        }
                        None => debug!(target: "reconcile", round, %note, "matched note has no identifier"),
                    }
                }
            }
            Err(e) => {
                warn!(target: "reconcile", round, "block unavailable: {e}");
                report.unavailable_blocks.push(round);
            }
        }

        if report.rounds_scanned % PROGRESS_EVERY == 0 {
            info!(
                target: "reconcile",
                round,
                scanned = report.rounds_scanned,
                remaining = remaining.len(),
                "scan progress"
            );
        }
        if round == lowest {
            break;
        }
        round -= 1;
    }

    for note in remaining {
        if let Some(id) = note_to_id.get(note) {
            report.not_found.insert(id.clone());
        }
    }
    info!(
        target: "reconcile",
        scanned = report.rounds_scanned,
        found = report.fees.len(),
        not_found = report.not_found.len(),
        unavailable = report.unavailable_blocks.len(),
        "scan finished"
    );
    Ok(report)
}

/// What `reconcile_log` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to do; the message says why.
    EmptyInput(String),
    Written { rows: usize, matched: usize, report: ReconcileReport },
}

fn find_column(headers: &csv::StringRecord, names: &[&'static str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

/// Reconcile a trial log file: every input row is written to `output` with a
/// `fee` column appended (and `proposer_scan` when configured).
pub async fn reconcile_log<C>(
    input: &Path,
    output: &Path,
    endpoint: &C,
    cfg: &ScanConfig,
) -> Result<ReconcileOutcome, ReconcileError>
where
    C: EndpointClient + ?Sized,
{
    if !input.exists() {
        let msg = format!("input file {} does not exist", input.display());
        warn!(target: "reconcile", "{msg}");
        return Ok(ReconcileOutcome::EmptyInput(msg));
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(input)?;
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        let msg = format!("input file {} is empty", input.display());
        warn!(target: "reconcile", "{msg}");
        return Ok(ReconcileOutcome::EmptyInput(msg));
    }
    let id_col = find_column(&headers, &ID_COLUMNS).ok_or(ReconcileError::MissingColumn(ID_COLUMNS[0]))?;
    let note_col = find_column(&headers, &NOTE_COLUMNS).ok_or(ReconcileError::MissingColumn(NOTE_COLUMNS[0]))?;

    let mut records = Vec::new();
    for rec in reader.records() {
        records.push(rec?);
    }
    if records.is_empty() {
        let msg = format!("no operations found in {}", input.display());
        warn!(target: "reconcile", "{msg}");
        return Ok(ReconcileOutcome::EmptyInput(msg));
    }

    let mut pending = HashSet::new();
    let mut note_to_id = HashMap::new();
    for rec in &records {
        let id = rec.get(id_col).unwrap_or_default().trim();
        let note = rec.get(note_col).unwrap_or_default().trim();
        if !has_identifier(id) || note.is_empty() {
            continue;
        }
        let note = Note::new(note);
        pending.insert(note.clone());
        note_to_id.insert(note, TxId::new(id));
    }

    let report = reconcile(&pending, &note_to_id, endpoint, cfg).await?;

    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(output)?;
    let mut out_headers = headers.clone();
    out_headers.push_field("fee");
    if cfg.proposer_column {
        out_headers.push_field("proposer_scan");
    }
    writer.write_record(&out_headers)?;

    let mut matched = 0usize;
    for rec in &records {
        let id = TxId::new(rec.get(id_col).unwrap_or_default().trim());
        let mut out = rec.clone();
        let fee = report.fee_cell(&id);
        if fee != NOT_FOUND {
            matched += 1;
        }
        out.push_field(&fee);
        if cfg.proposer_column {
            out.push_field(report.proposers.get(&id).map(String::as_str).unwrap_or(NOT_FOUND));
        }
        writer.write_record(&out)?;
    }
    writer.flush()?;

    info!(
        target: "reconcile",
        rows = records.len(),
        matched,
        output = %output.display(),
        "reconciled log written"
    );
    Ok(ReconcileOutcome::Written { rows: records.len(), matched, report })
}
