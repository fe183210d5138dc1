//! End-to-end runs against the in-memory ledger: race, trial log, then fee
//! reconciliation after the node has pruned its pending records.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use endpoint_api::{EndpointClient, StateValue};
use race_harness::config::HarnessConfig;
use race_harness::endpoint::{SimConfig, SimEndpoint, SimLedger};
use race_harness::reconcile::{reconcile_log, ReconcileOutcome};
use race_harness::trial_log::read_rows;
use race_harness::trials::run_race;
use race_harness::FeePolicy;
use race_types::{RaceOutcome, TxId};

fn sim_config(log: &Path, trials: usize) -> HarnessConfig {
    let mut cfg = HarnessConfig::from_env();
    cfg.trials = trials;
    cfg.trial_pause_ms = 0;
    cfg.poll.transient_backoff_ms = 0;
    cfg.scan.block_backoff_ms = 0;
    cfg.app_id = 1002;
    cfg.state_key = "counter".into();
    cfg.trial_log = log.to_path_buf();
    cfg.signer_seed = Some(hex::encode([0x11u8; 32]));
    cfg
}

fn shared_ledger(seed: u64) -> Arc<SimLedger> {
    let ledger = Arc::new(SimLedger::new(SimConfig { seed, ..SimConfig::default() }));
    ledger
        .set_state(1002, b"counter", StateValue::Bytes(b"seed".to_vec()))
        .unwrap();
    ledger
}

fn nodes(ledger: &Arc<SimLedger>) -> (Arc<SimEndpoint>, Arc<SimEndpoint>) {
    (
        Arc::new(SimEndpoint::new("sim-a", ledger.clone())),
        Arc::new(SimEndpoint::new("sim-b", ledger.clone())),
    )
}

#[tokio::test(flavor = "current_thread")]
async fn equal_fee_races_all_resolve_and_are_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("transaction_log.csv");
    let cfg = sim_config(&log, 6);
    let ledger = shared_ledger(7);
    let (a, b) = nodes(&ledger);

    let run = run_race(&cfg, a, b).await.unwrap();
    assert_eq!(run.tally.total(), 6);
    for trial in &run.trials {
        assert!(trial.a.is_confirmed() && trial.b.is_confirmed());
        assert!(
            matches!(trial.verdict.outcome, RaceOutcome::AWon | RaceOutcome::BWon),
            "trial {} ended {:?}",
            trial.index,
            trial.verdict
        );
    }

    let rows = read_rows(&log).unwrap();
    assert_eq!(rows.len(), 12);
    assert!(rows.iter().all(|r| r.status == "Confirmed"));
    let notes: HashSet<_> = rows.iter().map(|r| r.correlation_note.clone()).collect();
    assert_eq!(notes.len(), 12);
    for pair in rows.chunks(2) {
        assert_eq!(pair[0].trial_index, pair[1].trial_index);
        assert_eq!(pair[0].operation_kind, "A");
        assert_eq!(pair[1].operation_kind, "B");
        assert_eq!(pair[0].method, "increment");
        assert_eq!(pair[1].method, "decrement");
        assert_eq!(pair[0].race_outcome, pair[1].race_outcome);
    }
}

#[tokio::test(flavor = "current_thread")]
async fn higher_fee_applies_first_so_the_cheaper_write_survives() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("transaction_log.csv");
    let mut cfg = sim_config(&log, 4);
    cfg.op_a.fee = FeePolicy::Flat(5_000);
    cfg.op_b.fee = FeePolicy::Suggested;
    let ledger = shared_ledger(11);
    let (a, b) = nodes(&ledger);

    let run = run_race(&cfg, a, b).await.unwrap();
    assert_eq!(run.tally.get(RaceOutcome::BWon), 4);
    let summary = run.summary();
    assert_eq!(summary.confirmed_fee_a, 20_000);
    assert_eq!(summary.confirmed_fee_b, 4_000);
}

#[tokio::test(flavor = "current_thread")]
async fn reconcile_recovers_fees_after_pruning() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("transaction_log.csv");
    let out = dir.path().join("transaction_log_with_fees.csv");
    let mut cfg = sim_config(&log, 3);
    cfg.op_a.fee = FeePolicy::MinFeeMultiple(5);
    let ledger = shared_ledger(3);
    let (a, b) = nodes(&ledger);

    let run = run_race(&cfg, a.clone(), b).await.unwrap();
    ledger.prune_records().unwrap();
    let first_id = run.trials[0].a.tx_id().cloned().unwrap();
    assert!(a.pending_info(&first_id).await.unwrap_err().is_not_found());

    let outcome = reconcile_log(&log, &out, a.as_ref(), &cfg.scan).await.unwrap();
    let report = match outcome {
        ReconcileOutcome::Written { rows, matched, report } => {
            assert_eq!(rows, 6);
            assert_eq!(matched, 6);
            report
        }
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert!(report.not_found.is_empty());
    assert!(report.rounds_scanned < cfg.scan.rounds_to_scan);
    assert_eq!(report.fees[&first_id], 5_000);

    let mut reader = csv::Reader::from_path(&out).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.get(headers.len() - 1), Some("fee"));
    let mut count = 0;
    for rec in reader.records() {
        let rec = rec.unwrap();
        let id = TxId::new(rec.get(1).unwrap());
        let fee: u64 = rec.get(headers.len() - 1).unwrap().parse().unwrap();
        assert_eq!(Some(fee), report.fees.get(&id).copied());
        count += 1;
    }
    assert_eq!(count, 6);
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_endpoint_stops_the_run_before_any_trial() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("transaction_log.csv");
    let cfg = sim_config(&log, 3);
    let ledger = shared_ledger(7);
    let (a, b) = nodes(&ledger);
    b.fail_next(1);

    let err = run_race(&cfg, a, b).await.unwrap_err();
    assert!(format!("{err:#}").contains("sim-b is unreachable"));
    assert!(!log.exists());
    assert_eq!(ledger.round().unwrap(), 1_000);
}
