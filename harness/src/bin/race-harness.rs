use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use endpoint_api::{EndpointClient, StateValue};
use race_harness::config::{parse_value, AuthStyle, HarnessConfig};
use race_harness::endpoint::{AlgodClient, SimConfig, SimEndpoint, SimLedger};
use race_harness::reconcile::{reconcile_log, ReconcileOutcome};
use race_harness::trials::{run_race, TrialRun};
use race_harness::FeePolicy;
use race_types::RaceOutcome;

/// ------- CLI args -------
#[derive(Parser, Debug)]
#[command(name = "race-harness", version, about = "Dual-endpoint transaction ordering race harness")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Race two operations against two live nodes and write the trial log
    Race(RaceArgs),
    /// Recover fees for a trial log by scanning block history
    Reconcile(ReconcileArgs),
    /// Race against an in-memory ledger shared by two simulated nodes
    Simulate(SimulateArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AuthCli {
    AlgodToken,
    Bearer,
}
impl From<AuthCli> for AuthStyle {
    fn from(v: AuthCli) -> Self {
        match v {
            AuthCli::AlgodToken => AuthStyle::AlgodToken,
            AuthCli::Bearer => AuthStyle::Bearer,
        }
    }
}

/// Overrides shared by `race` and `simulate`; unset flags keep the `RACE_*` environment value.
#[derive(Args, Debug, Clone, Default)]
struct TrialArgs {
    /// Number of trials
    #[arg(long)]
    trials: Option<usize>,

    /// Fee policy for operation A: suggested | flat:<fee> | min-fee-x:<n>
    #[arg(long)]
    fee_a: Option<String>,

    /// Fee policy for operation B
    #[arg(long)]
    fee_b: Option<String>,

    /// Rounds to wait for each confirmation before declaring a timeout
    #[arg(long)]
    max_rounds: Option<u64>,

    /// Pause between trials (ms)
    #[arg(long)]
    pause_ms: Option<u64>,

    /// Trial log CSV path
    #[arg(long)]
    trial_log: Option<PathBuf>,

    /// Record the proposer of each confirming block
    #[arg(long, default_value_t = false)]
    record_proposer: bool,

    /// Write a JSON run summary here (optional)
    #[arg(long)]
    out_report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RaceArgs {
    #[command(flatten)]
    trial: TrialArgs,

    /// Node URL for operation A
    #[arg(long)]
    endpoint_a: Option<String>,

    /// Node URL for operation B
    #[arg(long)]
    endpoint_b: Option<String>,

    /// API token used for both nodes
    #[arg(long)]
    token: Option<String>,

    /// How the token is sent
    #[arg(long, value_enum)]
    auth: Option<AuthCli>,

    /// Application whose state cell both operations write
    #[arg(long)]
    app_id: Option<u64>,

    /// Hex-encoded 32-byte ed25519 seed of the sending account
    #[arg(long)]
    signer_seed: Option<String>,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Trial log to reconcile
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output CSV (defaults to <input>_with_fees.csv)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Node URL to scan (defaults to endpoint A)
    #[arg(long)]
    endpoint: Option<String>,

    /// API token for the scanned node
    #[arg(long)]
    token: Option<String>,

    /// Maximum number of rounds to scan backward
    #[arg(long)]
    rounds: Option<u64>,

    /// Append the proposer of the block each operation was found in
    #[arg(long, default_value_t = false)]
    proposer_column: bool,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[command(flatten)]
    trial: TrialArgs,

    /// Seed for the ledger's tie-break ordering
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Operations sealed per simulated block
    #[arg(long, default_value_t = 1_000)]
    block_capacity: usize,
}

/// Seed used by `simulate` when none is configured; the simulated ledger checks no balances.
const SIM_SIGNER_SEED: [u8; 32] = [0x5a; 32];

fn apply_trial_args(cfg: &mut HarnessConfig, args: &TrialArgs) -> Result<()> {
    if let Some(n) = args.trials {
        cfg.trials = n;
    }
    if let Some(raw) = &args.fee_a {
        cfg.op_a.fee = parse_value::<FeePolicy>("--fee-a", raw)?;
    }
    if let Some(raw) = &args.fee_b {
        cfg.op_b.fee = parse_value::<FeePolicy>("--fee-b", raw)?;
    }
    if let Some(r) = args.max_rounds {
        cfg.poll.max_rounds = r;
    }
    if let Some(ms) = args.pause_ms {
        cfg.trial_pause_ms = ms;
    }
    if let Some(path) = &args.trial_log {
        cfg.trial_log = path.clone();
    }
    cfg.record_proposer |= args.record_proposer;
    Ok(())
}

fn print_summary(run: &TrialRun, cfg: &HarnessConfig) {
    println!("\n================ Race summary ================");
    println!(
        "[RUN] trials={} A={} ({}) B={} ({})",
        run.tally.total(),
        cfg.op_a.method,
        cfg.op_a.fee,
        cfg.op_b.method,
        cfg.op_b.fee
    );
    for outcome in RaceOutcome::ALL {
        println!(
            "  - {:<12} {:>5}  {:>6.2}%",
            outcome.as_str(),
            run.tally.get(outcome),
            run.tally.percent(outcome)
        );
    }
    println!("[LOG] {}", cfg.trial_log.display());
}

fn write_report(run: &TrialRun, path: &Path) -> Result<()> {
    let body = serde_json::to_string_pretty(&run.summary()).context("serializing run summary")?;
    std::fs::write(path, body).with_context(|| format!("writing report {}", path.display()))?;
    println!("[REPORT] {}", path.display());
    Ok(())
}

async fn cmd_race(args: RaceArgs) -> Result<()> {
    let mut cfg = HarnessConfig::from_env();
    apply_trial_args(&mut cfg, &args.trial)?;
    if let Some(url) = args.endpoint_a {
        cfg.endpoint_a.url = url;
    }
    if let Some(url) = args.endpoint_b {
        cfg.endpoint_b.url = url;
    }
    if let Some(token) = args.token {
        cfg.endpoint_a.token = Some(token.clone());
        cfg.endpoint_b.token = Some(token);
    }
    if let Some(auth) = args.auth {
        cfg.endpoint_a.auth = auth.into();
        cfg.endpoint_b.auth = auth.into();
    }
    if let Some(app) = args.app_id {
        cfg.app_id = app;
    }
    if args.signer_seed.is_some() {
        cfg.signer_seed = args.signer_seed;
    }
    if cfg.endpoint_a.url == cfg.endpoint_b.url {
        tracing::warn!(url = %cfg.endpoint_a.url, "both operations target the same node");
    }

    let client_a: Arc<dyn EndpointClient> =
        Arc::new(AlgodClient::new(&cfg.endpoint_a).context("building client for endpoint A")?);
    let client_b: Arc<dyn EndpointClient> =
        Arc::new(AlgodClient::new(&cfg.endpoint_b).context("building client for endpoint B")?);

    let run = run_race(&cfg, client_a, client_b).await?;
    print_summary(&run, &cfg);
    if let Some(path) = &args.trial.out_report {
        write_report(&run, path)?;
    }
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("transaction_log");
    input.with_file_name(format!("{stem}_with_fees.csv"))
}

async fn cmd_reconcile(args: ReconcileArgs) -> Result<()> {
    let mut cfg = HarnessConfig::from_env();
    if let Some(url) = args.endpoint {
        cfg.endpoint_a.url = url;
    }
    if let Some(token) = args.token {
        cfg.endpoint_a.token = Some(token);
    }
    if let Some(r) = args.rounds {
        cfg.scan.rounds_to_scan = r;
    }
    cfg.scan.proposer_column |= args.proposer_column;

    let input = args.input.unwrap_or_else(|| cfg.trial_log.clone());
    let output = args.output.unwrap_or_else(|| default_output(&input));
    if input == output {
        bail!("output {} would overwrite the input log", output.display());
    }

    let client = AlgodClient::new(&cfg.endpoint_a).context("building client for the scanned node")?;
    match reconcile_log(&input, &output, &client, &cfg.scan)
        .await
        .with_context(|| format!("reconciling {}", input.display()))?
    {
        ReconcileOutcome::EmptyInput(msg) => println!("[RECONCILE] nothing to do: {msg}"),
        ReconcileOutcome::Written { rows, matched, report } => {
            println!("\n================ Reconcile summary ================");
            println!(
                "[SCAN] start_round={} rounds_scanned={} unavailable_blocks={}",
                report.start_round,
                report.rounds_scanned,
                report.unavailable_blocks.len()
            );
            println!("[ROWS] total={rows} with_fee={matched} not_found={}", rows - matched);
            println!("[OUT] {}", output.display());
        }
    }
    Ok(())
}

async fn cmd_simulate(args: SimulateArgs) -> Result<()> {
    let mut cfg = HarnessConfig::from_env();
    cfg.trial_pause_ms = 0;
    cfg.poll.transient_backoff_ms = 0;
    apply_trial_args(&mut cfg, &args.trial)?;
    if cfg.signer_seed.is_none() {
        cfg.signer_seed = Some(hex::encode(SIM_SIGNER_SEED));
    }

    let ledger = Arc::new(SimLedger::new(SimConfig {
        block_capacity: args.block_capacity,
        state_key: cfg.state_key.as_bytes().to_vec(),
        seed: args.seed,
        ..SimConfig::default()
    }));
    ledger
        .set_state(cfg.app_id, cfg.state_key.as_bytes(), StateValue::Bytes(b"seed".to_vec()))
        .context("seeding simulated application state")?;

    let client_a: Arc<dyn EndpointClient> = Arc::new(SimEndpoint::new("sim-a", ledger.clone()));
    let client_b: Arc<dyn EndpointClient> = Arc::new(SimEndpoint::new("sim-b", ledger.clone()));
    let run = run_race(&cfg, client_a, client_b).await?;
    print_summary(&run, &cfg);
    if let Some(path) = &args.trial.out_report {
        write_report(&run, path)?;
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Race(args) => cmd_race(args).await,
        Cmd::Reconcile(args) => cmd_reconcile(args).await,
        Cmd::Simulate(args) => cmd_simulate(args).await,
    }
}
