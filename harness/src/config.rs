use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use race_types::{AppId, Fee};
use serde::{Deserialize, Serialize};

use crate::fee::FeePolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
    #[error("no signer seed configured (set RACE_SIGNER_SEED or pass --signer-seed)")]
    MissingSigner,
}

/// How the API token is presented to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStyle {
    /// `X-Algo-API-Token: <token>`
    AlgodToken,
    /// `Authorization: Bearer <token>`
    Bearer,
}

impl FromStr for AuthStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "algod-token" | "x-algo-api-token" | "token" => Ok(AuthStyle::AlgodToken),
            "bearer" => Ok(AuthStyle::Bearer),
            _ => Err(()),
        }
    }
}

/// One ledger node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub label: String,
    pub url: String,
    pub token: Option<String>,
    pub auth: AuthStyle,
    pub http_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl EndpointConfig {
    pub fn http_timeout(&self) -> Duration { Duration::from_millis(self.http_timeout_ms) }
    pub fn connect_timeout(&self) -> Duration { Duration::from_millis(self.connect_timeout_ms) }

    fn from_env(prefix: &str, label: &str, default_url: &str) -> Self {
        let token = env::var(format!("{prefix}_TOKEN"))
            .ok()
            .or_else(|| env::var("RACE_TOKEN").ok())
            .filter(|t| !t.is_empty());
        let auth = env::var(format!("{prefix}_AUTH"))
            .or_else(|_| env::var("RACE_AUTH"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(AuthStyle::Bearer);
        Self {
            label: label.to_string(),
            url: env::var(format!("{prefix}_URL")).unwrap_or_else(|_| default_url.to_string()),
            token,
            auth,
            // wait-for-block-after can legitimately take a few seconds
            http_timeout_ms: env_parse("RACE_HTTP_TIMEOUT_MS", 15_000),
            connect_timeout_ms: env_parse("RACE_CONNECT_TIMEOUT_MS", 3_000),
        }
    }
}

/// One side of the race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    /// ABI method signature.
    pub method: String,
    /// Value the method writes into the contended state cell.
    pub tag: String,
    pub fee: FeePolicy,
}

impl OperationConfig {
    /// Method name without the signature part, used as the note prefix.
    pub fn method_name(&self) -> &str {
        self.method.split('(').next().unwrap_or(&self.method)
    }
}

/// Confirmation polling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Ledger rounds past the start round allowed before giving up on an operation.
    pub max_rounds: u64,
    /// Sleep after a failed round wait, before spending the next round.
    pub transient_backoff_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { max_rounds: 4, transient_backoff_ms: 500 }
    }
}

impl PollConfig {
    pub fn transient_backoff(&self) -> Duration { Duration::from_millis(self.transient_backoff_ms) }
}

/// Block-scan reconciliation knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub rounds_to_scan: u64,
    /// Extra attempts per block before it is reported unavailable.
    pub block_retries: u32,
    pub block_backoff_ms: u64,
    /// Append a `proposer_scan` column to the reconciled log.
    pub proposer_column: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { rounds_to_scan: 1_000, block_retries: 2, block_backoff_ms: 200, proposer_column: false }
    }
}

impl ScanConfig {
    pub fn block_backoff(&self) -> Duration { Duration::from_millis(self.block_backoff_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub endpoint_a: EndpointConfig,
    pub endpoint_b: EndpointConfig,
    pub app_id: AppId,
    /// Global state key of the contended cell.
    pub state_key: String,
    pub op_a: OperationConfig,
    pub op_b: OperationConfig,
    pub trials: usize,
    pub trial_pause_ms: u64,
    pub record_proposer: bool,
    /// Hex-encoded 32-byte ed25519 seed. Key management stays outside the harness.
    #[serde(skip_serializing)]
    pub signer_seed: Option<String>,
    pub max_fee: Fee,
    pub validity_rounds: u64,
    pub poll: PollConfig,
    pub scan: ScanConfig,
    pub trial_log: PathBuf,
}

impl HarnessConfig {
    /// Load configuration from `RACE_*` environment variables, falling back to
    /// defaults for anything unset. Unparsable values also fall back (with a warning).
    pub fn from_env() -> Self {
        let poll_default = PollConfig::default();
        let scan_default = ScanConfig::default();
        Self {
            endpoint_a: EndpointConfig::from_env("RACE_ENDPOINT_A", "a", "http://localhost:4001"),
            endpoint_b: EndpointConfig::from_env("RACE_ENDPOINT_B", "b", "http://localhost:4002"),
            app_id: env_parse("RACE_APP_ID", 1002),
            state_key: env::var("RACE_STATE_KEY").unwrap_or_else(|_| "counter".to_string()),
            op_a: OperationConfig {
                method: env::var("RACE_METHOD_A").unwrap_or_else(|_| "increment()string".to_string()),
                tag: env::var("RACE_TAG_A").unwrap_or_else(|_| "increment".to_string()),
                fee: env_parse("RACE_FEE_A", FeePolicy::Suggested),
            },
            op_b: OperationConfig {
                method: env::var("RACE_METHOD_B").unwrap_or_else(|_| "decrement()string".to_string()),
                tag: env::var("RACE_TAG_B").unwrap_or_else(|_| "decrement".to_string()),
                fee: env_parse("RACE_FEE_B", FeePolicy::Suggested),
            },
            trials: env_parse("RACE_TRIALS", 100),
            trial_pause_ms: env_parse("RACE_TRIAL_PAUSE_MS", 2_000),
            record_proposer: env_parse("RACE_RECORD_PROPOSER", false),
            signer_seed: env::var("RACE_SIGNER_SEED").ok().filter(|s| !s.is_empty()),
            max_fee: env_parse("RACE_MAX_FEE", 1_000_000),
            validity_rounds: env_parse("RACE_VALIDITY_ROUNDS", crate::txn::DEFAULT_VALIDITY_ROUNDS),
            poll: PollConfig {
                max_rounds: env_parse("RACE_MAX_ROUNDS", poll_default.max_rounds),
                transient_backoff_ms: env_parse("RACE_BACKOFF_MS", poll_default.transient_backoff_ms),
            },
            scan: ScanConfig {
                rounds_to_scan: env_parse("RACE_SCAN_ROUNDS", scan_default.rounds_to_scan),
                block_retries: env_parse("RACE_BLOCK_RETRIES", scan_default.block_retries),
                block_backoff_ms: env_parse("RACE_BLOCK_BACKOFF_MS", scan_default.block_backoff_ms),
                proposer_column: env_parse("RACE_PROPOSER_COLUMN", scan_default.proposer_column),
            },
            trial_log: env::var("RACE_TRIAL_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("transaction_log.csv")),
        }
    }

    pub fn trial_pause(&self) -> Duration { Duration::from_millis(self.trial_pause_ms) }

    pub fn signer_seed(&self) -> Result<&str, ConfigError> {
        self.signer_seed.as_deref().ok_or(ConfigError::MissingSigner)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Parse `var` when set; unset keeps `default`, garbage keeps `default` and warns.
fn env_parse<T: FromStr>(var: &'static str, default: T) -> T {
    match env::var(var) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(target: "config", var, value = %raw, "ignoring unparsable value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Strict variant for values supplied on the command line.
pub fn parse_value<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { var, value: raw.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_style_aliases() {
        assert_eq!("bearer".parse::<AuthStyle>(), Ok(AuthStyle::Bearer));
        assert_eq!("X-Algo-API-Token".parse::<AuthStyle>(), Ok(AuthStyle::AlgodToken));
        assert!("basic".parse::<AuthStyle>().is_err());
    }

    #[test]
    fn parse_value_reports_variable() {
        let err = parse_value::<u64>("RACE_TRIALS", "many").unwrap_err();
        assert_eq!(err.to_string(), "RACE_TRIALS has an invalid value 'many'");
        assert_eq!(parse_value::<FeePolicy>("RACE_FEE_A", "flat:10000").unwrap(), FeePolicy::Flat(10_000));
    }

    #[test]
    fn method_name_is_note_prefix() {
        let op = OperationConfig {
            method: "increment()string".into(),
            tag: "increment".into(),
            fee: FeePolicy::Suggested,
        };
        assert_eq!(op.method_name(), "increment");
    }
}
