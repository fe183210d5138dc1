use std::fmt;
use std::str::FromStr;

use endpoint_api::SuggestedParams;
use race_types::Fee;
use serde::{Deserialize, Serialize};

/// Protocol minimum fee in microAlgos.
pub const MIN_TXN_FEE: Fee = 1_000;

/// How the fee of one side of a race is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeePolicy {
    /// Whatever the node suggests for the encoded size.
    Suggested,
    /// Fixed fee in microAlgos.
    Flat(Fee),
    /// A multiple of the node's minimum fee.
    MinFeeMultiple(u64),
}

impl Default for FeePolicy {
    fn default() -> Self { FeePolicy::Suggested }
}

impl fmt::Display for FeePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeePolicy::Suggested => f.write_str("suggested"),
            FeePolicy::Flat(v) => write!(f, "flat:{v}"),
            FeePolicy::MinFeeMultiple(k) => write!(f, "min-fee-x:{k}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid fee policy '{0}' (expected suggested | flat:<u64> | min-fee-x:<u64>)")]
pub struct FeePolicyParseError(String);

impl FromStr for FeePolicy {
    type Err = FeePolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("suggested") || raw.eq_ignore_ascii_case("default") {
            return Ok(FeePolicy::Suggested);
        }
        let (kind, value) = raw
            .split_once(':')
            .ok_or_else(|| FeePolicyParseError(s.to_string()))?;
        let value: u64 = value
            .trim()
            .parse()
            .map_err(|_| FeePolicyParseError(s.to_string()))?;
        match kind.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(FeePolicy::Flat(value)),
            "min-fee-x" | "minx" => Ok(FeePolicy::MinFeeMultiple(value)),
            _ => Err(FeePolicyParseError(s.to_string())),
        }
    }
}

pub trait FeeOracle: Send + Sync {
    /// Initial fee for `policy` given the node's parameters and the signed size.
    fn resolve(&self, policy: FeePolicy, params: &SuggestedParams, size_bytes: usize) -> Fee;
    /// Enforce floor and ceiling.
    fn clamp(&self, fee: Fee, params: &SuggestedParams) -> Fee;
}

/// Floor is the node's minimum fee; ceiling is configurable.
#[derive(Clone, Debug)]
pub struct BasicFeeOracle {
    pub max_fee: Fee,
}

impl Default for BasicFeeOracle {
    fn default() -> Self {
        // MIN_TXN_FEE * 1000 is the largest variant the experiments use.
        Self { max_fee: 1_000_000 }
    }
}

impl FeeOracle for BasicFeeOracle {
    fn resolve(&self, policy: FeePolicy, params: &SuggestedParams, size_bytes: usize) -> Fee {
        let raw = match policy {
            FeePolicy::Suggested => params.fee_per_byte.saturating_mul(size_bytes as u64),
            FeePolicy::Flat(v) => v,
            FeePolicy::MinFeeMultiple(k) => params.min_fee.max(MIN_TXN_FEE).saturating_mul(k),
        };
        self.clamp(raw, params)
    }

    fn clamp(&self, fee: Fee, params: &SuggestedParams) -> Fee {
        let floor = params.min_fee;
        let ceiling = self.max_fee.max(floor);
        fee.clamp(floor, ceiling)
    }
}
