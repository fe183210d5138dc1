use std::fmt;

use async_trait::async_trait;
use race_types::{AppId, BlockRecord, Fee, Hash32, Round, SignedOperation, TxId};
use serde::{Deserialize, Serialize};

/// Failure of a single RPC against one node. Callers decide whether to retry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EndpointError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("undecodable response: {0}")]
    Decode(String),
    /// The node no longer knows the requested record (pruned pending entry,
    /// unknown application, block outside the archive window).
    #[error("not found: {0}")]
    NotFound(String),
}

impl EndpointError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EndpointError::NotFound(_))
    }
}

/// Refusal of an operation at submission time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    /// The node parsed the operation and refused it (bad fee, expired, overspend).
    #[error("rejected by node: {0}")]
    Rejected(String),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// What a node currently knows about a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStatus {
    Confirmed { round: Round, fee: Fee },
    /// Dropped from the pool with the node's reason.
    Rejected(String),
    Pending,
}

/// Parameters needed to build a valid operation at the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedParams {
    pub fee_per_byte: Fee,
    pub min_fee: Fee,
    pub last_round: Round,
    pub genesis_id: String,
    pub genesis_hash: Hash32,
}

/// One value of an application's key/value state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateValue {
    Bytes(Vec<u8>),
    Uint(u64),
}

impl StateValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            StateValue::Bytes(b) => Some(b),
            StateValue::Uint(_) => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            StateValue::Uint(v) => write!(f, "{v}"),
        }
    }
}

/// Capability wrapper over one ledger node.
///
/// Every method is a single network round trip with no built-in retries;
/// retry policy belongs to callers (the poller and the reconciler). An instance
/// is driven by one task at a time.
#[async_trait]
pub trait EndpointClient: Send + Sync {
    /// Human-readable name used in logs and in `Operation::endpoint`.
    fn label(&self) -> &str;

    async fn submit(&self, op: &SignedOperation) -> Result<TxId, SubmitError>;

    async fn pending_info(&self, id: &TxId) -> Result<PendingStatus, EndpointError>;

    async fn current_round(&self) -> Result<Round, EndpointError>;

    /// Suspend until the network has advanced past `round`; returns the new
    /// current round.
    async fn await_next_round(&self, round: Round) -> Result<Round, EndpointError>;

    async fn block_contents(&self, round: Round) -> Result<BlockRecord, EndpointError>;

    /// Non-mutating read of one application state key. `Ok(None)` means the
    /// key is not set.
    async fn read_state(&self, app: AppId, key: &[u8]) -> Result<Option<StateValue>, EndpointError>;

    async fn suggested_params(&self) -> Result<SuggestedParams, EndpointError>;
}
