use std::fmt;

use serde::{Deserialize, Serialize};

/// Ledger round number, the harness's logical clock.
pub type Round = u64;
/// On-ledger application identifier.
pub type AppId = u64;
/// Fee in the ledger's smallest unit (microAlgos).
pub type Fee = u64;

/// Network-assigned operation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for TxId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

/// Correlation note embedded in an operation's payload. Survives in block
/// history after a node prunes its pending-operation records, which is what
/// makes fee reconciliation possible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Note(String);

impl Note {
    pub fn new(note: impl Into<String>) -> Self { Self(note.into()) }

    /// Best-effort decode of raw note bytes; `None` when not UTF-8.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().map(|s| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
