use serde::{Deserialize, Serialize};

use crate::ids::{Fee, Note, Round};

/// One operation as it appears in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTxn {
    #[serde(default, with = "crate::serde::serde_b64_opt")]
    pub note: Option<Vec<u8>>,
    pub fee: Fee,
}

/// Contents of one scanned block. Fetched on demand, never cached across scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub round: Round,
    pub proposer: Option<String>,
    pub txns: Vec<BlockTxn>,
}

impl BlockRecord {
    /// Notes that decode as UTF-8, paired with the fee charged. Anything else
    /// is skipped silently.
    pub fn decoded_notes(&self) -> impl Iterator<Item = (Note, Fee)> + '_ {
        self.txns.iter().filter_map(|t| {
            let raw = t.note.as_deref()?;
            Note::decode(raw).map(|n| (n, t.fee))
        })
    }
}
