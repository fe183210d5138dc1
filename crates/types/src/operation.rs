use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{AppId, Fee, Note, Round, TxId};

/// Which side of a race an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind { A, B }

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::A => "A",
            OpKind::B => "B",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One state-mutating application call, fully resolved and ready to sign.
///
/// `tag` is the value the call unconditionally writes into the contended state
/// cell; the classifier recovers application order by comparing the final cell
/// value against both sides' tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    /// ABI method signature, e.g. `increment()string`.
    pub method: String,
    #[serde(with = "serde_bytes")]
    pub tag: Vec<u8>,
    pub note: Note,
    pub fee: Fee,
    pub app_id: AppId,
    /// Label of the endpoint the operation is dispatched to.
    pub endpoint: String,
    pub first_valid: Round,
    pub last_valid: Round,
}

impl Operation {
    /// Method name without the argument/return part of the signature.
    pub fn method_name(&self) -> &str {
        self.method.split('(').next().unwrap_or(&self.method)
    }
}

/// An operation plus its signed wire form and the identifier the network will
/// assign to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOperation {
    pub op: Operation,
    pub tx_id: TxId,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_name_strips_signature() {
        let op = Operation {
            kind: OpKind::A,
            method: "increment()string".into(),
            tag: b"increment".to_vec(),
            note: Note::new("inc_1_0"),
            fee: 1_000,
            app_id: 1002,
            endpoint: "a".into(),
            first_valid: 10,
            last_valid: 1010,
        };
        assert_eq!(op.method_name(), "increment");
        assert_eq!(OpKind::B.to_string(), "B");
    }
}
