pub mod address;
pub mod block;
pub mod hash;
pub mod ids;
pub mod operation;
pub mod outcome;
pub mod serde;

pub use crate::address::{base32_nopad, encode_address, tx_id_for};
pub use crate::block::{BlockRecord, BlockTxn};
pub use crate::hash::{method_selector, sha512_256, Hash32};
pub use crate::ids::{AppId, Fee, Note, Round, TxId};
pub use crate::operation::{OpKind, Operation, SignedOperation};
pub use crate::outcome::{ConfirmationOutcome, RaceOutcome, SideOutcome, SubmissionResult, SubmitFailure};
