//! Application-call construction and signing.
//!
//! Operations are encoded as canonical msgpack (keys sorted, zero values
//! omitted) so the identifier computed here matches the one the node assigns.

use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use endpoint_api::SuggestedParams;
use race_types::{
    address::TX_DOMAIN, encode_address, method_selector, tx_id_for, AppId, Note, OpKind, Operation,
    SignedOperation,
};
use serde::Serialize;
use serde_bytes::ByteBuf;

use crate::fee::{BasicFeeOracle, FeeOracle, FeePolicy};

/// Bytes the `{sig, txn}` envelope adds around an encoded transaction.
pub const SIG_ENVELOPE_OVERHEAD: usize = 75;
/// Rounds an operation stays valid after its first valid round.
pub const DEFAULT_VALIDITY_ROUNDS: u64 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("signer seed must be 32 bytes of hex: {0}")]
    BadSeed(String),
    #[error("msgpack encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// Everything needed to build one side of a race, before network parameters
/// are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpSpec {
    pub kind: OpKind,
    /// ABI method signature, e.g. `increment()string`.
    pub method: String,
    /// Value the method writes into the contended state cell.
    pub tag: Vec<u8>,
    pub note: Note,
    pub fee: FeePolicy,
    pub app_id: AppId,
}

fn is_zero(v: &u64) -> bool { *v == 0 }
fn is_empty(b: &&[u8]) -> bool { b.is_empty() }

// Field order is the canonical (sorted) key order.
#[derive(Serialize)]
struct AppCallTxn<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    apaa: Vec<ByteBuf>,
    #[serde(skip_serializing_if = "is_zero")]
    apid: u64,
    #[serde(skip_serializing_if = "is_zero")]
    fee: u64,
    #[serde(skip_serializing_if = "is_zero")]
    fv: u64,
    #[serde(skip_serializing_if = "str::is_empty")]
    gen: &'a str,
    #[serde(with = "serde_bytes")]
    gh: &'a [u8],
    lv: u64,
    #[serde(with = "serde_bytes", skip_serializing_if = "is_empty")]
    note: &'a [u8],
    #[serde(with = "serde_bytes")]
    snd: &'a [u8],
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct SignedTxn<'a> {
    #[serde(with = "serde_bytes")]
    sig: &'a [u8],
    txn: &'a AppCallTxn<'a>,
}

/// Builds and signs application calls for one sender key.
#[derive(Clone)]
pub struct AppCallSigner {
    key: SigningKey,
    sender: [u8; 32],
    validity_rounds: u64,
    oracle: Arc<dyn FeeOracle>,
}

impl std::fmt::Debug for AppCallSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCallSigner")
            .field("sender", &self.address())
            .field("validity_rounds", &self.validity_rounds)
            .finish()
    }
}

impl AppCallSigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let sender = key.verifying_key().to_bytes();
        Self {
            key,
            sender,
            validity_rounds: DEFAULT_VALIDITY_ROUNDS,
            oracle: Arc::new(BasicFeeOracle::default()),
        }
    }

    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, BuildError> {
        let raw = hex::decode(seed_hex.trim()).map_err(|e| BuildError::BadSeed(e.to_string()))?;
        let seed: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| BuildError::BadSeed(format!("got {} bytes", v.len())))?;
        Ok(Self::from_seed(seed))
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn FeeOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_validity_rounds(mut self, rounds: u64) -> Self {
        self.validity_rounds = rounds.max(1);
        self
    }

    pub fn address(&self) -> String { encode_address(&self.sender) }

    /// Resolve the fee, encode, and sign `spec` against `params`.
    pub fn build(
        &self,
        spec: &OpSpec,
        params: &SuggestedParams,
        endpoint: &str,
    ) -> Result<SignedOperation, BuildError> {
        let first_valid = params.last_round;
        let last_valid = first_valid.saturating_add(self.validity_rounds);
        let selector = method_selector(&spec.method);
        let mut txn = AppCallTxn {
            apaa: vec![ByteBuf::from(selector.to_vec())],
            apid: spec.app_id,
            fee: params.min_fee,
            fv: first_valid,
            gen: &params.genesis_id,
            gh: &params.genesis_hash,
            lv: last_valid,
            note: spec.note.as_bytes(),
            snd: &self.sender,
            kind: "appl",
        };

        let size = rmp_serde::to_vec_named(&txn)?.len() + SIG_ENVELOPE_OVERHEAD;
        txn.fee = self.oracle.resolve(spec.fee, params, size);

        let encoded = rmp_serde::to_vec_named(&txn)?;
        let mut message = Vec::with_capacity(TX_DOMAIN.len() + encoded.len());
        message.extend_from_slice(TX_DOMAIN);
        message.extend_from_slice(&encoded);
        let sig = self.key.sign(&message).to_bytes();
        let bytes = rmp_serde::to_vec_named(&SignedTxn { sig: &sig, txn: &txn })?;

        let op = Operation {
            kind: spec.kind,
            method: spec.method.clone(),
            tag: spec.tag.clone(),
            note: spec.note.clone(),
            fee: txn.fee,
            app_id: spec.app_id,
            endpoint: endpoint.to_string(),
            first_valid,
            last_valid,
        };
        Ok(SignedOperation { op, tx_id: tx_id_for(&encoded), bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    fn params() -> SuggestedParams {
        SuggestedParams {
            fee_per_byte: 0,
            min_fee: 1_000,
            last_round: 500,
            genesis_id: "sandnet-v1".into(),
            genesis_hash: [9u8; 32],
        }
    }

    fn spec(fee: FeePolicy) -> OpSpec {
        OpSpec {
            kind: OpKind::B,
            method: "decrement()string".into(),
            tag: b"decrement".to_vec(),
            note: Note::new("dec_1700000000000_0"),
            fee,
            app_id: 1002,
        }
    }

    #[test]
    fn signed_envelope_verifies_and_ids_match() {
        let signer = AppCallSigner::from_seed([42u8; 32]);
        let signed = signer.build(&spec(FeePolicy::Flat(10_000)), &params(), "b").unwrap();

        assert_eq!(signed.op.fee, 10_000);
        assert_eq!(signed.op.first_valid, 500);
        assert_eq!(signed.op.last_valid, 1_500);
        assert_eq!(signed.op.endpoint, "b");

        // {"sig": bin64, "txn": {...}}: the signature sits at a fixed offset.
        assert_eq!(&signed.bytes[..7], &[0x82, 0xa3, b's', b'i', b'g', 0xc4, 0x40]);
        let sig = Signature::from_slice(&signed.bytes[7..71]).unwrap();
        let txn = &signed.bytes[SIG_ENVELOPE_OVERHEAD..];
        let mut msg = b"TX".to_vec();
        msg.extend_from_slice(txn);
        let vk = SigningKey::from_bytes(&[42u8; 32]).verifying_key();
        vk.verify(&msg, &sig).unwrap();

        assert_eq!(signed.tx_id, tx_id_for(txn));
        assert_eq!(signed.tx_id.as_str().len(), 52);
    }

    #[test]
    fn distinct_notes_give_distinct_ids() {
        let signer = AppCallSigner::from_seed([1u8; 32]);
        let a = signer.build(&spec(FeePolicy::Suggested), &params(), "a").unwrap();
        let mut other = spec(FeePolicy::Suggested);
        other.note = Note::new("dec_1700000000000_1");
        let b = signer.build(&other, &params(), "a").unwrap();
        assert_ne!(a.tx_id, b.tx_id);
        assert_eq!(a.op.fee, 1_000);
    }

    #[test]
    fn seed_hex_must_be_32_bytes() {
        assert!(AppCallSigner::from_seed_hex("abcd").is_err());
        assert!(AppCallSigner::from_seed_hex("zz").is_err());
        let s = AppCallSigner::from_seed_hex(&"00".repeat(32)).unwrap();
        assert_eq!(s.address().len(), 58);
    }
}
