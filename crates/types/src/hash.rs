use sha2::{Digest, Sha512_256};

// SHA-512/256 is the ledger's digest for transaction ids, address checksums
// and ABI method selectors.

pub type Hash32 = [u8; 32];

pub fn sha512_256(bytes: &[u8]) -> Hash32 {
    Sha512_256::digest(bytes).into()
}

pub fn sha512_256_concat(parts: &[&[u8]]) -> Hash32 {
    let mut h = Sha512_256::new();
    for p in parts { h.update(p); }
    h.finalize().into()
}

/// ARC-4 method selector: first four bytes of the digest of the method signature,
/// e.g. `increment()string`.
pub fn method_selector(signature: &str) -> [u8; 4] {
    let digest = sha512_256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}
