//! Textual encodings used by the ledger: unpadded RFC 4648 base32 for
//! account addresses and transaction identifiers.

use crate::hash::{sha512_256, sha512_256_concat};
use crate::ids::TxId;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Prefix the ledger prepends to an encoded transaction before hashing/signing.
pub const TX_DOMAIN: &[u8] = b"TX";

/// Base32 without `=` padding.
pub fn base32_nopad(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &b in bytes {
        buffer = (buffer << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Address string of a 32-byte public key: key followed by the last four
/// bytes of its digest as a checksum.
pub fn encode_address(public_key: &[u8; 32]) -> String {
    let digest = sha512_256(public_key);
    let mut raw = [0u8; 36];
    raw[..32].copy_from_slice(public_key);
    raw[32..].copy_from_slice(&digest[28..]);
    base32_nopad(&raw)
}

/// Identifier of an encoded (unsigned) transaction.
pub fn tx_id_for(encoded_txn: &[u8]) -> TxId {
    TxId::new(base32_nopad(&sha512_256_concat(&[TX_DOMAIN, encoded_txn])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base32_rfc4648_vectors() {
        assert_eq!(base32_nopad(b""), "");
        assert_eq!(base32_nopad(b"f"), "MY");
        assert_eq!(base32_nopad(b"fo"), "MZXQ");
        assert_eq!(base32_nopad(b"foo"), "MZXW6");
        assert_eq!(base32_nopad(b"foob"), "MZXW6YQ");
        assert_eq!(base32_nopad(b"fooba"), "MZXW6YTB");
        assert_eq!(base32_nopad(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn zero_key_address() {
        assert_eq!(
            encode_address(&[0u8; 32]),
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ"
        );
    }

    #[test]
    fn tx_id_is_52_chars() {
        let id = tx_id_for(b"\x81\xa4type\xa4appl");
        assert_eq!(id.as_str().len(), 52);
    }
}
