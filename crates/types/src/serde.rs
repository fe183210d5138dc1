use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};

/// -------- Byte strings as standard base64 (algod JSON convention) --------
pub mod serde_b64 {
    use super::*;
    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64_STANDARD.encode(bytes))
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        BASE64_STANDARD.decode(s.as_bytes()).map_err(D::Error::custom)
    }
}

/// Option<Vec<u8>> helper. A present but non-base64 value decodes to `None`.
pub mod serde_b64_opt {
    use super::*;
    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_some(&BASE64_STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        Ok(opt.and_then(|s| BASE64_STANDARD.decode(s.as_bytes()).ok()))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "crate::serde::serde_b64")]
        key: Vec<u8>,
        #[serde(default, with = "crate::serde::serde_b64_opt")]
        note: Option<Vec<u8>>,
    }

    #[test]
    fn decodes_algod_style_fields() {
        let h: Holder = serde_json::from_str(r#"{"key":"Y291bnRlcg==","note":"aW5j"}"#).unwrap();
        assert_eq!(h.key, b"counter");
        assert_eq!(h.note.as_deref(), Some(&b"inc"[..]));
    }

    #[test]
    fn bad_note_is_dropped_not_fatal() {
        let h: Holder = serde_json::from_str(r#"{"key":"","note":"%%%"}"#).unwrap();
        assert!(h.note.is_none());
        let h: Holder = serde_json::from_str(r#"{"key":""}"#).unwrap();
        assert!(h.note.is_none());
    }
}
