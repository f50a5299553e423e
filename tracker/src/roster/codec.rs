//! # Roster Codec
//!
//! The record store holds opaque blobs, so the roster payload crosses a
//! serialization boundary on every sync. That boundary is this pair of
//! functions and nothing else: call sites never stringify or parse JSON
//! ad hoc. The contract is strict symmetry, `decode(encode(x)) == x`
//! for every JSON value `x`, proven by a property test below. Break the
//! symmetry and synced rosters silently corrupt.

use thiserror::Error;

/// Errors that can occur encoding or decoding a roster payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be serialized. With `serde_json::Value`
    /// inputs this only happens for non-string map keys, which cannot
    /// appear in a payload that arrived as JSON in the first place.
    #[error("roster encode failed: {0}")]
    Encode(serde_json::Error),

    /// The stored blob is not valid JSON. Indicates store corruption or
    /// a foreign writer.
    #[error("roster decode failed: {0}")]
    Decode(serde_json::Error),
}

/// Encodes a roster payload into the byte form held by the record store.
pub fn encode(payload: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(payload).map_err(CodecError::Encode)
}

/// Decodes a stored blob back into the roster payload.
pub fn decode(bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    #[test]
    fn roundtrip_of_representative_roster() {
        let payload = json!([
            {
                "name": "ellie",
                "address": "0xabc1057399f2ffa37ab15a83b41c0e14b2b9f601",
                "paymentAddress": "ronin:9a1bd38ef2d3bc9c16d90c63954ad4d28cd9f1d2",
                "shares": { "scholar": 60, "manager": 40 },
                "slp": 1204
            }
        ]);
        let recovered = decode(&encode(&payload).unwrap()).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode(b"not json at all").unwrap_err(),
            CodecError::Decode(_)
        ));
    }

    #[test]
    fn decode_rejects_truncated_blob() {
        let blob = encode(&json!({"scholars": [1, 2, 3]})).unwrap();
        assert!(decode(&blob[..blob.len() - 2]).is_err());
    }

    /// Strategy producing arbitrary JSON trees: scalars at the leaves,
    /// arrays and string-keyed objects up to a bounded depth.
    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| Value::Number(n.into())),
            "[a-zA-Z0-9 :x.-]{0,24}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::hash_map("[a-zA-Z_]{1,12}", inner, 0..8).prop_map(|m| {
                    Value::Object(m.into_iter().collect())
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn encode_decode_is_symmetric(payload in arb_json()) {
            let recovered = decode(&encode(&payload).unwrap()).unwrap();
            prop_assert_eq!(recovered, payload);
        }
    }
}
