//! Opaque object payload codec.
//!
//! `Object` and `Array` columns travel as a SerializedObject blob. The blob
//! format is owned by an `ObjectCodec`; both ends of a stream must use the
//! same one.

use serde_json::Value;

use crate::error::{CodecError, CodecResult};

pub trait ObjectCodec: Send + Sync {
    /// Serialize a value into an opaque payload.
    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>>;

    /// Rebuild a value from a payload produced by `encode`.
    fn decode(&self, payload: &[u8]) -> CodecResult<Value>;
}

/// Default codec: compact JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonObjectCodec;

impl ObjectCodec for JsonObjectCodec {
    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CodecError::Object(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> CodecResult<Value> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Object(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_payload_is_compact_text() {
        let codec = JsonObjectCodec;
        let payload = codec.encode(&json!({"a": [1, 2]})).unwrap();
        assert_eq!(payload, br#"{"a":[1,2]}"#);
        assert_eq!(codec.decode(&payload).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_garbage_payload_is_object_error() {
        let err = JsonObjectCodec.decode(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Object(_)));
    }
}
