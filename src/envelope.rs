//! Envelope Codec - the two-variant success/failure record stored at a cache
//! key, and its encode/decode to the Redis value bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Metadata for a cached business failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMeta {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Wire representation of the envelope. Kept distinct from `Envelope` so that
/// a success envelope missing `v` deserializes successfully as `raw_v: None`,
/// and the corruption is then detected explicitly in `decode`, per spec, rather
/// than surfacing as an opaque parse error.
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    s: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<ErrorMeta>,
}

/// A decoded cache envelope.
#[derive(Debug, Clone)]
pub enum Envelope {
    Success(Value),
    Failure(ErrorMeta),
}

/// Outcome of decoding raw bytes read from the backend.
pub enum Decoded {
    Ok(Envelope),
    /// Bytes did not parse as JSON, or parsed but matched neither variant's
    /// required fields (failure envelope with empty/absent `type`). Treated
    /// as a miss plus a warning log by the caller.
    Corrupt,
    /// A success envelope (`s: true`) was parsed but has no `v` field. This
    /// is *not* a miss; spec requires it surface as `CorruptedCache`
    /// without invoking the fetcher.
    MissingValue,
}

/// Encode an envelope to the bytes written to the backend.
pub fn encode(envelope: &Envelope) -> String {
    let wire = match envelope {
        Envelope::Success(v) => WireEnvelope {
            s: true,
            v: Some(v.clone()),
            e: None,
        },
        Envelope::Failure(meta) => WireEnvelope {
            s: false,
            v: None,
            e: Some(meta.clone()),
        },
    };
    // A `WireEnvelope` always serializes to valid JSON; there is no fallible
    // path here worth propagating to the caller.
    serde_json::to_string(&wire).unwrap_or_default()
}

/// Decode raw bytes read from the backend into an envelope.
pub fn decode(bytes: &str) -> Decoded {
    let wire: WireEnvelope = match serde_json::from_str(bytes) {
        Ok(w) => w,
        Err(_) => return Decoded::Corrupt,
    };

    if wire.s {
        match wire.v {
            Some(v) => Decoded::Ok(Envelope::Success(v)),
            None => Decoded::MissingValue,
        }
    } else {
        match wire.e {
            Some(meta) if !meta.error_type.is_empty() => Decoded::Ok(Envelope::Failure(meta)),
            _ => Decoded::Corrupt,
        }
    }
}

/// Convert a decoded failure envelope into the error the caller raises.
pub fn failure_to_error(meta: ErrorMeta) -> CoreError {
    CoreError::CachedFailure {
        error_type: meta.error_type,
        message: meta.message,
        data: meta.data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_success() {
        let env = Envelope::Success(serde_json::json!({"a": 1}));
        let bytes = encode(&env);
        match decode(&bytes) {
            Decoded::Ok(Envelope::Success(v)) => assert_eq!(v, serde_json::json!({"a": 1})),
            _ => panic!("expected success envelope"),
        }
    }

    #[test]
    fn round_trips_failure() {
        let env = Envelope::Failure(ErrorMeta {
            error_type: "InvalidCepError".to_string(),
            message: "CEP not found".to_string(),
            data: Some(serde_json::json!({"code": 404})),
        });
        let bytes = encode(&env);
        match decode(&bytes) {
            Decoded::Ok(Envelope::Failure(meta)) => {
                assert_eq!(meta.error_type, "InvalidCepError");
                assert_eq!(meta.message, "CEP not found");
            }
            _ => panic!("expected failure envelope"),
        }
    }

    #[test]
    fn missing_value_is_flagged_distinctly() {
        let bytes = r#"{"s":true}"#;
        assert!(matches!(decode(bytes), Decoded::MissingValue));
    }

    #[test]
    fn malformed_bytes_are_corrupt() {
        assert!(matches!(decode("not json"), Decoded::Corrupt));
    }

    #[test]
    fn failure_without_type_is_corrupt() {
        let bytes = r#"{"s":false,"e":{"type":"","message":"x"}}"#;
        assert!(matches!(decode(bytes), Decoded::Corrupt));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let bytes = r#"{"s":true,"v":{"a":1},"unrelated":"field"}"#;
        assert!(matches!(decode(bytes), Decoded::Ok(Envelope::Success(_))));
    }
}
