//! Opaque value encoding for checkpointed state
//!
//! Checkpoints must round-trip values that have no natural JSON
//! representation: raw byte strings, timestamps, and arbitrary user structs.
//! [`StateValue`] is the envelope the stores exchange: JSON-native values
//! serialize as plain JSON, everything else is wrapped in a tagged object
//!
//! ```text
//! { "$type": "<tag>", "$value": <opaque encoding> }
//! ```
//!
//! Tags handled by this crate:
//!
//! | Tag | Variant | Encoding of `$value` |
//! |-----|---------|----------------------|
//! | `bytes` | [`StateValue::Bytes`] | base64 string |
//! | `datetime` | [`StateValue::DateTime`] | RFC 3339 string |
//! | `bin` | [`StateValue::Bin`] | `{ "tag": <type tag>, "data": base64(bincode) }` |
//! | `json` | [`StateValue::Json`] | the value verbatim (escape hatch, see below) |
//!
//! A plain JSON object that itself contains a `"$type"` key would be
//! indistinguishable from an envelope, so such objects are escaped through
//! the `json` tag on write and unwrapped on read.
//!
//! The in-memory store clones `StateValue`s directly, so values keep their
//! exact variant without passing through the envelope. The file store writes
//! the envelope form and guarantees that decoding produces an equal value
//! with the same tag.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{CheckpointError, Result};

/// Key marking a tagged envelope object.
pub const TYPE_KEY: &str = "$type";
/// Key holding the opaque encoding inside a tagged envelope.
pub const VALUE_KEY: &str = "$value";

/// A checkpointable value with a stable, type-preserving encoding
///
/// Most state is [`StateValue::Json`]. The other variants exist so that
/// byte strings, timestamps, and arbitrary serializable structs survive the
/// trip through a JSON checkpoint file without degrading into strings or
/// losing their type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// A JSON-native value, stored verbatim
    Json(Value),
    /// A raw byte string
    Bytes(Vec<u8>),
    /// A UTC timestamp
    DateTime(DateTime<Utc>),
    /// An arbitrary serializable value, bincode-encoded under a caller-chosen
    /// type tag
    Bin {
        /// Caller-chosen tag naming the encoded type
        type_tag: String,
        /// bincode encoding of the value
        data: Vec<u8>,
    },
}

impl StateValue {
    /// Encode any serializable value as a JSON state value
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Encode an arbitrary serializable value as an opaque binary envelope
    ///
    /// The `type_tag` is preserved across round-trips; callers use it to
    /// decide how to decode. The encoding is stable for a given store
    /// version.
    pub fn bin<T: Serialize>(type_tag: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::Bin {
            type_tag: type_tag.into(),
            data: bincode::serialize(value)?,
        })
    }

    /// Decode the value into a concrete type
    ///
    /// `Json` decodes via `serde_json`, `Bin` via bincode. `Bytes` and
    /// `DateTime` have dedicated accessors instead.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Self::Json(value) => Ok(serde_json::from_value(value.clone())?),
            Self::Bin { data, .. } => Ok(bincode::deserialize(data)?),
            other => Err(CheckpointError::Invalid(format!(
                "cannot decode {} into a typed value; use the matching accessor",
                other.tag_name()
            ))),
        }
    }

    /// Borrow the JSON value, if this is the `Json` variant
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the byte string, if this is the `Bytes` variant
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Get the timestamp, if this is the `DateTime` variant
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(ts) => Some(*ts),
            _ => None,
        }
    }

    /// The envelope tag this variant serializes under
    pub fn tag_name(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Bytes(_) => "bytes",
            Self::DateTime(_) => "datetime",
            Self::Bin { .. } => "bin",
        }
    }

    /// Convert to the wire-level JSON representation
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Json(value) => {
                if needs_escape(value) {
                    json!({ TYPE_KEY: "json", VALUE_KEY: value })
                } else {
                    value.clone()
                }
            }
            Self::Bytes(bytes) => json!({
                TYPE_KEY: "bytes",
                VALUE_KEY: BASE64.encode(bytes),
            }),
            Self::DateTime(ts) => json!({
                TYPE_KEY: "datetime",
                VALUE_KEY: ts.to_rfc3339_opts(SecondsFormat::Micros, true),
            }),
            Self::Bin { type_tag, data } => json!({
                TYPE_KEY: "bin",
                VALUE_KEY: { "tag": type_tag, "data": BASE64.encode(data) },
            }),
        }
    }

    /// Reconstruct a state value from its wire-level JSON representation
    pub fn from_wire(value: Value) -> Result<Self> {
        let Some(tag) = value
            .as_object()
            .and_then(|obj| obj.get(TYPE_KEY))
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            return Ok(Self::Json(value));
        };

        let inner = value
            .as_object()
            .and_then(|obj| obj.get(VALUE_KEY))
            .cloned()
            .ok_or_else(|| {
                CheckpointError::Corrupted(format!("envelope tagged '{tag}' has no '{VALUE_KEY}'"))
            })?;

        match tag.as_str() {
            "json" => Ok(Self::Json(inner)),
            "bytes" => {
                let encoded = inner.as_str().ok_or_else(|| {
                    CheckpointError::Corrupted("bytes envelope value is not a string".into())
                })?;
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| CheckpointError::Corrupted(format!("invalid base64: {e}")))?;
                Ok(Self::Bytes(bytes))
            }
            "datetime" => {
                let encoded = inner.as_str().ok_or_else(|| {
                    CheckpointError::Corrupted("datetime envelope value is not a string".into())
                })?;
                let ts = DateTime::parse_from_rfc3339(encoded)
                    .map_err(|e| CheckpointError::Corrupted(format!("invalid timestamp: {e}")))?;
                Ok(Self::DateTime(ts.with_timezone(&Utc)))
            }
            "bin" => {
                let type_tag = inner
                    .get("tag")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        CheckpointError::Corrupted("bin envelope is missing its type tag".into())
                    })?
                    .to_owned();
                let encoded = inner.get("data").and_then(Value::as_str).ok_or_else(|| {
                    CheckpointError::Corrupted("bin envelope is missing its data".into())
                })?;
                let data = BASE64
                    .decode(encoded)
                    .map_err(|e| CheckpointError::Corrupted(format!("invalid base64: {e}")))?;
                Ok(Self::Bin { type_tag, data })
            }
            other => Err(CheckpointError::Corrupted(format!(
                "unknown envelope tag '{other}'"
            ))),
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// An object carrying a literal `$type` key must be escaped so it is not
/// mistaken for an envelope on read.
fn needs_escape(value: &Value) -> bool {
    value
        .as_object()
        .map(|obj| obj.contains_key(TYPE_KEY))
        .unwrap_or(false)
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_wire(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct ExecutorState {
        cursor: u64,
        labels: Vec<String>,
    }

    fn roundtrip(value: &StateValue) -> StateValue {
        let encoded = serde_json::to_string(value).unwrap();
        serde_json::from_str(&encoded).unwrap()
    }

    #[test]
    fn test_json_native_values_roundtrip_verbatim() {
        for value in [
            json!(null),
            json!(42),
            json!("hello"),
            json!([1, 2, 3]),
            json!({"nested": {"deeply": true}}),
        ] {
            let state = StateValue::Json(value.clone());
            assert_eq!(roundtrip(&state), state);
            // JSON-native values are written without an envelope
            assert_eq!(state.to_wire(), value);
        }
    }

    #[test]
    fn test_bytes_roundtrip() {
        let state = StateValue::Bytes(vec![0, 1, 2, 254, 255]);
        let restored = roundtrip(&state);
        assert_eq!(restored, state);
        assert_eq!(restored.tag_name(), "bytes");
    }

    #[test]
    fn test_datetime_roundtrip() {
        let ts = Utc::now();
        let restored = roundtrip(&StateValue::DateTime(ts));
        // Micros precision is preserved by the RFC 3339 encoding
        assert_eq!(
            restored.as_datetime().unwrap().timestamp_micros(),
            ts.timestamp_micros()
        );
        assert_eq!(restored.tag_name(), "datetime");
    }

    #[test]
    fn test_bin_roundtrip_preserves_tag_and_value() {
        let original = ExecutorState {
            cursor: 7,
            labels: vec!["a".into(), "b".into()],
        };
        let state = StateValue::bin("ExecutorState", &original).unwrap();
        let restored = roundtrip(&state);
        assert_eq!(restored, state);

        let decoded: ExecutorState = restored.decode().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_object_with_literal_type_key_is_escaped() {
        let tricky = json!({ "$type": "user-data", "payload": 1 });
        let state = StateValue::Json(tricky.clone());

        let wire = state.to_wire();
        assert_eq!(wire[TYPE_KEY], "json");

        let restored = roundtrip(&state);
        assert_eq!(restored, StateValue::Json(tricky));
    }

    #[test]
    fn test_unknown_envelope_tag_is_rejected() {
        let wire = json!({ "$type": "pickle", "$value": "gASV" });
        let err = StateValue::from_wire(wire).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupted(_)));
    }

    #[test]
    fn test_decode_json_into_struct() {
        let state = StateValue::from_serialize(&ExecutorState {
            cursor: 1,
            labels: vec![],
        })
        .unwrap();
        let decoded: ExecutorState = state.decode().unwrap();
        assert_eq!(decoded.cursor, 1);
    }
}
