//! Typed payloads and message envelopes
//!
//! Executors exchange [`Message`] envelopes whose payload is a
//! [`TypedData`]: a JSON value paired with the type key of the Rust type it
//! was encoded from. Handlers are registered under the same keys
//! (see [`type_key`]), so runtime dispatch, send-time output checking, and
//! static graph validation all share one key space.
//!
//! Fan-in targets accept aggregated lists; their keys are derived with
//! [`list_type_key`], and the wildcard key [`ANY_TYPE`] is assignable
//! from and to every type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Result, WorkflowError};

/// Wildcard type key, assignable from and to every payload type
pub const ANY_TYPE: &str = "any";

/// Synthetic source ID of response envelopes produced by `send_responses`
pub const REQUEST_INFO_SOURCE: &str = "request_info";

/// Synthetic source ID of the initial envelope injected by `run_stream`
pub const INPUT_SOURCE: &str = "__input__";

/// The type key of `T`
///
/// Keys are module-qualified Rust type names. They are stable within a
/// build, which is the lifetime they are needed for: registration, send-time
/// checks, and checkpointed messages are all decoded by the same binary that
/// produced them.
pub fn type_key<T: ?Sized>() -> String {
    std::any::type_name::<T>().to_string()
}

/// The type key of an aggregated list of `inner` payloads (fan-in targets)
pub fn list_type_key(inner: &str) -> String {
    format!("list<{inner}>")
}

/// A payload together with the type key it was encoded from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedData {
    /// Type key of the encoded value
    pub type_name: String,
    /// JSON encoding of the value
    pub value: Value,
}

impl TypedData {
    /// Encode a value under its own type key
    pub fn new<T: Serialize + 'static>(value: &T) -> Result<Self> {
        Ok(Self {
            type_name: type_key::<T>(),
            value: serde_json::to_value(value)?,
        })
    }

    /// Build a payload from an explicit type key and JSON value
    pub fn from_parts(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    /// Encode a slice as an aggregated list payload (fan-in shape)
    pub fn list<T: Serialize + 'static>(items: &[T]) -> Result<Self> {
        Ok(Self {
            type_name: list_type_key(&type_key::<T>()),
            value: serde_json::to_value(items)?,
        })
    }

    /// Whether this payload was encoded from `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.type_name == type_key::<T>()
    }

    /// Decode the payload into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|err| WorkflowError::PayloadDecode {
            message_type: self.type_name.clone(),
            message: err.to_string(),
        })
    }
}

/// A message envelope moving through the graph
///
/// `target_id = None` means the message is broadcast along whichever edge
/// groups claim its source; a present `target_id` restricts delivery to that
/// executor. Trace contexts and source span IDs ride along so fan-in
/// deliveries can link back to every contributing span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The typed payload
    pub data: TypedData,

    /// ID of the executor (or synthetic source) that emitted the message
    pub source_id: String,

    /// Explicit delivery target, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    /// W3C-style trace context carriers from the emitting side
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace_contexts: Vec<HashMap<String, String>>,

    /// Span IDs of the spans that emitted this message, for span linking
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_span_ids: Vec<String>,
}

impl Message {
    /// Create a broadcast message
    pub fn new(data: TypedData, source_id: impl Into<String>) -> Self {
        Self {
            data,
            source_id: source_id.into(),
            target_id: None,
            trace_contexts: Vec::new(),
            source_span_ids: Vec::new(),
        }
    }

    /// Restrict delivery to one executor
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Attach trace linkage from the emitting span
    pub fn with_trace(
        mut self,
        trace_contexts: Vec<HashMap<String, String>>,
        source_span_ids: Vec<String>,
    ) -> Self {
        self.trace_contexts = trace_contexts;
        self.source_span_ids = source_span_ids;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Order {
        id: u32,
    }

    #[test]
    fn test_type_keys_are_distinct_and_stable() {
        assert_eq!(type_key::<String>(), type_key::<String>());
        assert_ne!(type_key::<String>(), type_key::<Order>());
        assert_eq!(
            list_type_key(&type_key::<Order>()),
            format!("list<{}>", type_key::<Order>())
        );
    }

    #[test]
    fn test_typed_data_roundtrip() {
        let data = TypedData::new(&Order { id: 7 }).unwrap();
        assert!(data.is::<Order>());
        assert!(!data.is::<String>());
        let decoded: Order = data.decode().unwrap();
        assert_eq!(decoded, Order { id: 7 });
    }

    #[test]
    fn test_decode_mismatch_reports_type() {
        let data = TypedData::new(&"hello".to_string()).unwrap();
        let err = data.decode::<Order>().unwrap_err();
        assert!(matches!(err, WorkflowError::PayloadDecode { .. }));
    }

    #[test]
    fn test_list_payload_uses_list_key() {
        let data = TypedData::list(&[Order { id: 1 }, Order { id: 2 }]).unwrap();
        assert_eq!(data.type_name, list_type_key(&type_key::<Order>()));
        let decoded: Vec<Order> = data.decode().unwrap();
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn test_message_envelope_serialization() {
        let message = Message::new(TypedData::from_parts("t", json!(1)), "a")
            .with_target("b")
            .with_trace(vec![HashMap::new()], vec!["span-1".into()]);
        let encoded = serde_json::to_value(&message).unwrap();
        let restored: Message = serde_json::from_value(encoded).unwrap();
        assert_eq!(restored.source_id, "a");
        assert_eq!(restored.target_id.as_deref(), Some("b"));
        assert_eq!(restored.source_span_ids, vec!["span-1".to_string()]);
    }
}
