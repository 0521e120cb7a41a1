//! Opaque message and entity data: serialized bytes plus a content type.
//!
//! The runtime never interprets a payload beyond what its wire encodings
//! need. Handlers decode it against their own schema with
//! [`Payload::decode`].

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Content type used for JSON payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A serialized data blob tagged with its content type.
///
/// JSON payloads built through [`Payload::json`] or [`Payload::from_value`]
/// are stored in canonical form (object keys sorted), so two payloads
/// holding the same JSON document compare equal byte-for-byte.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload {
    content_type: String,
    bytes: Vec<u8>,
}

impl Payload {
    /// Wrap raw bytes with an explicit content type.
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Serialize any value as a canonical JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        // Going through `Value` sorts object keys.
        Ok(Self::from_value(&serde_json::to_value(value)?))
    }

    /// Build a canonical JSON payload from an already-parsed value.
    pub fn from_value(value: &Value) -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_string(),
            bytes: value.to_string().into_bytes(),
        }
    }

    /// An empty JSON object payload.
    pub fn empty_object() -> Self {
        Self::from_value(&Value::Object(serde_json::Map::new()))
    }

    /// The content-type tag, e.g. `application/json`.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The raw serialized bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns `true` if the content type denotes JSON.
    pub fn is_json(&self) -> bool {
        is_json_content_type(&self.content_type)
    }

    /// Parse the payload as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the bytes are not valid JSON.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.bytes)
    }

    /// Deserialize the payload into a handler-defined type.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the bytes do not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.bytes)
    }

    /// The payload as text, replacing invalid UTF-8 sequences.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Returns `true` for `application/json` and `+json` suffixed media types.
pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == JSON_CONTENT_TYPE || essence.ends_with("+json")
}
