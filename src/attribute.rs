//! Native item representation of the backing key-value store.
//!
//! [`AttributeValue`] serializes with serde's externally tagged enum layout,
//! which is exactly the store's JSON wire format (`{"S": "abc"}`,
//! `{"N": "42"}`, `{"NULL": true}`, ...). Change-stream records and stored
//! items therefore decode straight into these types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::DecodeError;

/// A store item: attribute name to value.
///
/// A `BTreeMap` keeps attribute iteration order stable, which keeps
/// generated update expressions deterministic.
pub type Item = BTreeMap<String, AttributeValue>;

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// UTF-8 string.
    #[serde(rename = "S")]
    S(String),
    /// Number, carried as its decimal string form.
    #[serde(rename = "N")]
    N(String),
    /// Boolean.
    #[serde(rename = "BOOL")]
    Bool(bool),
    /// Explicit null marker.
    #[serde(rename = "NULL")]
    Null(bool),
    /// Nested map.
    #[serde(rename = "M")]
    M(BTreeMap<String, AttributeValue>),
    /// Ordered list.
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    /// String set.
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    /// Number set.
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    /// Binary, base64 text as delivered by the store.
    #[serde(rename = "B")]
    B(String),
}

impl AttributeValue {
    /// The explicit null marker, `{"NULL": true}`.
    pub fn null() -> Self {
        Self::Null(true)
    }

    /// Shorthand for a string attribute.
    pub fn s(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    /// Shorthand for a numeric attribute from an unsigned integer.
    pub fn n(value: u64) -> Self {
        Self::N(value.to_string())
    }

    /// Returns `true` for the explicit null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Returns the string contents of an `S` attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Parses an `N` attribute as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::N(n) => n.parse().ok(),
            _ => None,
        }
    }

    /// Returns the entries of an `M` attribute.
    pub fn as_map(&self) -> Option<&BTreeMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }

    /// Converts a JSON value into an attribute value.
    ///
    /// JSON `null` becomes the explicit null marker, so callers can tell
    /// "set to nothing" apart from "absent".
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::null(),
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::N(n.to_string()),
            Value::String(s) => Self::S(s.clone()),
            Value::Array(items) => Self::L(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::M(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts this attribute back into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidField`] if an `N` or `NS` member is not
    /// a valid number.
    pub fn to_json(&self) -> Result<Value, DecodeError> {
        Ok(match self {
            Self::S(s) | Self::B(s) => Value::String(s.clone()),
            Self::N(n) => Value::Number(parse_number(n)?),
            Self::Bool(b) => Value::Bool(*b),
            Self::Null(_) => Value::Null,
            Self::M(m) => Value::Object(item_to_json(m)?),
            Self::L(items) => Value::Array(
                items
                    .iter()
                    .map(Self::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Self::Ss(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
            Self::Ns(items) => Value::Array(
                items
                    .iter()
                    .map(|n| parse_number(n).map(Value::Number))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }
}

/// Converts a whole item (or nested map) into a JSON object.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidField`] if a numeric attribute is malformed.
pub fn item_to_json(item: &BTreeMap<String, AttributeValue>) -> Result<Map<String, Value>, DecodeError> {
    item.iter()
        .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
        .collect()
}

/// Parses the store's decimal string form into a JSON number.
///
/// Integers keep full 64-bit precision; anything else goes through `f64`.
fn parse_number(raw: &str) -> Result<Number, DecodeError> {
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(Number::from(u));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Number::from(i));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| DecodeError::invalid("N", format!("`{raw}` is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_matches_store_json() {
        let value = AttributeValue::M(BTreeMap::from([
            ("name".to_string(), AttributeValue::s("widget")),
            ("count".to_string(), AttributeValue::n(3)),
            ("gone".to_string(), AttributeValue::null()),
        ]));
        let json = serde_json::to_value(&value).expect("serialize should succeed");
        assert_eq!(
            json,
            json!({"M": {"count": {"N": "3"}, "gone": {"NULL": true}, "name": {"S": "widget"}}})
        );
    }

    #[test]
    fn deserializes_stream_image_members() {
        let raw = r#"{"tags": {"SS": ["a", "b"]}, "ok": {"BOOL": true}, "l": {"L": [{"N": "1.5"}]}}"#;
        let item: Item = serde_json::from_str(raw).expect("image should parse");
        assert_eq!(
            item["tags"],
            AttributeValue::Ss(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(item["ok"], AttributeValue::Bool(true));
        assert_eq!(
            item["l"].to_json().expect("list should convert"),
            json!([1.5])
        );
    }

    #[test]
    fn json_null_becomes_explicit_marker() {
        assert!(AttributeValue::from_json(&Value::Null).is_null());
    }

    #[test]
    fn json_object_survives_conversion() {
        let original = json!({
            "name": "widget",
            "price": 12.25,
            "stock": 7,
            "delta": -3,
            "tags": ["x", "y"],
            "nested": {"flag": false, "none": null}
        });
        let attr = AttributeValue::from_json(&original);
        assert_eq!(attr.to_json().expect("convert back"), original);
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = AttributeValue::N("twelve".into())
            .to_json()
            .expect_err("non-numeric N must fail");
        assert!(err.to_string().contains("twelve"));
    }

    #[test]
    fn accessors_match_variants() {
        assert_eq!(AttributeValue::s("x").as_str(), Some("x"));
        assert_eq!(AttributeValue::n(9).as_u64(), Some(9));
        assert_eq!(AttributeValue::s("9").as_u64(), None);
        assert!(AttributeValue::M(BTreeMap::new()).as_map().is_some());
    }
}
