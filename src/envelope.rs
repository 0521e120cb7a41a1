//! Transport encodings of [`Message`].
//!
//! Messages arrive in one of three [`SourceFormat`]s and leave in one of
//! two [`TargetFormat`]s. Every inbound path ends in the same canonical
//! [`Message`], so handlers never see transport details.
//!
//! Field names on the wire are fixed: `source`, `id`, `kind`, `type`,
//! `time`, `contentType`, `encodingType`, `author`, `trigger`,
//! `transaction`, plus `data` in stored items.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attribute::{AttributeValue, Item};
use crate::codec;
use crate::entity::{CREATED_EVENT, DELETED_EVENT, EntityStatus, UPDATED_EVENT};
use crate::error::{DecodeError, EncodeError};
use crate::message::{Message, MessageKind, format_timestamp, parse_timestamp};
use crate::payload::{Payload, is_json_content_type};

/// Producer path, e.g. `/orders/api`.
pub const SOURCE: &str = "source";
/// Message ID, unique per source.
pub const ID: &str = "id";
/// `event` or `command`.
pub const KIND: &str = "kind";
/// Message type, e.g. `order.place.v1`.
pub const TYPE: &str = "type";
/// RFC 3339 creation time.
pub const TIME: &str = "time";
/// Media type of the data.
pub const CONTENT_TYPE: &str = "contentType";
/// Transfer encoding of the data.
pub const ENCODING_TYPE: &str = "encodingType";
/// Actor that produced the message.
pub const AUTHOR: &str = "author";
/// Reference of the causing message, if any.
pub const TRIGGER: &str = "trigger";
/// Transaction the message belongs to.
pub const TRANSACTION: &str = "transaction";
/// Message payload.
pub const DATA: &str = "data";

/// Scalar fields every encoded message carries, in wire order.
const REQUIRED_FIELDS: [&str; 9] = [
    SOURCE,
    ID,
    KIND,
    TYPE,
    TIME,
    CONTENT_TYPE,
    ENCODING_TYPE,
    AUTHOR,
    TRANSACTION,
];

/// Attribute data type used for every published attribute.
pub const STRING_ATTRIBUTE: &str = "String";

/// Inbound transport encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Topic notification: `Message` payload string plus typed
    /// `MessageAttributes`.
    PubSub,
    /// Queue record whose `body` is a topic notification.
    Queue,
    /// Store change-stream record carrying the post-image of an entity or
    /// stored message.
    ChangeStream,
}

/// Outbound transport encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// A topic publish request.
    Publish,
    /// A store item for the message store.
    StoreItem,
}

/// Result of [`encode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// Request for the publish topic.
    Publish(PublishRequest),
    /// Item for the command store.
    Item(Item),
}

/// A typed message attribute of a publish request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttribute {
    /// Attribute type; always `String` here.
    pub data_type: String,
    /// Attribute value.
    pub string_value: String,
}

impl MessageAttribute {
    /// A `String` attribute.
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: STRING_ATTRIBUTE.to_string(),
            string_value: value.into(),
        }
    }
}

/// Everything needed to publish a message to an ordered topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublishRequest {
    /// Batch entry identifier, `source/id`.
    pub id: String,
    /// The message type.
    pub subject: String,
    /// Payload text.
    pub message: String,
    /// Ordering group: the message source.
    pub message_group_id: Option<String>,
    /// Deduplication key: the message id.
    pub message_deduplication_id: Option<String>,
    /// Message fields mirrored as filterable attributes.
    pub message_attributes: BTreeMap<String, MessageAttribute>,
}

impl PublishRequest {
    /// The notification a subscriber receives for this request.
    pub fn notification(&self) -> Value {
        let attributes: serde_json::Map<String, Value> = self
            .message_attributes
            .iter()
            .map(|(name, attr)| {
                (
                    name.clone(),
                    serde_json::json!({"Type": attr.data_type, "Value": attr.string_value}),
                )
            })
            .collect();
        serde_json::json!({
            "Type": "Notification",
            "Subject": self.subject,
            "Message": self.message,
            "MessageAttributes": attributes,
        })
    }
}

/// Decode one inbound record into a [`Message`].
///
/// # Errors
///
/// Returns a [`DecodeError`] describing the first problem found. Decode
/// errors are validation failures; redelivering the same record will fail
/// the same way.
///
/// # Examples
///
/// ```
/// use statefold::{MessageKind, SourceFormat, decode};
///
/// let raw = r#"{
///   "Message": "{\"total\":3}",
///   "MessageAttributes": {
///     "source": {"Type": "String", "Value": "/orders/o-1"},
///     "id": {"Type": "String", "Value": "00000000000000000001"},
///     "kind": {"Type": "String", "Value": "event"},
///     "type": {"Type": "String", "Value": "order.created.v1"},
///     "time": {"Type": "String", "Value": "2024-05-01T12:00:00Z"},
///     "contentType": {"Type": "String", "Value": "application/json"},
///     "encodingType": {"Type": "String", "Value": "identity"},
///     "author": {"Type": "String", "Value": "user-1"},
///     "transaction": {"Type": "String", "Value": "tx-1"}
///   }
/// }"#;
/// let msg = decode(raw.as_bytes(), SourceFormat::PubSub).unwrap();
/// assert_eq!(msg.kind(), MessageKind::Event);
/// assert_eq!(msg.trigger(), None);
/// ```
pub fn decode(raw: &[u8], format: SourceFormat) -> Result<Message, DecodeError> {
    match format {
        SourceFormat::PubSub => decode_notification(raw),
        SourceFormat::Queue => decode_queue_record(raw),
        SourceFormat::ChangeStream => decode_change_record(raw),
    }
}

/// Encode a message for a transport.
///
/// # Errors
///
/// Returns [`EncodeError::Json`] if a JSON payload is malformed when it has
/// to be turned into a map attribute.
pub fn encode(msg: &Message, format: TargetFormat) -> Result<Encoded, EncodeError> {
    match format {
        TargetFormat::Publish => Ok(Encoded::Publish(publish_request(msg))),
        TargetFormat::StoreItem => store_item(msg).map(Encoded::Item),
    }
}

/// Build the publish request for `msg`.
pub fn publish_request(msg: &Message) -> PublishRequest {
    let mut attributes = BTreeMap::new();
    for (name, value) in scalar_fields(msg) {
        attributes.insert(name.to_string(), MessageAttribute::string(value));
    }
    if let Some(trigger) = msg.trigger() {
        attributes.insert(TRIGGER.to_string(), MessageAttribute::string(trigger));
    }
    PublishRequest {
        id: msg.reference(),
        subject: msg.message_type().to_string(),
        message: msg.data().to_text(),
        message_group_id: Some(msg.source().to_string()),
        message_deduplication_id: Some(msg.id().to_string()),
        message_attributes: attributes,
    }
}

/// Build the message-store item for `msg`.
///
/// JSON-object payloads become a map attribute; any other payload is
/// stored as its text. An absent trigger is an explicit NULL.
///
/// # Errors
///
/// Returns [`EncodeError::Json`] if a JSON payload does not parse.
pub fn store_item(msg: &Message) -> Result<Item, EncodeError> {
    let mut item: Item = scalar_fields(msg)
        .into_iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::S(value)))
        .collect();
    item.insert(
        TRIGGER.to_string(),
        msg.trigger().map_or_else(AttributeValue::null, AttributeValue::s),
    );

    let data = if msg.data().is_json() {
        match msg.data().to_value()? {
            object @ Value::Object(_) => AttributeValue::from_json(&object),
            _ => AttributeValue::S(msg.data().to_text()),
        }
    } else {
        AttributeValue::S(msg.data().to_text())
    };
    item.insert(DATA.to_string(), data);
    Ok(item)
}

fn scalar_fields(msg: &Message) -> [(&'static str, String); 9] {
    [
        (SOURCE, msg.source().to_string()),
        (ID, msg.id().to_string()),
        (KIND, msg.kind().as_str().to_string()),
        (TYPE, msg.message_type().to_string()),
        (TIME, format_timestamp(&msg.time())),
        (CONTENT_TYPE, msg.content_type().to_string()),
        (ENCODING_TYPE, msg.encoding_type().to_string()),
        (AUTHOR, msg.author().to_string()),
        (TRANSACTION, msg.transaction().to_string()),
    ]
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Notification {
    message: Option<String>,
    message_attributes: Option<BTreeMap<String, NotificationAttribute>>,
}

#[derive(Deserialize)]
struct NotificationAttribute {
    #[serde(rename = "Type")]
    data_type: String,
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Deserialize)]
struct QueueRecord {
    body: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeRecord {
    event_name: Option<String>,
    dynamodb: Option<StreamRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StreamRecord {
    new_image: Option<Item>,
}

fn decode_notification(raw: &[u8]) -> Result<Message, DecodeError> {
    let notification: Notification = serde_json::from_slice(raw)?;
    let payload = notification
        .message
        .ok_or_else(|| DecodeError::MissingField("Message".to_string()))?;
    let attributes = notification
        .message_attributes
        .ok_or_else(|| DecodeError::MissingField("MessageAttributes".to_string()))?;

    let mut fields = BTreeMap::new();
    for (name, attr) in attributes {
        if attr.data_type != STRING_ATTRIBUTE {
            return Err(DecodeError::invalid(
                name,
                format!("expected attribute type `String`, got `{}`", attr.data_type),
            ));
        }
        fields.insert(name, attr.value);
    }
    message_from_fields(&fields, payload.into_bytes())
}

fn decode_queue_record(raw: &[u8]) -> Result<Message, DecodeError> {
    let record: QueueRecord = serde_json::from_slice(raw)?;
    let body = record
        .body
        .ok_or_else(|| DecodeError::MissingField("body".to_string()))?;
    decode_notification(body.as_bytes())
}

fn decode_change_record(raw: &[u8]) -> Result<Message, DecodeError> {
    let record: ChangeRecord = serde_json::from_slice(raw)?;
    let event_name = record
        .event_name
        .ok_or_else(|| DecodeError::MissingField("eventName".to_string()))?;
    let inserted = match event_name.as_str() {
        "INSERT" => true,
        "MODIFY" => false,
        "REMOVE" => {
            return Err(DecodeError::Unsupported(
                "physical record deletion is not allowed".to_string(),
            ));
        }
        other => {
            return Err(DecodeError::invalid(
                "eventName",
                format!("unknown change `{other}`"),
            ));
        }
    };
    let image = record
        .dynamodb
        .and_then(|r| r.new_image)
        .ok_or_else(|| DecodeError::MissingField("dynamodb.NewImage".to_string()))?;

    if image.contains_key(codec::TYPENAME) {
        entity_event(&image, inserted)
    } else {
        stored_message(&image)
    }
}

/// Derive the event for an entity post-image.
fn entity_event(image: &Item, inserted: bool) -> Result<Message, DecodeError> {
    let entity = codec::from_store_item(image)?;
    let event_type = match (&entity.last_event_type, entity.status(), inserted) {
        (Some(event_type), _, _) => event_type.as_str(),
        (None, EntityStatus::Dead, _) => DELETED_EVENT,
        (None, EntityStatus::Alive, true) => CREATED_EVENT,
        (None, EntityStatus::Alive, false) => UPDATED_EVENT,
    };
    let data = match &entity.last_event_data {
        Some(data) => data.clone(),
        None => Payload::from_value(&Value::Object(codec::public_fields(image)?)),
    };
    Ok(entity.event_message(event_type, entity.last_event_version.unwrap_or(1), data))
}

/// Rebuild a message from its message-store post-image.
fn stored_message(image: &Item) -> Result<Message, DecodeError> {
    let mut fields = BTreeMap::new();
    for name in REQUIRED_FIELDS.iter().chain([&TRIGGER]) {
        match image.get(*name) {
            None | Some(AttributeValue::Null(_)) => {}
            Some(AttributeValue::S(value)) => {
                fields.insert(name.to_string(), value.clone());
            }
            Some(_) => return Err(DecodeError::invalid(*name, "expected a string")),
        }
    }

    let is_json = fields
        .get(CONTENT_TYPE)
        .is_some_and(|ct| is_json_content_type(ct));
    let bytes = match image.get(DATA) {
        None | Some(AttributeValue::Null(_)) if is_json => b"{}".to_vec(),
        None | Some(AttributeValue::Null(_)) => Vec::new(),
        Some(AttributeValue::S(text)) => text.clone().into_bytes(),
        Some(value) => value.to_json()?.to_string().into_bytes(),
    };
    message_from_fields(&fields, bytes)
}

fn message_from_fields(fields: &BTreeMap<String, String>, data: Vec<u8>) -> Result<Message, DecodeError> {
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|name| !fields.contains_key(**name)) {
        return Err(DecodeError::MissingField((*missing).to_string()));
    }
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

    let content_type = field(CONTENT_TYPE);
    if is_json_content_type(&content_type) {
        serde_json::from_slice::<Value>(&data)?;
    }

    Ok(Message::builder(
        MessageKind::parse(&field(KIND))?,
        field(SOURCE),
        field(ID),
        field(TYPE),
    )
    .time(parse_timestamp(TIME, &field(TIME))?)
    .encoding_type(field(ENCODING_TYPE))
    .data(Payload::new(content_type, data))
    .author(field(AUTHOR))
    .maybe_trigger(fields.get(TRIGGER).cloned())
    .transaction(field(TRANSACTION))
    .build())
}
