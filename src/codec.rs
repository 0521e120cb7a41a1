//! Entity snapshot <-> store item conversion.
//!
//! Data fields are flattened into the item next to the system attributes.
//! Optional fields that are absent, data fields the snapshot dropped, and
//! indexes it left are written as explicit NULL markers so the writer knows
//! to remove them. A JSON `null` data value is stored the same way, as an
//! absent field.

use serde_json::{Map, Value};

use crate::attribute::{AttributeValue, Item, item_to_json};
use crate::entity::{Entity, EntityStatus};
use crate::error::{DecodeError, EncodeError};
use crate::message::{format_timestamp, parse_timestamp};
use crate::payload::Payload;

/// Entity type name.
pub const TYPENAME: &str = "__typename";
/// Entity ID; the table key.
pub const ID: &str = "id";
/// Snapshot version.
pub const VERSION: &str = "version";
/// `alive` or `dead`.
pub const STATUS: &str = "__status";
/// `<status>#<type>`, the partition key of listings.
pub const SPACE: &str = "__space";
/// RFC 3339 creation time.
pub const CREATED_AT: &str = "createdAt";
/// Actor that created the entity.
pub const CREATED_BY: &str = "createdBy";
/// RFC 3339 time of the latest write.
pub const UPDATED_AT: &str = "updatedAt";
/// Actor of the latest write.
pub const UPDATED_BY: &str = "updatedBy";
/// Transaction of the latest write.
pub const TRANSACTION: &str = "__transaction";
/// Reference of the message that caused the latest event.
pub const EVENT_TRIGGER: &str = "__eventtrigger";
/// Explicit type of the latest event.
pub const EVENT_TYPE: &str = "__eventtype";
/// Schema version of the latest event.
pub const EVENT_VERSION: &str = "__eventversion";
/// Explicit data of the latest event.
pub const EVENT_DATA: &str = "__eventdata";

/// Every system attribute name. Data fields may not use these.
pub const SYSTEM_ATTRIBUTES: [&str; 14] = [
    TYPENAME,
    ID,
    VERSION,
    STATUS,
    SPACE,
    CREATED_AT,
    CREATED_BY,
    UPDATED_AT,
    UPDATED_BY,
    TRANSACTION,
    EVENT_TRIGGER,
    EVENT_TYPE,
    EVENT_VERSION,
    EVENT_DATA,
];

/// Attributes every stored entity must carry.
pub const REQUIRED_ATTRIBUTES: [&str; 10] = [
    TYPENAME,
    SPACE,
    STATUS,
    TRANSACTION,
    ID,
    VERSION,
    UPDATED_BY,
    UPDATED_AT,
    CREATED_BY,
    CREATED_AT,
];

const INDEX_PREFIX: &str = "__";
const INDEX_SUFFIX: &str = "-pk";

/// Attribute name holding the partition key of index `name`.
pub fn index_attribute(name: &str) -> String {
    format!("{INDEX_PREFIX}{name}{INDEX_SUFFIX}")
}

/// The `__space` value partitioning entities by status and type.
pub fn space(status: EntityStatus, entity_type: &str) -> String {
    format!("{status}#{entity_type}")
}

fn index_name(attribute: &str) -> Option<&str> {
    attribute
        .strip_prefix(INDEX_PREFIX)?
        .strip_suffix(INDEX_SUFFIX)
        .filter(|name| !name.is_empty())
}

fn is_reserved(name: &str) -> bool {
    name.starts_with(INDEX_PREFIX) || SYSTEM_ATTRIBUTES.contains(&name)
}

fn optional<T>(value: Option<T>, encode: impl FnOnce(T) -> AttributeValue) -> AttributeValue {
    value.map_or_else(AttributeValue::null, encode)
}

/// Encode an entity snapshot as a store item.
///
/// # Errors
///
/// * [`EncodeError::DataNotObject`] if the entity data is not a JSON object.
/// * [`EncodeError::ReservedField`] if a data field collides with a system
///   attribute or starts with `__`.
/// * [`EncodeError::NotJson`] if explicit event data is not JSON.
pub fn to_store_item(entity: &Entity) -> Result<Item, EncodeError> {
    let not_object = || EncodeError::DataNotObject {
        content_type: entity.data.content_type().to_string(),
    };
    if !entity.data.is_json() {
        return Err(not_object());
    }
    let Value::Object(fields) = entity.data.to_value()? else {
        return Err(not_object());
    };

    let mut item = Item::new();
    for (name, value) in &fields {
        if is_reserved(name) {
            return Err(EncodeError::ReservedField(name.clone()));
        }
        item.insert(name.clone(), AttributeValue::from_json(value));
    }
    for name in &entity.removed_fields {
        if !is_reserved(name) {
            item.entry(name.clone()).or_insert_with(AttributeValue::null);
        }
    }

    let event_data = match &entity.last_event_data {
        Some(payload) if !payload.is_json() => {
            return Err(EncodeError::NotJson {
                field: EVENT_DATA.to_string(),
                content_type: payload.content_type().to_string(),
            });
        }
        Some(payload) => AttributeValue::from_json(&payload.to_value()?),
        None => AttributeValue::null(),
    };

    item.extend([
        (TYPENAME.to_string(), AttributeValue::s(&entity.entity_type)),
        (ID.to_string(), AttributeValue::s(&entity.id)),
        (VERSION.to_string(), AttributeValue::n(entity.version)),
        (STATUS.to_string(), AttributeValue::s(entity.status.as_str())),
        (SPACE.to_string(), AttributeValue::s(space(entity.status, &entity.entity_type))),
        (CREATED_AT.to_string(), AttributeValue::s(format_timestamp(&entity.created_at))),
        (CREATED_BY.to_string(), AttributeValue::s(&entity.created_by)),
        (UPDATED_AT.to_string(), AttributeValue::s(format_timestamp(&entity.updated_at))),
        (UPDATED_BY.to_string(), AttributeValue::s(&entity.updated_by)),
        (TRANSACTION.to_string(), AttributeValue::s(&entity.last_transaction)),
        (
            EVENT_TRIGGER.to_string(),
            optional(entity.last_event_trigger.as_deref(), AttributeValue::s),
        ),
        (
            EVENT_TYPE.to_string(),
            optional(entity.last_event_type.as_deref(), AttributeValue::s),
        ),
        (
            EVENT_VERSION.to_string(),
            optional(entity.last_event_version, AttributeValue::n),
        ),
        (EVENT_DATA.to_string(), event_data),
    ]);

    for (name, partition_key) in &entity.indexes {
        item.insert(index_attribute(name), AttributeValue::s(partition_key));
    }
    for name in &entity.retired_indexes {
        item.insert(index_attribute(name), AttributeValue::null());
    }
    Ok(item)
}

/// Decode a stored item into an entity snapshot.
///
/// Index memberships are inferred from `__<name>-pk` attributes; a NULL
/// index attribute marks the index as retired.
///
/// # Errors
///
/// * [`DecodeError::MissingField`] if a required attribute is absent or NULL.
/// * [`DecodeError::InvalidField`] if an attribute has the wrong type, the
///   status is unknown, or `__space` disagrees with status and type.
/// * [`DecodeError::InvalidTimestamp`] if an audit timestamp is malformed.
pub fn from_store_item(item: &Item) -> Result<Entity, DecodeError> {
    if let Some(missing) = REQUIRED_ATTRIBUTES
        .iter()
        .find(|name| item.get(**name).is_none_or(AttributeValue::is_null))
    {
        return Err(DecodeError::MissingField((*missing).to_string()));
    }

    let entity_type = required_str(item, TYPENAME)?;
    let status = EntityStatus::parse(required_str(item, STATUS)?)?;
    let stored_space = required_str(item, SPACE)?;
    if stored_space != space(status, entity_type) {
        return Err(DecodeError::invalid(
            SPACE,
            format!("`{stored_space}` does not match status and type"),
        ));
    }

    let mut data = Map::new();
    let mut entity = Entity {
        id: required_str(item, ID)?.to_string(),
        entity_type: entity_type.to_string(),
        version: stored_version(item)?,
        status,
        data: Payload::empty_object(),
        created_at: parse_timestamp(CREATED_AT, required_str(item, CREATED_AT)?)?,
        created_by: required_str(item, CREATED_BY)?.to_string(),
        updated_at: parse_timestamp(UPDATED_AT, required_str(item, UPDATED_AT)?)?,
        updated_by: required_str(item, UPDATED_BY)?.to_string(),
        last_transaction: required_str(item, TRANSACTION)?.to_string(),
        last_event_trigger: optional_str(item, EVENT_TRIGGER)?,
        last_event_type: optional_str(item, EVENT_TYPE)?,
        last_event_version: optional_u64(item, EVENT_VERSION)?,
        last_event_data: match item.get(EVENT_DATA) {
            Some(value) if !value.is_null() => Some(Payload::from_value(&value.to_json()?)),
            _ => None,
        },
        indexes: Default::default(),
        retired_indexes: Default::default(),
        removed_fields: Default::default(),
    };

    for (name, value) in item {
        if let Some(index) = index_name(name) {
            match value {
                AttributeValue::Null(_) => {
                    entity.retired_indexes.insert(index.to_string());
                }
                AttributeValue::S(partition_key) => {
                    entity.indexes.insert(index.to_string(), partition_key.clone());
                }
                _ => return Err(DecodeError::invalid(name.as_str(), "expected a string")),
            }
        } else if is_reserved(name) {
            continue;
        } else if value.is_null() {
            entity.removed_fields.insert(name.clone());
        } else {
            data.insert(name.clone(), value.to_json()?);
        }
    }
    entity.data = Payload::from_value(&Value::Object(data));
    Ok(entity)
}

/// The item as JSON with every `__`-prefixed attribute removed.
pub(crate) fn public_fields(item: &Item) -> Result<Map<String, Value>, DecodeError> {
    let mut fields = item_to_json(item)?;
    fields.retain(|name, _| !name.starts_with(INDEX_PREFIX));
    Ok(fields)
}

fn required_str<'a>(item: &'a Item, name: &str) -> Result<&'a str, DecodeError> {
    item.get(name)
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))?
        .as_str()
        .ok_or_else(|| DecodeError::invalid(name, "expected a string"))
}

fn required_u64(item: &Item, name: &str) -> Result<u64, DecodeError> {
    item.get(name)
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))?
        .as_u64()
        .ok_or_else(|| DecodeError::invalid(name, "expected an unsigned integer"))
}

/// Versions start at 1 and must leave room for one more increment.
fn stored_version(item: &Item) -> Result<u64, DecodeError> {
    match required_u64(item, VERSION)? {
        0 => Err(DecodeError::invalid(VERSION, "versions start at 1")),
        u64::MAX => Err(DecodeError::invalid(VERSION, "version cannot be incremented")),
        version => Ok(version),
    }
}

fn optional_str(item: &Item, name: &str) -> Result<Option<String>, DecodeError> {
    match item.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::S(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::invalid(name, "expected a string")),
    }
}

fn optional_u64(item: &Item, name: &str) -> Result<Option<u64>, DecodeError> {
    match item.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| DecodeError::invalid(name, "expected an unsigned integer")),
    }
}
