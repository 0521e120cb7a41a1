//! Versioned entity snapshots and the operations that produce them.
//!
//! An [`Entity`] is an immutable snapshot. Creating, mutating, or deleting
//! never changes a snapshot in place; each operation returns a builder whose
//! [`execute`](Mutation::execute) yields the next snapshot with its version
//! incremented. The snapshot also records the event that produced it, which
//! [`Entity::last_event`] turns into a publishable [`Message`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use convert_case::{Case, Casing};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::DecodeError;
use crate::message::{Message, MessageKind};
use crate::payload::Payload;

/// Event type recorded when no explicit event is given at creation.
pub const CREATED_EVENT: &str = "created";
/// Event type recorded when no explicit event is given on mutation.
pub const UPDATED_EVENT: &str = "updated";
/// Event type recorded when no explicit event is given on deletion.
pub const DELETED_EVENT: &str = "deleted";

/// Lifecycle status of an entity. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    /// The entity accepts mutations.
    Alive,
    /// The entity was soft-deleted and is frozen.
    Dead,
}

impl EntityStatus {
    /// Stored name: `alive` or `dead`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Dead => "dead",
        }
    }

    /// Parse the stored name.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidField`] for any other value.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        match raw {
            "alive" => Ok(Self::Alive),
            "dead" => Ok(Self::Dead),
            other => Err(DecodeError::invalid(
                "__status",
                format!("expected `alive` or `dead`, got `{other}`"),
            )),
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain state type stored as entity data.
///
/// The implementing type is serialized as a JSON object and flattened into
/// the stored item, so its field names must not collide with system
/// attribute names.
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use statefold::EntityState;
///
/// #[derive(Serialize, Deserialize)]
/// struct Order {
///     total: u64,
/// }
///
/// impl EntityState for Order {
///     const TYPE_NAME: &'static str = "Order";
/// }
/// ```
pub trait EntityState: Serialize + DeserializeOwned {
    /// Domain type name, e.g. `"PurchaseOrder"`. Kebab-cased in event
    /// sources and types.
    const TYPE_NAME: &'static str;
}

/// Explicit description of the event an operation represents.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EventDescriptor {
    pub(crate) event_type: String,
    pub(crate) version: u64,
    pub(crate) data: Option<Payload>,
}

impl EventDescriptor {
    fn new(event_type: impl Into<String>, version: u64, data: Option<Payload>) -> Self {
        Self {
            event_type: event_type.into(),
            version: version.max(1),
            data,
        }
    }
}

/// An immutable, versioned snapshot of a domain entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) id: String,
    pub(crate) entity_type: String,
    pub(crate) version: u64,
    pub(crate) status: EntityStatus,
    pub(crate) data: Payload,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) created_by: String,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) updated_by: String,
    pub(crate) last_transaction: String,
    pub(crate) last_event_trigger: Option<String>,
    pub(crate) last_event_type: Option<String>,
    pub(crate) last_event_version: Option<u64>,
    pub(crate) last_event_data: Option<Payload>,
    pub(crate) indexes: BTreeMap<String, String>,
    pub(crate) retired_indexes: BTreeSet<String>,
    pub(crate) removed_fields: BTreeSet<String>,
}

impl Entity {
    /// Start creating a new entity of `entity_type`.
    ///
    /// The entity gets a fresh time-ordered ID unless one is supplied with
    /// [`Creation::with_id`].
    ///
    /// # Arguments
    ///
    /// * `ctx` - Who is acting and on behalf of which transaction.
    /// * `entity_type` - Domain type name, e.g. `"Order"`.
    /// * `data` - Initial state. Must be a JSON object to be stored.
    ///
    /// # Examples
    ///
    /// ```
    /// use statefold::{Entity, EntityStatus, ExecutionContext, Payload};
    ///
    /// let ctx = ExecutionContext::new("user-1", "tx-1");
    /// let data = Payload::json(&serde_json::json!({"total": 10})).unwrap();
    /// let order = Entity::create(&ctx, "Order", data).execute();
    ///
    /// assert_eq!(order.version(), 1);
    /// assert_eq!(order.status(), EntityStatus::Alive);
    /// assert_eq!(order.last_event().message_type(), "order.created.v1");
    /// ```
    pub fn create<'a>(
        ctx: &'a ExecutionContext,
        entity_type: impl Into<String>,
        data: Payload,
    ) -> Creation<'a> {
        Creation {
            ctx,
            entity_type: entity_type.into(),
            id: None,
            data,
            options: Options::default(),
        }
    }

    /// Start creating a new entity from a typed state value.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if `state` cannot be serialized.
    pub fn create_state<'a, S: EntityState>(
        ctx: &'a ExecutionContext,
        state: &S,
    ) -> serde_json::Result<Creation<'a>> {
        Ok(Self::create(ctx, S::TYPE_NAME, Payload::json(state)?))
    }

    /// Start a mutation that replaces the entity data.
    ///
    /// Returns `None` if the entity is dead; dead entities are frozen.
    pub fn mutate<'a>(&'a self, ctx: &'a ExecutionContext, data: Payload) -> Option<Mutation<'a>> {
        if self.status == EntityStatus::Dead {
            return None;
        }
        Some(Mutation {
            base: self,
            ctx,
            data,
            options: Options::default(),
        })
    }

    /// Start a mutation from a typed state value.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if `state` cannot be serialized.
    pub fn mutate_state<'a, S: EntityState>(
        &'a self,
        ctx: &'a ExecutionContext,
        state: &S,
    ) -> serde_json::Result<Option<Mutation<'a>>> {
        Ok(self.mutate(ctx, Payload::json(state)?))
    }

    /// Start a soft deletion.
    ///
    /// Returns `None` if the entity is already dead.
    pub fn delete<'a>(&'a self, ctx: &'a ExecutionContext) -> Option<Deletion<'a>> {
        if self.status == EntityStatus::Dead {
            return None;
        }
        Some(Deletion {
            base: self,
            ctx,
            options: Options::default(),
        })
    }

    /// Globally unique, immutable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Domain type name.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Snapshot version; 1 at creation, +1 per mutation or deletion.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Lifecycle status.
    pub fn status(&self) -> EntityStatus {
        self.status
    }

    /// Returns `true` if the entity is alive.
    pub fn is_alive(&self) -> bool {
        self.status == EntityStatus::Alive
    }

    /// The entity state payload.
    pub fn data(&self) -> &Payload {
        &self.data
    }

    /// Deserialize the entity state into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the data does not match `T`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        self.data.decode()
    }

    /// When version 1 was produced.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Actor that created the entity.
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// When this snapshot was produced.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Actor that produced this snapshot.
    pub fn updated_by(&self) -> &str {
        &self.updated_by
    }

    /// Transaction of the operation that produced this snapshot.
    pub fn last_transaction(&self) -> &str {
        &self.last_transaction
    }

    /// Trigger of the operation that produced this snapshot.
    pub fn last_event_trigger(&self) -> Option<&str> {
        self.last_event_trigger.as_deref()
    }

    /// Secondary-index memberships: index name to partition-key value.
    pub fn indexes(&self) -> &BTreeMap<String, String> {
        &self.indexes
    }

    /// Indexes the previous snapshot belonged to that this one left.
    pub fn retired_indexes(&self) -> &BTreeSet<String> {
        &self.retired_indexes
    }

    /// Data fields the previous snapshot had that this one dropped.
    pub fn removed_fields(&self) -> &BTreeSet<String> {
        &self.removed_fields
    }

    /// The event that produced this snapshot, as a publishable message.
    ///
    /// Without an explicit event descriptor the event type defaults to
    /// `deleted` for dead entities, `created` at version 1, and `updated`
    /// otherwise. The event version defaults to 1 and the event data to the
    /// entity data. The result depends only on the snapshot.
    pub fn last_event(&self) -> Message {
        let event_type = self
            .last_event_type
            .as_deref()
            .unwrap_or_else(|| default_event_type(self.status, self.version));
        let data = self
            .last_event_data
            .clone()
            .unwrap_or_else(|| self.data.clone());
        self.event_message(event_type, self.last_event_version.unwrap_or(1), data)
    }

    /// Build the event message for this snapshot with explicit event fields.
    pub(crate) fn event_message(&self, event_type: &str, event_version: u64, data: Payload) -> Message {
        let type_name = kebab(&self.entity_type);
        Message::builder(
            MessageKind::Event,
            format!("/{type_name}/{}", self.id),
            format!("{:020}", self.version),
            format!("{type_name}.{event_type}.v{event_version}"),
        )
        .time(self.updated_at)
        .author(self.updated_by.clone())
        .maybe_trigger(self.last_event_trigger.clone())
        .transaction(self.last_transaction.clone())
        .data(data)
        .build()
    }
}

/// Default event type for a snapshot without an explicit event.
pub(crate) fn default_event_type(status: EntityStatus, version: u64) -> &'static str {
    match (status, version) {
        (EntityStatus::Dead, _) => DELETED_EVENT,
        (EntityStatus::Alive, 1) => CREATED_EVENT,
        (EntityStatus::Alive, _) => UPDATED_EVENT,
    }
}

/// Kebab-case form of a domain type name, e.g. `PurchaseOrder` -> `purchase-order`.
pub(crate) fn kebab(type_name: &str) -> String {
    type_name.to_case(Case::Kebab)
}

/// Top-level keys of `old` missing from `new`, when both are JSON objects.
fn removed_keys(old: &Payload, new: &Payload) -> BTreeSet<String> {
    match (old.to_value(), new.to_value()) {
        (Ok(Value::Object(old)), Ok(Value::Object(new))) => old
            .keys()
            .filter(|key| !new.contains_key(*key))
            .cloned()
            .collect(),
        _ => BTreeSet::new(),
    }
}

/// Settings shared by every operation builder.
#[derive(Debug, Default)]
struct Options {
    event: Option<EventDescriptor>,
    time: Option<DateTime<Utc>>,
    joined: BTreeMap<String, String>,
    left: BTreeSet<String>,
}

impl Options {
    fn now(&self) -> DateTime<Utc> {
        self.time.unwrap_or_else(Utc::now)
    }

    fn join(&mut self, name: String, partition_key: String) {
        self.left.remove(&name);
        self.joined.insert(name, partition_key);
    }

    fn leave(&mut self, name: String) {
        self.joined.remove(&name);
        self.left.insert(name);
    }

    fn event_fields(&self) -> (Option<String>, Option<u64>, Option<Payload>) {
        match &self.event {
            Some(event) => (
                Some(event.event_type.clone()),
                Some(event.version),
                event.data.clone(),
            ),
            None => (None, None, None),
        }
    }
}

/// Builder returned by [`Entity::create`].
#[derive(Debug)]
pub struct Creation<'a> {
    ctx: &'a ExecutionContext,
    entity_type: String,
    id: Option<String>,
    data: Payload,
    options: Options,
}

impl Creation<'_> {
    /// Use a caller-chosen ID instead of a generated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Record an explicit event for this creation.
    ///
    /// # Arguments
    ///
    /// * `event_type` - Event name, e.g. `"placed"`.
    /// * `version` - Event schema version; `0` is treated as `1`.
    /// * `data` - Event payload; defaults to the entity data when `None`.
    pub fn with_event(mut self, event_type: impl Into<String>, version: u64, data: Option<Payload>) -> Self {
        self.options.event = Some(EventDescriptor::new(event_type, version, data));
        self
    }

    /// Pin the operation time instead of reading the clock.
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.options.time = Some(time);
        self
    }

    /// Make the new entity a member of a secondary index.
    pub fn with_index(mut self, name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        self.options.join(name.into(), partition_key.into());
        self
    }

    /// Produce the version-1 snapshot.
    pub fn execute(self) -> Entity {
        let now = self.options.now();
        let (last_event_type, last_event_version, last_event_data) = self.options.event_fields();
        Entity {
            id: self.id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
            entity_type: self.entity_type,
            version: 1,
            status: EntityStatus::Alive,
            data: self.data,
            created_at: now,
            created_by: self.ctx.actor().to_string(),
            updated_at: now,
            updated_by: self.ctx.actor().to_string(),
            last_transaction: self.ctx.transaction().to_string(),
            last_event_trigger: self.ctx.trigger().map(str::to_string),
            last_event_type,
            last_event_version,
            last_event_data,
            indexes: self.options.joined,
            retired_indexes: BTreeSet::new(),
            removed_fields: BTreeSet::new(),
        }
    }
}

/// Builder returned by [`Entity::mutate`].
#[derive(Debug)]
pub struct Mutation<'a> {
    base: &'a Entity,
    ctx: &'a ExecutionContext,
    data: Payload,
    options: Options,
}

impl Mutation<'_> {
    /// Record an explicit event for this mutation.
    ///
    /// `version` `0` is treated as `1`; `data` defaults to the new entity
    /// data when `None`.
    pub fn with_event(mut self, event_type: impl Into<String>, version: u64, data: Option<Payload>) -> Self {
        self.options.event = Some(EventDescriptor::new(event_type, version, data));
        self
    }

    /// Pin the operation time instead of reading the clock.
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.options.time = Some(time);
        self
    }

    /// Join a secondary index, or move to a new partition key within it.
    pub fn with_index(mut self, name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        self.options.join(name.into(), partition_key.into());
        self
    }

    /// Leave a secondary index.
    pub fn without_index(mut self, name: impl Into<String>) -> Self {
        self.options.leave(name.into());
        self
    }

    /// Produce the next snapshot.
    pub fn execute(self) -> Entity {
        let base = self.base;
        let now = self.options.now();
        let (last_event_type, last_event_version, last_event_data) = self.options.event_fields();

        let mut indexes = base.indexes.clone();
        indexes.retain(|name, _| !self.options.left.contains(name));
        indexes.extend(self.options.joined);
        let retired_indexes = base
            .indexes
            .keys()
            .filter(|name| !indexes.contains_key(*name))
            .cloned()
            .collect();
        let removed_fields = removed_keys(&base.data, &self.data);

        Entity {
            id: base.id.clone(),
            entity_type: base.entity_type.clone(),
            version: base.version.saturating_add(1),
            status: EntityStatus::Alive,
            data: self.data,
            created_at: base.created_at,
            created_by: base.created_by.clone(),
            updated_at: now,
            updated_by: self.ctx.actor().to_string(),
            last_transaction: self.ctx.transaction().to_string(),
            last_event_trigger: self.ctx.trigger().map(str::to_string),
            last_event_type,
            last_event_version,
            last_event_data,
            indexes,
            retired_indexes,
            removed_fields,
        }
    }
}

/// Builder returned by [`Entity::delete`].
#[derive(Debug)]
pub struct Deletion<'a> {
    base: &'a Entity,
    ctx: &'a ExecutionContext,
    options: Options,
}

impl Deletion<'_> {
    /// Record an explicit event for this deletion.
    ///
    /// `version` `0` is treated as `1`; `data` defaults to the entity data
    /// when `None`.
    pub fn with_event(mut self, event_type: impl Into<String>, version: u64, data: Option<Payload>) -> Self {
        self.options.event = Some(EventDescriptor::new(event_type, version, data));
        self
    }

    /// Pin the operation time instead of reading the clock.
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.options.time = Some(time);
        self
    }

    /// Produce the dead snapshot. Every index membership is retired.
    pub fn execute(self) -> Entity {
        let base = self.base;
        let now = self.options.now();
        let (last_event_type, last_event_version, last_event_data) = self.options.event_fields();
        Entity {
            id: base.id.clone(),
            entity_type: base.entity_type.clone(),
            version: base.version.saturating_add(1),
            status: EntityStatus::Dead,
            data: base.data.clone(),
            created_at: base.created_at,
            created_by: base.created_by.clone(),
            updated_at: now,
            updated_by: self.ctx.actor().to_string(),
            last_transaction: self.ctx.transaction().to_string(),
            last_event_trigger: self.ctx.trigger().map(str::to_string),
            last_event_type,
            last_event_version,
            last_event_data,
            indexes: BTreeMap::new(),
            retired_indexes: base.indexes.keys().cloned().collect(),
            removed_fields: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct PurchaseOrder {
        total: u64,
    }

    impl EntityState for PurchaseOrder {
        const TYPE_NAME: &'static str = "PurchaseOrder";
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("user-1", "tx-1").with_trigger("/orders/api/cmd-1")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn order(total: u64) -> Entity {
        Entity::create_state(&ctx(), &PurchaseOrder { total })
            .expect("serialize should succeed")
            .at(at(100))
            .execute()
    }

    #[test]
    fn creation_sets_audit_fields() {
        let entity = order(10);
        assert_eq!(entity.version(), 1);
        assert!(entity.is_alive());
        assert_eq!(entity.entity_type(), "PurchaseOrder");
        assert_eq!(entity.created_by(), "user-1");
        assert_eq!(entity.updated_by(), "user-1");
        assert_eq!(entity.created_at(), at(100));
        assert_eq!(entity.updated_at(), at(100));
        assert_eq!(entity.last_transaction(), "tx-1");
        assert_eq!(entity.last_event_trigger(), Some("/orders/api/cmd-1"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(order(1).id(), order(1).id());
    }

    #[test]
    fn mutations_increment_version() {
        let other = ExecutionContext::new("user-2", "tx-2");
        let mut entity = order(1);
        for total in 2..=5 {
            entity = entity
                .mutate_state(&other, &PurchaseOrder { total })
                .expect("serialize should succeed")
                .expect("alive entity should be mutable")
                .at(at(200))
                .execute();
        }
        assert_eq!(entity.version(), 5);
        assert_eq!(entity.created_by(), "user-1");
        assert_eq!(entity.created_at(), at(100));
        assert_eq!(entity.updated_by(), "user-2");
        assert_eq!(entity.updated_at(), at(200));
        assert_eq!(
            entity.decode_data::<PurchaseOrder>().expect("decode should succeed"),
            PurchaseOrder { total: 5 }
        );
    }

    #[test]
    fn dead_entity_is_frozen() {
        let dead = order(1).delete(&ctx()).expect("alive").execute();
        assert_eq!(dead.version(), 2);
        assert_eq!(dead.status(), EntityStatus::Dead);
        assert!(dead.mutate(&ctx(), Payload::empty_object()).is_none());
        assert!(dead.delete(&ctx()).is_none());
    }

    #[test]
    fn deletion_keeps_data_and_retires_indexes() {
        let entity = Entity::create(&ctx(), "Order", Payload::from_value(&json!({"a": 1})))
            .with_index("by-customer", "c-1")
            .execute();
        let dead = entity.delete(&ctx()).expect("alive").execute();
        assert_eq!(dead.data(), entity.data());
        assert!(dead.indexes().is_empty());
        assert!(dead.retired_indexes().contains("by-customer"));
    }

    #[test]
    fn mutation_carries_and_updates_indexes() {
        let entity = Entity::create(&ctx(), "Order", Payload::empty_object())
            .with_index("by-customer", "c-1")
            .with_index("by-region", "eu")
            .execute();
        let next = entity
            .mutate(&ctx(), Payload::empty_object())
            .expect("alive")
            .without_index("by-region")
            .with_index("by-status", "open")
            .execute();
        assert_eq!(next.indexes().get("by-customer").map(String::as_str), Some("c-1"));
        assert_eq!(next.indexes().get("by-status").map(String::as_str), Some("open"));
        assert!(!next.indexes().contains_key("by-region"));
        assert_eq!(next.retired_indexes().iter().collect::<Vec<_>>(), vec!["by-region"]);

        // Retirement is only relative to the immediate predecessor.
        let after = next.mutate(&ctx(), Payload::empty_object()).expect("alive").execute();
        assert!(after.retired_indexes().is_empty());
    }

    #[test]
    fn mutation_records_dropped_fields() {
        let entity = Entity::create(&ctx(), "Order", Payload::from_value(&json!({"a": 1, "b": 2}))).execute();
        let next = entity
            .mutate(&ctx(), Payload::from_value(&json!({"a": 3})))
            .expect("alive")
            .execute();
        assert_eq!(next.removed_fields().iter().collect::<Vec<_>>(), vec!["b"]);
        let dead = next.delete(&ctx()).expect("alive").execute();
        assert!(dead.removed_fields().is_empty());
    }

    #[test]
    fn last_event_defaults() {
        let created = order(1);
        let event = created.last_event();
        assert_eq!(event.kind(), MessageKind::Event);
        assert_eq!(event.source(), format!("/purchase-order/{}", created.id()));
        assert_eq!(event.id(), "00000000000000000001");
        assert_eq!(event.message_type(), "purchase-order.created.v1");
        assert_eq!(event.time(), at(100));
        assert_eq!(event.author(), "user-1");
        assert_eq!(event.trigger(), Some("/orders/api/cmd-1"));
        assert_eq!(event.transaction(), "tx-1");
        assert_eq!(event.content_type(), "application/json");
        assert_eq!(event.encoding_type(), "identity");
        assert_eq!(event.data(), created.data());

        let updated = created.mutate(&ctx(), Payload::empty_object()).expect("alive").execute();
        assert_eq!(updated.last_event().message_type(), "purchase-order.updated.v1");
        assert_eq!(updated.last_event().id(), "00000000000000000002");

        let deleted = updated.delete(&ctx()).expect("alive").execute();
        assert_eq!(deleted.last_event().message_type(), "purchase-order.deleted.v1");
    }

    #[test]
    fn explicit_event_overrides_defaults() {
        let data = Payload::from_value(&json!({"reason": "fraud"}));
        let entity = order(1)
            .delete(&ctx())
            .expect("alive")
            .with_event("cancelled", 2, Some(data.clone()))
            .execute();
        let event = entity.last_event();
        assert_eq!(event.message_type(), "purchase-order.cancelled.v2");
        assert_eq!(event.data(), &data);
    }

    #[test]
    fn event_version_zero_is_normalized() {
        let entity = Entity::create(&ctx(), "Order", Payload::empty_object())
            .with_event("placed", 0, None)
            .execute();
        assert_eq!(entity.last_event().message_type(), "order.placed.v1");
    }

    #[test]
    fn last_event_is_deterministic() {
        let entity = order(3);
        assert_eq!(entity.last_event(), entity.last_event());
    }

    #[test]
    fn status_parses_stored_names() {
        assert_eq!(EntityStatus::parse("alive").expect("valid"), EntityStatus::Alive);
        assert_eq!(EntityStatus::parse("dead").expect("valid"), EntityStatus::Dead);
        assert!(EntityStatus::parse("zombie").is_err());
    }
}
