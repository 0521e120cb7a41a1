//! Atomic commit of a handler's changeset.
//!
//! [`ResultWriter`] turns every entity snapshot and command of a
//! [`Changeset`] into one conditional [`WritePlan`] and submits it as a
//! single transaction. Guards enforce optimistic concurrency:
//!
//! - version 1 snapshots are inserts that fail if the ID already exists;
//! - later snapshots are updates that fail unless the stored entity is
//!   alive and exactly one version behind;
//! - commands are inserts keyed by `(source, id)`, so redelivered work
//!   cannot write the same command twice.
//!
//! If any guard fails the store applies nothing and the writer reports a
//! [`WriteError::Conflict`] naming the offending entity or command.

use std::sync::Arc;

use crate::attribute::{AttributeValue, Item};
use crate::codec;
use crate::config::RuntimeConfig;
use crate::entity::{Entity, EntityStatus};
use crate::envelope;
use crate::error::{StoreError, WriteError};
use crate::message::Message;
use crate::plan::{Condition, TransactItem, UpdateAction, WritePlan};
use crate::store::StateStore;

/// Attributes never touched by a diff update.
const DIFF_EXCLUDED: [&str; 7] = [
    codec::TYPENAME,
    codec::ID,
    codec::VERSION,
    codec::STATUS,
    codec::SPACE,
    codec::CREATED_AT,
    codec::CREATED_BY,
];

/// Attributes a deletion rewrites.
const DELETION_FIELDS: [&str; 10] = [
    codec::VERSION,
    codec::UPDATED_AT,
    codec::UPDATED_BY,
    codec::STATUS,
    codec::SPACE,
    codec::TRANSACTION,
    codec::EVENT_TRIGGER,
    codec::EVENT_TYPE,
    codec::EVENT_VERSION,
    codec::EVENT_DATA,
];

/// The entities and commands one unit of work produced.
///
/// # Examples
///
/// ```
/// use statefold::{Changeset, Entity, ExecutionContext, Payload};
///
/// let ctx = ExecutionContext::new("user-1", "tx-1");
/// let order = Entity::create(&ctx, "Order", Payload::empty_object()).execute();
///
/// let mut changeset = Changeset::new();
/// changeset.add_entity(order);
/// assert_eq!(changeset.entities().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    entities: Vec<Entity>,
    commands: Vec<Message>,
}

impl Changeset {
    /// An empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entity snapshot.
    pub fn add_entity(&mut self, entity: Entity) -> &mut Self {
        self.entities.push(entity);
        self
    }

    /// Add several entity snapshots.
    pub fn add_entities(&mut self, entities: impl IntoIterator<Item = Entity>) -> &mut Self {
        self.entities.extend(entities);
        self
    }

    /// Add one outgoing command.
    pub fn add_command(&mut self, command: Message) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Add several outgoing commands.
    pub fn add_commands(&mut self, commands: impl IntoIterator<Item = Message>) -> &mut Self {
        self.commands.extend(commands);
        self
    }

    /// Entity snapshots in insertion order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Commands in insertion order.
    pub fn commands(&self) -> &[Message] {
        &self.commands
    }

    /// Returns `true` if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.commands.is_empty()
    }
}

/// Commits changesets to the state and command stores.
#[derive(Clone)]
pub struct ResultWriter {
    store: Arc<dyn StateStore>,
    state_table: String,
    command_table: String,
}

impl std::fmt::Debug for ResultWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultWriter")
            .field("state_table", &self.state_table)
            .field("command_table", &self.command_table)
            .finish()
    }
}

impl ResultWriter {
    /// Create a writer with explicit table names.
    pub fn new(
        store: Arc<dyn StateStore>,
        state_table: impl Into<String>,
        command_table: impl Into<String>,
    ) -> Self {
        Self {
            store,
            state_table: state_table.into(),
            command_table: command_table.into(),
        }
    }

    /// Create a writer using the table names derived from `config`.
    pub fn from_config(store: Arc<dyn StateStore>, config: &RuntimeConfig) -> Self {
        Self::new(store, config.state_store(), config.command_store())
    }

    /// Build the transaction plan for `changeset` without submitting it.
    ///
    /// Entities come first in changeset order, then commands.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Encode`] if an entity or command cannot be
    /// encoded.
    pub fn plan(&self, changeset: &Changeset) -> Result<WritePlan, WriteError> {
        let mut plan = WritePlan::new();
        for entity in changeset.entities() {
            plan.push(self.entity_item(entity)?);
        }
        for command in changeset.commands() {
            plan.push(self.command_item(command)?);
        }
        Ok(plan)
    }

    /// Write the whole changeset in one atomic transaction.
    ///
    /// An empty changeset is a no-op.
    ///
    /// # Errors
    ///
    /// * [`WriteError::Encode`] if something cannot be encoded; nothing is
    ///   submitted.
    /// * [`WriteError::Conflict`] if a guard failed; nothing was written.
    ///   Re-read the entities and redo the unit of work.
    /// * [`WriteError::Store`] for transport failures.
    pub async fn write(&self, changeset: &Changeset) -> Result<(), WriteError> {
        if changeset.is_empty() {
            tracing::debug!("empty changeset, nothing to write");
            return Ok(());
        }
        let plan = self.plan(changeset)?;
        for entry in plan.items() {
            tracing::trace!(
                table = %entry.table(),
                expression = ?entry.to_expression(),
                "planned transaction item"
            );
        }

        match self.store.transact_write(&plan).await {
            Ok(()) => {
                tracing::info!(
                    entities = changeset.entities().len(),
                    commands = changeset.commands().len(),
                    "changeset written"
                );
                Ok(())
            }
            Err(StoreError::ConditionFailed { index }) => {
                let target = target_label(changeset, index);
                tracing::warn!(conflict = %target, "optimistic concurrency conflict");
                Err(WriteError::Conflict { target })
            }
            Err(e) => Err(WriteError::Store(e)),
        }
    }

    fn entity_item(&self, entity: &Entity) -> Result<TransactItem, WriteError> {
        let item = codec::to_store_item(entity).map_err(|source| WriteError::Encode {
            target: entity_label(entity),
            source,
        })?;

        if entity.version() == 1 {
            return Ok(TransactItem::Put {
                table: self.state_table.clone(),
                item: item.into_iter().filter(|(_, v)| !v.is_null()).collect(),
                condition: Some(Condition::not_exists(codec::ID)),
            });
        }

        let actions = match entity.status() {
            EntityStatus::Dead => deletion_actions(entity, &item),
            EntityStatus::Alive => diff_actions(entity, &item),
        };
        Ok(TransactItem::Update {
            table: self.state_table.clone(),
            key: Item::from([(codec::ID.to_string(), AttributeValue::s(entity.id()))]),
            actions,
            condition: Some(Condition::And(vec![
                Condition::equals(codec::STATUS, AttributeValue::s(EntityStatus::Alive.as_str())),
                Condition::equals(
                    codec::VERSION,
                    AttributeValue::n(entity.version().saturating_sub(1)),
                ),
            ])),
        })
    }

    fn command_item(&self, command: &Message) -> Result<TransactItem, WriteError> {
        let item = envelope::store_item(command).map_err(|source| WriteError::Encode {
            target: message_label(command),
            source,
        })?;
        Ok(TransactItem::Put {
            table: self.command_table.clone(),
            item: item.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            condition: Some(Condition::not_exists(envelope::ID)),
        })
    }
}

fn set_or_remove(name: &str, value: &AttributeValue) -> UpdateAction {
    if value.is_null() {
        UpdateAction::remove(name)
    } else {
        UpdateAction::set(name, value.clone())
    }
}

fn deletion_actions(entity: &Entity, item: &Item) -> Vec<UpdateAction> {
    let mut actions: Vec<UpdateAction> = DELETION_FIELDS
        .iter()
        .filter_map(|name| item.get(*name).map(|value| set_or_remove(name, value)))
        .collect();
    actions.extend(
        entity
            .retired_indexes()
            .iter()
            .map(|index| UpdateAction::remove(codec::index_attribute(index))),
    );
    actions
}

fn diff_actions(entity: &Entity, item: &Item) -> Vec<UpdateAction> {
    let mut actions: Vec<UpdateAction> = item
        .iter()
        .filter(|(name, _)| !DIFF_EXCLUDED.contains(&name.as_str()))
        .map(|(name, value)| set_or_remove(name, value))
        .collect();
    actions.push(UpdateAction::set(codec::VERSION, AttributeValue::n(entity.version())));
    actions
}

fn entity_label(entity: &Entity) -> String {
    format!("entity {}/{}", entity.entity_type(), entity.id())
}

fn message_label(message: &Message) -> String {
    format!("message {}", message.reference())
}

/// Label the plan item at `index` for error reporting.
fn target_label(changeset: &Changeset, index: usize) -> String {
    let entities = changeset.entities();
    match entities.get(index) {
        Some(entity) => entity_label(entity),
        None => changeset
            .commands()
            .get(index - entities.len())
            .map(message_label)
            .unwrap_or_else(|| format!("transaction item {index}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::plan::UpdateOp;
    use crate::payload::Payload;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn writer() -> ResultWriter {
        ResultWriter::new(Arc::new(MemoryStore::new()), "state", "commands")
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("user-1", "tx-1")
    }

    fn order() -> Entity {
        Entity::create(&ctx(), "Order", Payload::from_value(&json!({"total": 1, "note": "x"})))
            .with_index("by-customer", "c-1")
            .execute()
    }

    fn plan_for(entity: Entity) -> TransactItem {
        let mut changeset = Changeset::new();
        changeset.add_entity(entity);
        let plan = writer().plan(&changeset).expect("plan should build");
        plan.items()[0].clone()
    }

    fn fields(actions: &[UpdateAction]) -> Vec<(&str, bool)> {
        actions
            .iter()
            .map(|a| (a.field.as_str(), matches!(a.op, UpdateOp::Set(_))))
            .collect()
    }

    #[test]
    fn creation_is_guarded_put_without_nulls() {
        let TransactItem::Put { table, item, condition } = plan_for(order()) else {
            panic!("expected a put");
        };
        assert_eq!(table, "state");
        assert!(item.values().all(|v| !v.is_null()));
        assert!(!item.contains_key(codec::EVENT_TYPE));
        assert_eq!(condition, Some(Condition::not_exists("id")));
    }

    #[test]
    fn mutation_is_diff_update() {
        let next = order()
            .mutate(&ctx(), Payload::from_value(&json!({"total": 2, "note": null})))
            .expect("alive")
            .without_index("by-customer")
            .execute();
        let TransactItem::Update { key, actions, condition, .. } = plan_for(next) else {
            panic!("expected an update");
        };
        assert_eq!(key[codec::ID].as_str().map(str::len), Some(36));

        let fields = fields(&actions);
        assert!(fields.contains(&("total", true)));
        assert!(fields.contains(&("note", false)));
        assert!(fields.contains(&("__by-customer-pk", false)));
        assert!(fields.contains(&(codec::UPDATED_AT, true)));
        assert!(fields.contains(&(codec::EVENT_TYPE, false)));
        assert_eq!(fields.last(), Some(&(codec::VERSION, true)));
        for excluded in [codec::TYPENAME, codec::STATUS, codec::SPACE, codec::CREATED_AT, codec::CREATED_BY] {
            assert!(fields.iter().all(|(name, _)| *name != excluded), "{excluded} must not be diffed");
        }
        assert_eq!(
            condition,
            Some(Condition::And(vec![
                Condition::equals("__status", AttributeValue::s("alive")),
                Condition::equals("version", AttributeValue::n(1)),
            ]))
        );
    }

    #[test]
    fn deletion_touches_only_lifecycle_fields() {
        let dead = order().delete(&ctx()).expect("alive").execute();
        let TransactItem::Update { actions, .. } = plan_for(dead) else {
            panic!("expected an update");
        };
        let fields = fields(&actions);
        assert!(fields.contains(&(codec::STATUS, true)));
        assert!(fields.contains(&(codec::SPACE, true)));
        assert!(fields.contains(&(codec::VERSION, true)));
        assert!(fields.contains(&(codec::EVENT_DATA, false)));
        assert!(fields.contains(&("__by-customer-pk", false)));
        assert!(fields.iter().all(|(name, _)| *name != "total"));
    }

    #[test]
    fn commands_target_the_command_store() {
        let mut changeset = Changeset::new();
        changeset.add_command(Message::command(
            &ctx(),
            "/billing",
            "inv-1",
            "invoice.issue.v1",
            Payload::empty_object(),
        ));
        let plan = writer().plan(&changeset).expect("plan should build");
        assert_eq!(plan.items()[0].table(), "commands");
        assert_eq!(plan.items()[0].condition(), Some(&Condition::not_exists("id")));
    }

    #[test]
    fn command_puts_carry_no_null_markers() {
        let mut changeset = Changeset::new();
        changeset.add_command(Message::command(
            &ctx(),
            "/billing",
            "inv-1",
            "invoice.issue.v1",
            Payload::empty_object(),
        ));
        let plan = writer().plan(&changeset).expect("plan should build");
        let TransactItem::Put { item, .. } = &plan.items()[0] else {
            panic!("expected a put");
        };
        assert!(item.values().all(|v| !v.is_null()));
        assert!(!item.contains_key(envelope::TRIGGER));
    }

    #[test]
    fn encode_errors_name_the_entity() {
        let bad = Entity::create(&ctx(), "Order", Payload::from_value(&json!({"version": 9}))).execute();
        let mut changeset = Changeset::new();
        changeset.add_entity(bad.clone());
        let err = writer().plan(&changeset).expect_err("reserved field must fail");
        assert!(err.to_string().contains(&format!("entity Order/{}", bad.id())));
    }

    #[test]
    fn conflict_labels_point_past_entities() {
        let mut changeset = Changeset::new();
        changeset.add_entity(order());
        changeset.add_command(Message::command(&ctx(), "/b", "1", "b.c.v1", Payload::empty_object()));
        assert!(target_label(&changeset, 0).starts_with("entity Order/"));
        assert_eq!(target_label(&changeset, 1), "message /b/1");
    }
}
