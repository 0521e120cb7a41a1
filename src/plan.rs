//! Structured transactional write plans.
//!
//! A [`WritePlan`] is an ordered list of conditional puts and updates that
//! the store applies atomically: either every item's condition holds and
//! every item is written, or nothing is. Updates are described as
//! `(field, Set | Remove)` actions; turning them into a backend's native
//! expression syntax is the job of [`crate::expression`].

use crate::attribute::{AttributeValue, Item};
use crate::expression::{Expression, ExpressionEncoder};

/// A guard that must hold for a transaction item to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The named attribute is absent, i.e. the item does not exist yet.
    AttributeNotExists(String),
    /// The named attribute equals the given value.
    Equals(String, AttributeValue),
    /// Every inner condition holds.
    And(Vec<Condition>),
}

impl Condition {
    /// Holds when the item has no `field`, i.e. does not exist yet.
    pub fn not_exists(field: impl Into<String>) -> Self {
        Self::AttributeNotExists(field.into())
    }

    /// Holds when `field` equals `value`.
    pub fn equals(field: impl Into<String>, value: AttributeValue) -> Self {
        Self::Equals(field.into(), value)
    }

    /// Evaluate the condition against the current item, if any.
    pub fn holds(&self, current: Option<&Item>) -> bool {
        match self {
            Self::AttributeNotExists(field) => current.is_none_or(|item| !item.contains_key(field)),
            Self::Equals(field, value) => current
                .and_then(|item| item.get(field))
                .is_some_and(|actual| actual == value),
            Self::And(all) => all.iter().all(|condition| condition.holds(current)),
        }
    }
}

/// What an update does to one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Overwrite the attribute.
    Set(AttributeValue),
    /// Delete the attribute.
    Remove,
}

/// One `(field, op)` pair of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAction {
    /// Attribute the action applies to.
    pub field: String,
    /// What to do with it.
    pub op: UpdateOp,
}

impl UpdateAction {
    /// Set `field` to `value`.
    pub fn set(field: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            field: field.into(),
            op: UpdateOp::Set(value),
        }
    }

    /// Remove `field`.
    pub fn remove(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: UpdateOp::Remove,
        }
    }

    /// Apply the action to an item in place.
    pub fn apply(&self, item: &mut Item) {
        match &self.op {
            UpdateOp::Set(value) => {
                item.insert(self.field.clone(), value.clone());
            }
            UpdateOp::Remove => {
                item.remove(&self.field);
            }
        }
    }
}

/// A single element of a transactional write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactItem {
    /// Write a whole item.
    Put {
        table: String,
        item: Item,
        condition: Option<Condition>,
    },
    /// Modify selected attributes of an existing item.
    Update {
        table: String,
        key: Item,
        actions: Vec<UpdateAction>,
        condition: Option<Condition>,
    },
}

impl TransactItem {
    /// Target table name.
    pub fn table(&self) -> &str {
        match self {
            Self::Put { table, .. } | Self::Update { table, .. } => table,
        }
    }

    /// Guard that must hold for this item to apply.
    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Self::Put { condition, .. } | Self::Update { condition, .. } => condition.as_ref(),
        }
    }

    /// Render the update actions and condition in the backend's native
    /// expression syntax with generated placeholders.
    ///
    /// Puts only carry a condition expression.
    pub fn to_expression(&self) -> Expression {
        let mut encoder = ExpressionEncoder::default();
        match self {
            Self::Put { condition, .. } => {
                if let Some(condition) = condition {
                    encoder.condition(condition);
                }
            }
            Self::Update {
                actions, condition, ..
            } => {
                encoder.update(actions);
                if let Some(condition) = condition {
                    encoder.condition(condition);
                }
            }
        }
        encoder.finish()
    }
}

/// An ordered list of transaction items applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    items: Vec<TransactItem>,
}

impl WritePlan {
    /// An empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Its position is the index reported on conflict.
    pub fn push(&mut self, item: TransactItem) {
        self.items.push(item);
    }

    /// Items in submission order.
    pub fn items(&self) -> &[TransactItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the plan has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn not_exists_holds_for_missing_item() {
        let cond = Condition::not_exists("id");
        assert!(cond.holds(None));
        assert!(!cond.holds(Some(&item(&[("id", AttributeValue::s("a"))]))));
    }

    #[test]
    fn equals_requires_matching_value() {
        let cond = Condition::equals("version", AttributeValue::n(2));
        assert!(!cond.holds(None));
        assert!(cond.holds(Some(&item(&[("version", AttributeValue::n(2))]))));
        assert!(!cond.holds(Some(&item(&[("version", AttributeValue::n(3))]))));
    }

    #[test]
    fn and_requires_every_condition() {
        let cond = Condition::And(vec![
            Condition::equals("__status", AttributeValue::s("alive")),
            Condition::equals("version", AttributeValue::n(1)),
        ]);
        let current = item(&[
            ("__status", AttributeValue::s("alive")),
            ("version", AttributeValue::n(1)),
        ]);
        assert!(cond.holds(Some(&current)));
        let dead = item(&[
            ("__status", AttributeValue::s("dead")),
            ("version", AttributeValue::n(1)),
        ]);
        assert!(!cond.holds(Some(&dead)));
    }

    #[test]
    fn actions_apply_in_place() {
        let mut current = item(&[("a", AttributeValue::n(1)), ("b", AttributeValue::n(2))]);
        UpdateAction::set("a", AttributeValue::n(5)).apply(&mut current);
        UpdateAction::remove("b").apply(&mut current);
        assert_eq!(current, item(&[("a", AttributeValue::n(5))]));
    }
}
