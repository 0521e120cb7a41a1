//! Conditional-update expression encoding.
//!
//! Attribute names and values never appear inline in an expression. Each
//! distinct attribute name gets a `#nN` placeholder and each value a fresh
//! `:vN` placeholder from a per-expression counter, so user field names
//! such as `__by-customer-pk` or reserved words cannot collide or break the
//! syntax.

use std::collections::BTreeMap;

use crate::attribute::AttributeValue;
use crate::plan::{Condition, UpdateAction, UpdateOp};

/// A rendered update and/or condition with its placeholder tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    /// `SET ... REMOVE ...` clause, if the item is an update.
    pub update: Option<String>,
    /// Condition clause, if the item is guarded.
    pub condition: Option<String>,
    /// Name placeholder to attribute name.
    pub names: BTreeMap<String, String>,
    /// Value placeholder to attribute value.
    pub values: BTreeMap<String, AttributeValue>,
}

/// Builds one [`Expression`], handing out placeholders as it goes.
#[derive(Debug, Default)]
pub struct ExpressionEncoder {
    by_name: BTreeMap<String, String>,
    expression: Expression,
}

impl ExpressionEncoder {
    /// Placeholder for an attribute name; repeated names share one.
    pub fn name(&mut self, field: &str) -> String {
        if let Some(placeholder) = self.by_name.get(field) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.by_name.len());
        self.by_name.insert(field.to_string(), placeholder.clone());
        self.expression
            .names
            .insert(placeholder.clone(), field.to_string());
        placeholder
    }

    /// Fresh placeholder for a value.
    pub fn value(&mut self, value: &AttributeValue) -> String {
        let placeholder = format!(":v{}", self.expression.values.len());
        self.expression
            .values
            .insert(placeholder.clone(), value.clone());
        placeholder
    }

    /// Render update actions as `SET a = b, ... REMOVE c, ...`.
    pub fn update(&mut self, actions: &[UpdateAction]) {
        let mut sets = Vec::new();
        let mut removes = Vec::new();
        for action in actions {
            let name = self.name(&action.field);
            match &action.op {
                UpdateOp::Set(value) => {
                    let value = self.value(value);
                    sets.push(format!("{name} = {value}"));
                }
                UpdateOp::Remove => removes.push(name),
            }
        }

        let mut clauses = Vec::new();
        if !sets.is_empty() {
            clauses.push(format!("SET {}", sets.join(", ")));
        }
        if !removes.is_empty() {
            clauses.push(format!("REMOVE {}", removes.join(", ")));
        }
        if !clauses.is_empty() {
            self.expression.update = Some(clauses.join(" "));
        }
    }

    /// Render a condition.
    pub fn condition(&mut self, condition: &Condition) {
        let rendered = self.render(condition);
        self.expression.condition = Some(rendered);
    }

    fn render(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::AttributeNotExists(field) => {
                format!("attribute_not_exists({})", self.name(field))
            }
            Condition::Equals(field, value) => {
                let name = self.name(field);
                format!("{name} = {}", self.value(value))
            }
            Condition::And(all) => {
                let parts: Vec<String> = all
                    .iter()
                    .map(|inner| match inner {
                        Condition::And(_) => format!("({})", self.render(inner)),
                        _ => self.render(inner),
                    })
                    .collect();
                parts.join(" AND ")
            }
        }
    }

    /// The rendered expression with its placeholder tables.
    pub fn finish(self) -> Expression {
        self.expression
    }
}
