//! Per-invocation execution context.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Actor used when a context is built without one.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Who is acting, what caused it, and which transaction it belongs to.
///
/// Built once at the top of handling an inbound message and passed by
/// reference into every entity operation, which copies the fields into the
/// audit and last-event fields of the snapshot it produces. The context is
/// never looked up implicitly.
///
/// # Examples
///
/// ```
/// use statefold::ExecutionContext;
///
/// let ctx = ExecutionContext::new("user-42", "tx-1")
///     .with_trigger("/orders/o-1/00000000000000000003");
///
/// assert_eq!(ctx.actor(), "user-42");
/// assert_eq!(ctx.transaction(), "tx-1");
/// assert_eq!(ctx.trigger(), Some("/orders/o-1/00000000000000000003"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    actor: String,
    trigger: Option<String>,
    transaction: String,
}

impl ExecutionContext {
    /// Create a context with no causal trigger.
    ///
    /// # Arguments
    ///
    /// * `actor` - Identity of whoever is acting (user ID, service name).
    /// * `transaction` - Correlation ID shared by everything caused by the
    ///   same root message.
    pub fn new(actor: impl Into<String>, transaction: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            trigger: None,
            transaction: transaction.into(),
        }
    }

    /// Start a fresh root transaction for `actor` with a random ID.
    ///
    /// Used for work that is not caused by an inbound message, such as a
    /// scheduled job or an API call that creates the first entity.
    pub fn root(actor: impl Into<String>) -> Self {
        Self::new(actor, uuid::Uuid::new_v4().to_string())
    }

    /// Derive the context for handling `msg`.
    ///
    /// The actor is the message author, the trigger is `source/id` of the
    /// message, and the transaction is carried over unchanged so the causal
    /// chain stays grouped.
    pub fn from_message(msg: &Message) -> Self {
        let actor = if msg.author().is_empty() {
            UNKNOWN_ACTOR.to_string()
        } else {
            msg.author().to_string()
        };
        Self {
            actor,
            trigger: Some(msg.reference()),
            transaction: msg.transaction().to_string(),
        }
    }

    /// Set the causal trigger reference.
    ///
    /// # Arguments
    ///
    /// * `trigger` - The `source/id` of the message being handled.
    ///
    /// # Returns
    ///
    /// The updated `ExecutionContext`.
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Identity of whoever is acting.
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// The `source/id` of the message that caused this work, if any.
    pub fn trigger(&self) -> Option<&str> {
        self.trigger.as_deref()
    }

    /// Correlation ID of the transaction this work belongs to.
    pub fn transaction(&self) -> &str {
        &self.transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MessageKind};
    use crate::payload::Payload;

    fn command(author: &str) -> Message {
        Message::builder(MessageKind::Command, "/orders/api", "cmd-7", "order.place.v1")
            .author(author)
            .transaction("tx-9")
            .data(Payload::empty_object())
            .build()
    }

    #[test]
    fn new_context_has_no_trigger() {
        let ctx = ExecutionContext::new("svc", "tx");
        assert_eq!(ctx.trigger(), None);
    }

    #[test]
    fn root_generates_distinct_transactions() {
        let a = ExecutionContext::root("svc");
        let b = ExecutionContext::root("svc");
        assert_ne!(a.transaction(), b.transaction());
        assert_eq!(a.actor(), "svc");
    }

    #[test]
    fn from_message_links_causality() {
        let ctx = ExecutionContext::from_message(&command("user-1"));
        assert_eq!(ctx.actor(), "user-1");
        assert_eq!(ctx.trigger(), Some("/orders/api/cmd-7"));
        assert_eq!(ctx.transaction(), "tx-9");
    }

    #[test]
    fn from_message_without_author_uses_unknown() {
        let ctx = ExecutionContext::from_message(&command(""));
        assert_eq!(ctx.actor(), UNKNOWN_ACTOR);
    }

    #[test]
    fn context_serde_roundtrip() {
        let ctx = ExecutionContext::new("a", "t").with_trigger("/s/1");
        let json = serde_json::to_string(&ctx).expect("serialization should succeed");
        let back: ExecutionContext =
            serde_json::from_str(&json).expect("deserialization should succeed");
        assert_eq!(back, ctx);
    }
}
