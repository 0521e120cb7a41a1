//! Canonical in-memory representation of commands and events.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::DecodeError;
use crate::payload::Payload;

/// Encoding type for payloads that are not compressed or otherwise wrapped.
pub const IDENTITY_ENCODING: &str = "identity";

/// Whether a message records a fact or requests a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A completed state transition.
    Event,
    /// A request for a state transition.
    Command,
}

impl MessageKind {
    /// Wire name: `event` or `command`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Command => "command",
        }
    }

    /// Parse the wire name.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidField`] for anything other than
    /// `event` or `command`.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        match raw {
            "event" => Ok(Self::Event),
            "command" => Ok(Self::Command),
            other => Err(DecodeError::invalid(
                "kind",
                format!("expected `event` or `command`, got `{other}`"),
            )),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport-agnostic command or event.
///
/// `(source, id)` is the idempotency key: the writer refuses to insert a
/// second message with the same pair, so redelivered messages are safe.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    source: String,
    id: String,
    kind: MessageKind,
    message_type: String,
    time: DateTime<Utc>,
    encoding_type: String,
    data: Payload,
    author: String,
    trigger: Option<String>,
    transaction: String,
}

impl Message {
    /// Start building a message with its identity fields.
    ///
    /// # Arguments
    ///
    /// * `kind` - Event or command.
    /// * `source` - Origin path, e.g. `/orders/o-1`.
    /// * `id` - Deduplication key, unique within `source`.
    /// * `message_type` - Versioned type tag, e.g. `order.placed.v1`.
    pub fn builder(
        kind: MessageKind,
        source: impl Into<String>,
        id: impl Into<String>,
        message_type: impl Into<String>,
    ) -> MessageBuilder {
        MessageBuilder {
            source: source.into(),
            id: id.into(),
            kind,
            message_type: message_type.into(),
            time: None,
            encoding_type: IDENTITY_ENCODING.to_string(),
            data: Payload::empty_object(),
            author: String::new(),
            trigger: None,
            transaction: String::new(),
        }
    }

    /// Build a command caused by the work described in `ctx`.
    ///
    /// Author, trigger, and transaction are taken from the context so the
    /// command joins the causal chain of the message being handled.
    pub fn command(
        ctx: &ExecutionContext,
        source: impl Into<String>,
        id: impl Into<String>,
        message_type: impl Into<String>,
        data: Payload,
    ) -> Self {
        Self::builder(MessageKind::Command, source, id, message_type)
            .context(ctx)
            .data(data)
            .build()
    }

    /// Origin path identifier.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Deduplication key, unique within [`source`](Self::source).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event or command.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Versioned type tag.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// When the message was produced.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Content type of [`data`](Self::data).
    pub fn content_type(&self) -> &str {
        self.data.content_type()
    }

    /// Transfer encoding of the payload, usually `identity`.
    pub fn encoding_type(&self) -> &str {
        &self.encoding_type
    }

    /// The message payload.
    pub fn data(&self) -> &Payload {
        &self.data
    }

    /// Who produced the message.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// `source/id` of the message that caused this one, if any.
    pub fn trigger(&self) -> Option<&str> {
        self.trigger.as_deref()
    }

    /// Correlation ID shared by everything caused by one root message.
    pub fn transaction(&self) -> &str {
        &self.transaction
    }

    /// The `source/id` reference used as a trigger by downstream work.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.source, self.id)
    }
}

/// Builder for [`Message`]. Created by [`Message::builder`].
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    source: String,
    id: String,
    kind: MessageKind,
    message_type: String,
    time: Option<DateTime<Utc>>,
    encoding_type: String,
    data: Payload,
    author: String,
    trigger: Option<String>,
    transaction: String,
}

impl MessageBuilder {
    /// Set the production time. Defaults to now.
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the payload. Defaults to an empty JSON object.
    pub fn data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    /// Set the payload transfer encoding. Defaults to `identity`.
    pub fn encoding_type(mut self, encoding_type: impl Into<String>) -> Self {
        self.encoding_type = encoding_type.into();
        self
    }

    /// Set the author.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set the causal trigger reference.
    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Set the optional causal trigger reference.
    pub fn maybe_trigger(mut self, trigger: Option<String>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Set the transaction correlation ID.
    pub fn transaction(mut self, transaction: impl Into<String>) -> Self {
        self.transaction = transaction.into();
        self
    }

    /// Copy author, trigger, and transaction from an execution context.
    pub fn context(mut self, ctx: &ExecutionContext) -> Self {
        self.author = ctx.actor().to_string();
        self.trigger = ctx.trigger().map(str::to_string);
        self.transaction = ctx.transaction().to_string();
        self
    }

    /// Finish building the message.
    pub fn build(self) -> Message {
        Message {
            source: self.source,
            id: self.id,
            kind: self.kind,
            message_type: self.message_type,
            time: self.time.unwrap_or_else(Utc::now),
            encoding_type: self.encoding_type,
            data: self.data,
            author: self.author,
            trigger: self.trigger,
            transaction: self.transaction,
        }
    }
}

/// Format a timestamp as RFC 3339 in UTC, keeping sub-second precision.
pub(crate) fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with any offset, and offset-less date-times which are
/// taken as UTC.
pub(crate) fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(time) => Ok(time.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| DecodeError::InvalidTimestamp {
                field: field.to_string(),
                source: rfc_err,
            }),
    }
}
