//! Crate-level error types for decoding, encoding, storage, and dispatch.

/// Error returned when an inbound payload or stored item is malformed.
///
/// Decode errors are never retryable: the same input will fail the same
/// way on every delivery, so callers should treat the message as poison.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A required field or attribute is absent.
    #[error("required field `{0}` not found")]
    MissingField(String),

    /// A field is present but has the wrong shape or type.
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A timestamp field could not be parsed as ISO-8601.
    #[error("field `{field}` is not a valid ISO-8601 timestamp: {source}")]
    InvalidTimestamp {
        /// Name of the offending field.
        field: String,
        /// Underlying parse failure.
        source: chrono::ParseError,
    },

    /// The raw payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The record describes an operation the runtime refuses to process.
    #[error("unsupported record: {0}")]
    Unsupported(String),
}

impl DecodeError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error returned when a value cannot be turned into its wire form.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A domain data field uses a name reserved for system attributes.
    #[error("data field `{0}` collides with a reserved attribute name")]
    ReservedField(String),

    /// Entity data must be a JSON object to be flattened into an item.
    #[error("entity data must be a JSON object (content type `{content_type}`)")]
    DataNotObject {
        /// Content type of the rejected payload.
        content_type: String,
    },

    /// A payload that is stored as structured attributes is not JSON.
    #[error("`{field}` must be JSON to be stored (content type `{content_type}`)")]
    NotJson {
        /// Which attribute the payload was destined for.
        field: String,
        /// Content type of the rejected payload.
        content_type: String,
    },

    /// A payload could not be serialized or parsed as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error reported by a [`StateStore`](crate::StateStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conditional guard failed; the whole transaction was cancelled.
    ///
    /// `index` is the position of the first failing item in the plan.
    #[error("transaction cancelled: condition failed on item {index}")]
    ConditionFailed {
        /// Position of the failing item within the submitted plan.
        index: usize,
    },

    /// The store could not be reached or throttled the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the request as malformed.
    #[error("invalid store request: {0}")]
    InvalidRequest(String),
}

/// Error returned by [`ResultWriter::write`](crate::ResultWriter::write).
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// An entity or message could not be encoded into a store item.
    #[error("cannot encode {target}: {source}")]
    Encode {
        /// Which entity or message failed, e.g. `entity Order/01H...`.
        target: String,
        /// Underlying encoding failure.
        source: EncodeError,
    },

    /// Optimistic concurrency conflict or duplicate insert.
    ///
    /// Nothing from the transaction was applied. Re-read the affected
    /// entities and redo the whole unit of work.
    #[error("optimistic concurrency conflict on {target}")]
    Conflict {
        /// Which entity or message failed its guard.
        target: String,
    },

    /// Transport or infrastructure failure; retry with backoff.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl WriteError {
    /// Returns `true` if the error is an optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Error returned when reading entities from the store fails.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The store call itself failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored item could not be decoded into an entity.
    #[error("cannot decode stored entity: {0}")]
    Decode(#[from] DecodeError),
}

/// Error returned when loading [`RuntimeConfig`](crate::RuntimeConfig) fails.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),
}

/// Error returned when dispatching one inbound record to a handler fails.
///
/// Generic over `E`, the handler's own error type.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError<E: std::error::Error + Send + Sync + 'static> {
    /// The inbound record could not be decoded (poison message).
    #[error("cannot decode inbound record: {0}")]
    Decode(#[from] DecodeError),

    /// The handler rejected the message.
    #[error("handler failed: {0}")]
    Handler(#[source] E),

    /// The handler's changeset could not be committed.
    #[error("cannot write handler result: {0}")]
    Write(#[from] WriteError),
}
