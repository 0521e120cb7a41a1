//! Event-sourcing runtime for message-driven handlers.
//!
//! Domain state lives in versioned [`Entity`] snapshots. A handler decodes an
//! inbound [`Message`], reads entities through an [`EntityReader`], applies
//! create / mutate / delete operations under an [`ExecutionContext`], and
//! returns a [`Changeset`]. The [`ResultWriter`] commits the changeset to a
//! [`StateStore`] as one atomic conditional transaction, so concurrent or
//! redelivered work either applies completely or not at all.

mod attribute;
mod codec;
mod config;
mod context;
mod entity;
mod envelope;
mod error;
pub mod expression;
mod message;
mod payload;
mod plan;
mod reader;
mod runtime;
mod store;
mod writer;

pub use attribute::{AttributeValue, Item, item_to_json};
pub use codec::{from_store_item, to_store_item};
pub use config::RuntimeConfig;
pub use context::{ExecutionContext, UNKNOWN_ACTOR};
pub use entity::{Creation, Deletion, Entity, EntityState, EntityStatus, Mutation};
pub use envelope::{
    Encoded, MessageAttribute, PublishRequest, SourceFormat, TargetFormat, decode, encode,
    publish_request, store_item,
};
pub use error::{
    ConfigError, DecodeError, DispatchError, EncodeError, ReadError, StoreError, WriteError,
};
pub use message::{IDENTITY_ENCODING, Message, MessageBuilder, MessageKind};
pub use payload::{JSON_CONTENT_TYPE, Payload};
pub use plan::{Condition, TransactItem, UpdateAction, UpdateOp, WritePlan};
pub use reader::{DEFAULT_PAGE_SIZE, EntityPage, EntityReader, FindOptions};
pub use runtime::Runtime;
pub use store::{
    DEFAULT_KEY, MESSAGE_KEY, MemoryStore, Page, QueryRequest, StateStore, StoreFuture,
};
pub use writer::{Changeset, ResultWriter};

/// Stored attribute names of entities.
pub mod attributes {
    pub use crate::codec::{
        CREATED_AT, CREATED_BY, EVENT_DATA, EVENT_TRIGGER, EVENT_TYPE, EVENT_VERSION, ID, SPACE,
        STATUS, SYSTEM_ATTRIBUTES, TRANSACTION, TYPENAME, UPDATED_AT, UPDATED_BY, index_attribute,
        space,
    };
}
