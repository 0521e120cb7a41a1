//! Per-record handler dispatch.
//!
//! [`Runtime::dispatch`] is the whole life of one inbound record: decode it,
//! derive the [`ExecutionContext`], run the handler, and commit the
//! handler's [`Changeset`] in one transaction.

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

use crate::config::RuntimeConfig;
use crate::context::ExecutionContext;
use crate::envelope::{SourceFormat, decode};
use crate::error::DispatchError;
use crate::message::Message;
use crate::reader::EntityReader;
use crate::store::StateStore;
use crate::writer::{Changeset, ResultWriter};

/// Reader, writer, and configuration for one deployed handler.
///
/// `Clone` is cheap; clones share the store.
#[derive(Debug, Clone)]
pub struct Runtime {
    config: RuntimeConfig,
    reader: EntityReader,
    writer: ResultWriter,
}

impl Runtime {
    /// Wire a runtime to `store` using the tables named by `config`.
    pub fn new(store: Arc<dyn StateStore>, config: RuntimeConfig) -> Self {
        Self {
            reader: EntityReader::new(Arc::clone(&store), config.state_store()),
            writer: ResultWriter::from_config(store, &config),
            config,
        }
    }

    /// Names this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Reader over this domain's state store.
    pub fn reader(&self) -> &EntityReader {
        &self.reader
    }

    /// Writer committing to this domain's stores.
    pub fn writer(&self) -> &ResultWriter {
        &self.writer
    }

    /// Decode `raw`, run `handler`, and write its changeset atomically.
    ///
    /// The handler receives the decoded message and the context derived
    /// from it, and returns everything it wants committed. Entities should
    /// be read through [`reader`](Self::reader) (clone it into the handler).
    ///
    /// # Returns
    ///
    /// The committed changeset, so callers can publish
    /// [`Entity::last_event`](crate::Entity::last_event) of each entity.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::Decode`] if the record is malformed (poison).
    /// * [`DispatchError::Handler`] if the handler fails; nothing is written.
    /// * [`DispatchError::Write`] if the commit fails. A
    ///   [`WriteError::Conflict`](crate::WriteError::Conflict) means the
    ///   whole record should be dispatched again.
    pub async fn dispatch<F, Fut, E>(
        &self,
        raw: &[u8],
        format: SourceFormat,
        handler: F,
    ) -> Result<Changeset, DispatchError<E>>
    where
        F: FnOnce(Message, ExecutionContext) -> Fut,
        Fut: Future<Output = Result<Changeset, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let span = tracing::info_span!(
            "dispatch",
            app = %self.config.app_name,
            domain = %self.config.domain_name,
            handler = %self.config.handler_name,
            ?format,
        );
        async move {
            let message = decode(raw, format).inspect_err(|e| {
                tracing::error!(error = %e, "cannot decode inbound record");
            })?;
            let ctx = ExecutionContext::from_message(&message);
            tracing::info!(
                transaction = %message.transaction(),
                source = %message.source(),
                id = %message.id(),
                message_type = %message.message_type(),
                "message received"
            );

            let transaction = message.transaction().to_string();
            let changeset = handler(message, ctx).await.map_err(|e| {
                tracing::warn!(transaction = %transaction, error = %e, "handler failed");
                DispatchError::Handler(e)
            })?;

            self.writer.write(&changeset).await?;
            tracing::info!(
                transaction = %transaction,
                entities = changeset.entities().len(),
                commands = changeset.commands().len(),
                "handler result committed"
            );
            Ok::<_, DispatchError<E>>(changeset)
        }
        .instrument(span)
        .await
    }
}
