//! Entity lookups against the state store.

use std::sync::Arc;

use crate::attribute::{AttributeValue, Item};
use crate::codec;
use crate::entity::{Entity, EntityStatus};
use crate::error::ReadError;
use crate::store::{QueryRequest, StateStore};

/// Page size used when a query does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Paging options for [`EntityReader::find_by`] and [`EntityReader::find_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Maximum entities per page; `None` or `0` means [`DEFAULT_PAGE_SIZE`].
    pub limit: Option<usize>,
    /// Continuation token from a previous [`EntityPage::next`].
    pub next: Option<String>,
}

impl FindOptions {
    /// Set the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Continue from a previous [`EntityPage::next`].
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    fn limit(&self) -> usize {
        self.limit.filter(|limit| *limit > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

/// One page of entities, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPage {
    /// Entities of this page, newest first.
    pub entities: Vec<Entity>,
    /// Pass back through [`FindOptions::with_next`] to fetch the next page.
    pub next: Option<String>,
}

/// Reads entity snapshots from one state-store table.
///
/// `Clone` is cheap; the store handle is shared.
#[derive(Clone)]
pub struct EntityReader {
    store: Arc<dyn StateStore>,
    table: String,
}

impl std::fmt::Debug for EntityReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityReader")
            .field("table", &self.table)
            .finish()
    }
}

impl EntityReader {
    /// Create a reader over `table`, usually [`RuntimeConfig::state_store`](crate::RuntimeConfig::state_store).
    pub fn new(store: Arc<dyn StateStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Load one entity by ID.
    ///
    /// Returns `Ok(None)` if no item has that ID or the stored item is of a
    /// different type. Dead entities are returned as-is.
    ///
    /// # Errors
    ///
    /// * [`ReadError::Store`] if the store call fails.
    /// * [`ReadError::Decode`] if the stored item is not a valid entity.
    pub async fn find_one(&self, entity_type: &str, id: &str) -> Result<Option<Entity>, ReadError> {
        let key = Item::from([(codec::ID.to_string(), AttributeValue::s(id))]);
        let Some(item) = self.store.get_item(&self.table, &key).await? else {
            return Ok(None);
        };
        let entity = codec::from_store_item(&item)?;
        if entity.entity_type() != entity_type {
            tracing::debug!(
                id = %id,
                expected = %entity_type,
                found = %entity.entity_type(),
                "entity type mismatch"
            );
            return Ok(None);
        }
        Ok(Some(entity))
    }

    /// List entities of `entity_type` that belong to a secondary index
    /// partition.
    ///
    /// # Errors
    ///
    /// Same as [`find_one`](Self::find_one).
    pub async fn find_by(
        &self,
        entity_type: &str,
        index: &str,
        partition_key: &str,
        options: &FindOptions,
    ) -> Result<EntityPage, ReadError> {
        let request = QueryRequest {
            key_attribute: codec::index_attribute(index),
            key_value: partition_key.to_string(),
            filter: Some((codec::TYPENAME.to_string(), AttributeValue::s(entity_type))),
            limit: options.limit(),
            start_after: options.next.clone(),
        };
        self.run(&request).await
    }

    /// List every alive entity of `entity_type`.
    ///
    /// # Errors
    ///
    /// Same as [`find_one`](Self::find_one).
    pub async fn find_all(&self, entity_type: &str, options: &FindOptions) -> Result<EntityPage, ReadError> {
        let request = QueryRequest {
            key_attribute: codec::SPACE.to_string(),
            key_value: codec::space(EntityStatus::Alive, entity_type),
            filter: None,
            limit: options.limit(),
            start_after: options.next.clone(),
        };
        self.run(&request).await
    }

    async fn run(&self, request: &QueryRequest) -> Result<EntityPage, ReadError> {
        let page = self.store.query(&self.table, request).await?;
        let entities = page
            .items
            .iter()
            .map(codec::from_store_item)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EntityPage {
            entities,
            next: page.next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_means_default() {
        assert_eq!(FindOptions::default().limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(FindOptions::default().with_limit(0).limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(FindOptions::default().with_limit(5).limit(), 5);
    }

    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<EntityReader>();
        }
    };
}
