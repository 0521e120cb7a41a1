//! The state store port and its in-memory implementation.
//!
//! [`StateStore`] is the seam between the runtime and the backing key-value
//! store: single-item reads, secondary-index queries, and atomic
//! multi-item conditional writes. [`MemoryStore`] implements it with the
//! same all-or-nothing semantics and is used for tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::attribute::{AttributeValue, Item};
use crate::codec;
use crate::config::RuntimeConfig;
use crate::envelope;
use crate::error::StoreError;
use crate::plan::{TransactItem, WritePlan};

/// Boxed future returned by [`StateStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Default key schema: items are keyed by their `id` attribute.
pub const DEFAULT_KEY: &[&str] = &[codec::ID];

/// Key schema of command stores: messages are unique per `(source, id)`.
pub const MESSAGE_KEY: &[&str] = &[envelope::SOURCE, envelope::ID];

/// A query over items sharing one partition-key value.
///
/// Results come back newest first (descending `id`, which is time-ordered
/// for generated entity IDs).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Attribute holding the partition key, e.g. `__space` or `__by-customer-pk`.
    pub key_attribute: String,
    /// Partition-key value to match.
    pub key_value: String,
    /// Optional extra equality filter applied after the key match.
    pub filter: Option<(String, AttributeValue)>,
    /// Maximum number of items to return.
    pub limit: usize,
    /// Continue after this `id` (exclusive), from a previous [`Page::next`].
    pub start_after: Option<String>,
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Matching items, newest first.
    pub items: Vec<Item>,
    /// `id` of the last returned item when more results remain.
    pub next: Option<String>,
}

/// Backing store operations used by the reader and writer.
///
/// Methods return boxed futures so the store can be used as a trait object
/// (`Arc<dyn StateStore>`).
pub trait StateStore: Send + Sync {
    /// Fetch the item with the given key, if it exists.
    fn get_item<'a>(&'a self, table: &'a str, key: &'a Item) -> StoreFuture<'a, Option<Item>>;

    /// Run a partition-key query.
    fn query<'a>(&'a self, table: &'a str, request: &'a QueryRequest) -> StoreFuture<'a, Page>;

    /// Apply every item of `plan` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConditionFailed`] with the index of the first
    /// failing item if any guard does not hold; nothing is written then.
    fn transact_write<'a>(&'a self, plan: &'a WritePlan) -> StoreFuture<'a, ()>;
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn get_item<'a>(&'a self, table: &'a str, key: &'a Item) -> StoreFuture<'a, Option<Item>> {
        (**self).get_item(table, key)
    }

    fn query<'a>(&'a self, table: &'a str, request: &'a QueryRequest) -> StoreFuture<'a, Page> {
        (**self).query(table, request)
    }

    fn transact_write<'a>(&'a self, plan: &'a WritePlan) -> StoreFuture<'a, ()> {
        (**self).transact_write(plan)
    }
}

type TableKey = Vec<String>;

#[derive(Debug, Default)]
struct Table {
    items: BTreeMap<TableKey, Item>,
}

/// In-memory [`StateStore`] with exact conditional and atomic semantics.
///
/// Every table is keyed by `id` unless configured otherwise with
/// [`with_table`](Self::with_table). [`for_config`](Self::for_config) also
/// keys the command store by [`MESSAGE_KEY`]. `Clone` is cheap and clones
/// share the same data.
///
/// # Examples
///
/// ```
/// use statefold::{MemoryStore, RuntimeConfig};
///
/// let config = RuntimeConfig::new("shop", "orders");
/// let store = MemoryStore::for_config(&config).with_table("audit", &["id", "at"]);
/// # let _ = store;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    key_schemas: HashMap<String, Vec<String>>,
    tables: Arc<Mutex<HashMap<String, Table>>>,
}

impl MemoryStore {
    /// An empty store keying every table by `id`.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store laid out for the tables `config` names.
    ///
    /// The command store is keyed by `(source, id)`, so commands from
    /// different sources may share an id.
    pub fn for_config(config: &RuntimeConfig) -> Self {
        Self::new().with_table(config.command_store(), MESSAGE_KEY)
    }

    /// Declare the key attributes of `table`.
    pub fn with_table(mut self, table: impl Into<String>, key_attributes: &[&str]) -> Self {
        self.key_schemas.insert(
            table.into(),
            key_attributes.iter().map(|attr| attr.to_string()).collect(),
        );
        self
    }

    /// Every item in `table`, in key order.
    pub async fn scan(&self, table: &str) -> Vec<Item> {
        let tables = self.tables.lock().await;
        tables
            .get(table)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    fn key_schema(&self, table: &str) -> Vec<String> {
        self.key_schemas.get(table).cloned().unwrap_or_else(|| {
            DEFAULT_KEY.iter().map(|attr| attr.to_string()).collect()
        })
    }

    fn table_key(&self, table: &str, item: &Item) -> Result<TableKey, StoreError> {
        self.key_schema(table)
            .iter()
            .map(|attr| match item.get(attr) {
                Some(AttributeValue::S(value) | AttributeValue::N(value)) => Ok(value.clone()),
                Some(_) => Err(StoreError::InvalidRequest(format!(
                    "key attribute `{attr}` of table `{table}` must be a string or number"
                ))),
                None => Err(StoreError::InvalidRequest(format!(
                    "missing key attribute `{attr}` for table `{table}`"
                ))),
            })
            .collect()
    }
}

impl StateStore for MemoryStore {
    fn get_item<'a>(&'a self, table: &'a str, key: &'a Item) -> StoreFuture<'a, Option<Item>> {
        Box::pin(async move {
            let key = self.table_key(table, key)?;
            let tables = self.tables.lock().await;
            Ok(tables.get(table).and_then(|t| t.items.get(&key)).cloned())
        })
    }

    fn query<'a>(&'a self, table: &'a str, request: &'a QueryRequest) -> StoreFuture<'a, Page> {
        Box::pin(async move {
            if request.limit == 0 {
                return Err(StoreError::InvalidRequest("query limit must be positive".into()));
            }
            let tables = self.tables.lock().await;
            let Some(t) = tables.get(table) else {
                return Ok(Page::default());
            };

            let key_value = AttributeValue::s(&request.key_value);
            let mut matches: Vec<(&str, &Item)> = t
                .items
                .values()
                .filter(|item| item.get(&request.key_attribute) == Some(&key_value))
                .filter(|item| {
                    request
                        .filter
                        .as_ref()
                        .is_none_or(|(attr, value)| item.get(attr) == Some(value))
                })
                .filter_map(|item| {
                    item.get(codec::ID)
                        .and_then(AttributeValue::as_str)
                        .map(|id| (id, item))
                })
                .filter(|(id, _)| request.start_after.as_deref().is_none_or(|after| *id < after))
                .collect();
            matches.sort_by(|(a, _), (b, _)| b.cmp(a));

            let has_more = matches.len() > request.limit;
            matches.truncate(request.limit);
            let next = if has_more {
                matches.last().map(|(id, _)| id.to_string())
            } else {
                None
            };
            Ok(Page {
                items: matches.into_iter().map(|(_, item)| item.clone()).collect(),
                next,
            })
        })
    }

    fn transact_write<'a>(&'a self, plan: &'a WritePlan) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut keyed = Vec::with_capacity(plan.len());
            for entry in plan.items() {
                let key = match entry {
                    TransactItem::Put { item, .. } => self.table_key(entry.table(), item)?,
                    TransactItem::Update { key, .. } => self.table_key(entry.table(), key)?,
                };
                if keyed.iter().any(|(t, k, _)| *t == entry.table() && *k == key) {
                    return Err(StoreError::InvalidRequest(format!(
                        "item {key:?} of table `{}` appears twice in one transaction",
                        entry.table()
                    )));
                }
                keyed.push((entry.table(), key, entry));
            }

            let mut tables = self.tables.lock().await;

            // Check every guard before touching anything.
            for (index, (table, key, entry)) in keyed.iter().enumerate() {
                let current = tables.get(*table).and_then(|t| t.items.get(key));
                if let Some(condition) = entry.condition()
                    && !condition.holds(current)
                {
                    tracing::debug!(index, table = %table, "transaction condition failed");
                    return Err(StoreError::ConditionFailed { index });
                }
            }

            for (table, key, entry) in keyed {
                let t = tables.entry(table.to_string()).or_default();
                match entry {
                    TransactItem::Put { item, .. } => {
                        t.items.insert(key, item.clone());
                    }
                    TransactItem::Update {
                        key: key_item,
                        actions,
                        ..
                    } => {
                        let current = t.items.entry(key).or_insert_with(|| key_item.clone());
                        for action in actions {
                            action.apply(current);
                        }
                    }
                }
            }
            tracing::debug!(items = plan.len(), "transaction applied");
            Ok(())
        })
    }
}
