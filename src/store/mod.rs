//! Document store collaborator.
//!
//! Everything the app persists lives in flat collections of JSON documents,
//! looked up by key. The [`DocumentStore`] trait is the only way the rest of
//! the crate reaches storage; [`SqliteDocumentStore`] backs it with the local
//! SQLite database.

pub mod sqlite;
pub mod subscription;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use sqlite::SqliteDocumentStore;
pub use subscription::Subscription;

/// Collection names shared by every writer and reader.
pub mod collection {
    pub const USERS: &str = "users";
    pub const GROUPS: &str = "groups";
    pub const MEMBERSHIPS: &str = "groupMembers";
    pub const GOALS: &str = "goals";
    pub const PROGRESS: &str = "progress";
}

/// Top-level fields of a stored document.
pub type Document = serde_json::Map<String, Value>;

/// Turn a `json!({..})` literal into a [`Document`]. Anything other than an
/// object yields an empty document.
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Unsupported filter value for field {0}")]
    UnsupportedFilter(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, data: Document) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// String field, if present and actually a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }

    /// Numeric field. Numeric strings are accepted the way a loosely typed
    /// writer would have coerced them; non-finite values are dropped.
    pub fn f64_field(&self, name: &str) -> Option<f64> {
        let value = match self.data.get(name)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Epoch-millisecond timestamp field.
    pub fn millis_field(&self, name: &str) -> Option<i64> {
        match self.data.get(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`; a `Null` value matches missing fields too.
    Eq(String, Value),
    /// `field >= value`
    Gte(String, Value),
    /// String prefix match on `field`.
    Prefix(String, String),
    /// Match a single document by its id.
    DocumentId(String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(field.into(), value.into())
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Prefix(field.into(), prefix.into())
    }

    pub fn document_id(id: impl Into<String>) -> Self {
        Self::DocumentId(id.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One merge-write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub collection: String,
    pub id: String,
    pub fields: Document,
}

impl Write {
    pub fn merge(collection: impl Into<String>, id: impl Into<String>, fields: Document) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            fields,
        }
    }
}

/// Document store operations. Writes are last-write-wins merges; there is no
/// cross-document consistency beyond what a single batch provides.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load one document; a missing document is `None`, not an error.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<StoredDocument>, StoreError>;

    /// Live query. The returned subscription yields the current snapshot
    /// first, then a new snapshot after every write to the collection.
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;

    /// Apply several merge-writes atomically.
    async fn batch_merge_write(&self, writes: Vec<Write>) -> Result<(), StoreError>;

    /// Delete the listed documents atomically. Missing ids are ignored.
    async fn batch_delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError>;

    /// Merge `fields` into the document, creating it if absent.
    async fn merge_write(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError> {
        self.batch_merge_write(vec![Write::merge(collection, id, fields)])
            .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.batch_delete(collection, &[id.to_string()]).await
    }
}
