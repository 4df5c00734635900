use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::subscription::{Snapshot, SubscriberRegistry};
use super::{
    Direction, Document, DocumentStore, Filter, Query, StoreError, StoredDocument, Subscription,
    Write,
};
use crate::state::DbPool;

/// Upper bound appended to a prefix so that a range scan covers every string
/// starting with it.
const PREFIX_RANGE_END: char = '\u{f8ff}';

/// How often live queries check for commits made by other processes.
pub const EXTERNAL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Document store on top of the local SQLite database. Each document is one
/// JSON row keyed by `(collection, id)`.
///
/// Writes made through this store refresh live queries right after commit.
/// Writes from other connections to the same file (another process running
/// `log`, say) are picked up by a background task polling
/// `PRAGMA data_version` while subscriptions exist.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: DbPool,
    registry: Arc<SubscriberRegistry>,
    /// Serializes query-then-publish so a slow refresh never overwrites a
    /// newer snapshot.
    refresh_lock: Arc<Mutex<()>>,
    poller: Arc<Mutex<Option<JoinHandle<()>>>>,
    poll_interval: Duration,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            registry: Arc::new(SubscriberRegistry::new()),
            refresh_lock: Arc::new(Mutex::new(())),
            poller: Arc::new(Mutex::new(None)),
            poll_interval: EXTERNAL_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Number of live subscriptions; used to verify teardown.
    pub fn active_subscriptions(&self) -> usize {
        self.registry.len()
    }

    fn run_query(&self, query: &Query) -> Result<Snapshot, StoreError> {
        run_query(&self.pool, query)
    }

    /// Re-run every live query on `collection` and push the new snapshots.
    fn notify(&self, collection: &str) {
        refresh(&self.pool, &self.registry, &self.refresh_lock, Some(collection));
    }

    /// Start the external-write poller unless one is already running.
    fn ensure_poller(&self) {
        let mut poller = lock(&self.poller);
        if poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *poller = Some(tokio::spawn(watch_external_writes(
            self.pool.clone(),
            Arc::downgrade(&self.registry),
            Arc::clone(&self.refresh_lock),
            self.poll_interval,
        )));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_query(pool: &DbPool, query: &Query) -> Result<Snapshot, StoreError> {
    let (sql, binds) = build_select(query)?;
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, json)| Ok(StoredDocument::new(id, parse_document(&json)?)))
        .collect()
}

/// Re-run the live queries on `collection` (all of them for `None`) and
/// publish whatever changed.
fn refresh(
    pool: &DbPool,
    registry: &SubscriberRegistry,
    refresh_lock: &Mutex<()>,
    collection: Option<&str>,
) {
    let _guard = lock(refresh_lock);
    let live = match collection {
        Some(collection) => registry.watching(collection),
        None => registry.all(),
    };
    for (id, query) in live {
        match run_query(pool, &query) {
            Ok(snapshot) => registry.publish(id, snapshot),
            Err(e) => {
                tracing::error!(collection = %query.collection, "Failed to refresh live query: {}", e);
            }
        }
    }
}

/// `data_version` changes whenever another connection commits to the
/// database file. The connection must stay the same between reads.
fn data_version(conn: &rusqlite::Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}

async fn watch_external_writes(
    pool: DbPool,
    registry: Weak<SubscriberRegistry>,
    refresh_lock: Arc<Mutex<()>>,
    period: Duration,
) {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Cannot watch for external writes: {}", e);
            return;
        }
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seen = None;

    loop {
        ticker.tick().await;
        let Some(live) = registry.upgrade() else {
            break;
        };
        if live.is_empty() {
            continue;
        }
        let version = match data_version(&conn) {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!("Failed to read data_version: {}", e);
                continue;
            }
        };
        if seen == Some(version) {
            continue;
        }
        seen = Some(version);
        tracing::debug!(version, "Database changed, refreshing live queries");
        refresh(&pool, &live, &refresh_lock, None);
    }
    tracing::debug!("External write watcher stopped");
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let conn = self.pool.get()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|json| Ok(StoredDocument::new(id, parse_document(&json)?)))
            .transpose()
    }

    async fn query(&self, query: &Query) -> Result<Vec<StoredDocument>, StoreError> {
        self.run_query(query)
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        let initial = self.run_query(&query)?;
        let subscription = self.registry.register(query, initial);
        self.ensure_poller();
        Ok(subscription)
    }

    async fn batch_merge_write(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;

            for write in &writes {
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                        params![write.collection, write.id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let mut merged = match existing {
                    Some(json) => parse_document(&json)?,
                    None => Document::new(),
                };
                for (field, value) in &write.fields {
                    merged.insert(field.clone(), value.clone());
                }

                tx.execute(
                    "INSERT INTO documents (collection, id, data, updated_at)
                     VALUES (?1, ?2, ?3, datetime('now'))
                     ON CONFLICT(collection, id) DO UPDATE SET
                       data = excluded.data,
                       updated_at = excluded.updated_at",
                    params![
                        write.collection,
                        write.id,
                        serde_json::to_string(&Value::Object(merged))?
                    ],
                )?;
            }

            tx.commit()?;
        }

        let mut touched: Vec<&str> = writes.iter().map(|w| w.collection.as_str()).collect();
        touched.sort_unstable();
        touched.dedup();
        for collection in touched {
            self.notify(collection);
        }

        Ok(())
    }

    async fn batch_delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            for id in ids {
                tx.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                )?;
            }
            tx.commit()?;
        }

        self.notify(collection);
        Ok(())
    }
}

fn parse_document(json: &str) -> Result<Document, StoreError> {
    Ok(super::document(serde_json::from_str(json)?))
}

/// JSON path for a top-level field. Field names are interpolated into SQL,
/// so only identifier characters are allowed.
fn json_path(field: &str) -> Result<String, StoreError> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidField(field.to_string()));
    }
    Ok(format!("json_extract(data, '$.{field}')"))
}

fn sql_value(field: &str, value: &Value) -> Result<SqlValue, StoreError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Integer(i)),
            None => n
                .as_f64()
                .map(SqlValue::Real)
                .ok_or_else(|| StoreError::UnsupportedFilter(field.to_string())),
        },
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(StoreError::UnsupportedFilter(field.to_string())),
    }
}

fn build_select(query: &Query) -> Result<(String, Vec<SqlValue>), StoreError> {
    let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
    let mut binds = vec![SqlValue::Text(query.collection.clone())];

    for filter in &query.filters {
        match filter {
            Filter::Eq(field, Value::Null) => {
                sql.push_str(&format!(" AND {} IS NULL", json_path(field)?));
            }
            Filter::Eq(field, value) => {
                sql.push_str(&format!(" AND {} = ?", json_path(field)?));
                binds.push(sql_value(field, value)?);
            }
            Filter::Gte(field, value) => {
                sql.push_str(&format!(" AND {} >= ?", json_path(field)?));
                binds.push(sql_value(field, value)?);
            }
            Filter::Prefix(field, prefix) => {
                let path = json_path(field)?;
                sql.push_str(&format!(" AND {path} >= ? AND {path} <= ?"));
                binds.push(SqlValue::Text(prefix.clone()));
                binds.push(SqlValue::Text(format!("{prefix}{PREFIX_RANGE_END}")));
            }
            Filter::DocumentId(id) => {
                sql.push_str(" AND id = ?");
                binds.push(SqlValue::Text(id.clone()));
            }
        }
    }

    match &query.order_by {
        Some(order) => {
            let direction = match order.direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            sql.push_str(&format!(
                " ORDER BY {} {direction}, id ASC",
                json_path(&order.field)?
            ));
        }
        None => sql.push_str(" ORDER BY id ASC"),
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    Ok((sql, binds))
}
