//! Small persisted key/value preferences, injected wherever a "current"
//! choice must survive restarts.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use crate::challenge::GroupId;
use crate::state::DbPool;
use crate::store::StoreError;

pub const CURRENT_GROUP_KEY: &str = "get-after-it:group-id";
pub const DEFAULT_GROUP_ID: &str = "default";
pub const SESSION_TOKEN_KEY: &str = "get-after-it:session";

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

pub struct SqlitePreferenceStore {
    pool: DbPool,
}

impl SqlitePreferenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO preferences (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// The group the user is currently looking at.
pub struct CurrentGroup<'a> {
    store: &'a dyn PreferenceStore,
}

impl<'a> CurrentGroup<'a> {
    pub fn new(store: &'a dyn PreferenceStore) -> Self {
        Self { store }
    }

    /// Stored group id, trimmed. Missing or blank gives the default group.
    pub async fn get(&self) -> Result<GroupId, StoreError> {
        let stored = self.store.get(CURRENT_GROUP_KEY).await?;
        Ok(GroupId::new(normalize_group_id(stored.as_deref())))
    }

    pub async fn set(&self, group_id: &GroupId) -> Result<GroupId, StoreError> {
        let normalized = normalize_group_id(Some(group_id.as_str()));
        self.store.set(CURRENT_GROUP_KEY, &normalized).await?;
        Ok(GroupId::new(normalized))
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(CURRENT_GROUP_KEY).await
    }
}

fn normalize_group_id(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => DEFAULT_GROUP_ID.to_string(),
    }
}
