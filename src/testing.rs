//! Fixtures shared by the service tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use crate::auth::User;
use crate::challenge::UserId;
use crate::clock::ManualClock;
use crate::db;
use crate::store::SqliteDocumentStore;

pub(crate) struct Fixture {
    pub _dir: TempDir,
    pub store: SqliteDocumentStore,
    pub clock: Arc<ManualClock>,
}

pub(crate) fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::create_pool(&dir.path().join("app.db")).unwrap();
    db::run_migrations(&pool).unwrap();
    Fixture {
        _dir: dir,
        store: SqliteDocumentStore::new(pool),
        clock: Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        )),
    }
}

pub(crate) fn user(id: &str, name: &str) -> User {
    User {
        id: UserId::new(id),
        email: format!("{id}@example.com"),
        display_name: Some(name.to_string()),
        photo_url: None,
    }
}
