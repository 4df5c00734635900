use std::path::PathBuf;
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::{IdentityProvider, LocalIdentityProvider, Session};
use crate::challenge::{GroupId, Viewer};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::preferences::{CurrentGroup, PreferenceStore, SqlitePreferenceStore, SESSION_TOKEN_KEY};
use crate::store::{DocumentStore, SqliteDocumentStore};

pub type DbPool = Pool<SqliteConnectionManager>;

/// The collaborators a running app talks to.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub data_dir: PathBuf,
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Open the database, apply migrations and wire up the local
    /// implementations.
    pub fn open(config: Config, data_dir: PathBuf) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.db_path())?;
        db::run_migrations(&pool)?;
        Ok(Self::with_pool(pool, config, data_dir, Arc::new(SystemClock)))
    }

    pub fn with_pool(pool: DbPool, config: Config, data_dir: PathBuf, clock: Arc<dyn Clock>) -> Self {
        let identity = LocalIdentityProvider::new(
            pool.clone(),
            clock.clone(),
            config.auth.session_hours,
            config.auth.bcrypt_cost,
        );
        Self {
            store: Arc::new(SqliteDocumentStore::new(pool.clone())),
            identity: Arc::new(identity),
            preferences: Arc::new(SqlitePreferenceStore::new(pool.clone())),
            db: pool,
            config,
            data_dir,
            clock,
        }
    }

    /// Resume the session remembered by a previous run, if it is still valid.
    pub async fn restore_session(&self) -> AppResult<Option<Session>> {
        let Some(token) = self.preferences.get(SESSION_TOKEN_KEY).await? else {
            return Ok(None);
        };
        let session = self.identity.restore(&token).await?;
        if session.is_none() {
            self.preferences.remove(SESSION_TOKEN_KEY).await?;
        }
        Ok(session)
    }

    pub async fn remember_session(&self, session: &Session) -> AppResult<()> {
        self.preferences.set(SESSION_TOKEN_KEY, &session.token).await?;
        Ok(())
    }

    pub async fn forget_session(&self) -> AppResult<()> {
        self.identity.sign_out().await?;
        self.preferences.remove(SESSION_TOKEN_KEY).await?;
        Ok(())
    }

    pub fn require_session(&self) -> AppResult<Session> {
        Ok(self.identity.require_session()?)
    }

    pub fn viewer(&self) -> Option<Viewer> {
        self.identity.current_session().map(|s| Viewer::from(&s.user))
    }

    pub fn current_group(&self) -> CurrentGroup<'_> {
        CurrentGroup::new(self.preferences.as_ref())
    }

    pub async fn current_group_id(&self) -> AppResult<GroupId> {
        self.current_group().get().await.map_err(AppError::from)
    }
}
