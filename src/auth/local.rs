use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use rusqlite::{params, OptionalExtension};
use tokio::sync::watch;

use super::session;
use super::{AuthError, Credentials, IdentityProvider, Session, SignUpProfile, User, MIN_PASSWORD_LEN};
use crate::challenge::UserId;
use crate::clock::Clock;
use crate::state::DbPool;

/// Keeps expiry arithmetic far from chrono's limits.
const MAX_SESSION_HOURS: u64 = 24 * 365 * 100;

/// Identity provider backed by the local SQLite database. Accounts live in
/// `users`, issued tokens in `sessions`.
pub struct LocalIdentityProvider {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    session_hours: i64,
    bcrypt_cost: u32,
    current: watch::Sender<Option<Session>>,
}

impl LocalIdentityProvider {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>, session_hours: u64, bcrypt_cost: u32) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            pool,
            clock,
            session_hours: session_hours.min(MAX_SESSION_HOURS) as i64,
            bcrypt_cost,
            current,
        }
    }

    fn open_session(&self, user: User) -> Result<Session, AuthError> {
        let expires_at = self.clock.now() + Duration::hours(self.session_hours);
        let token = session::create_session(&self.pool, &user.id, expires_at)?;
        let session = Session {
            token,
            user,
            expires_at,
        };
        self.current.send_replace(Some(session.clone()));
        Ok(session)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, profile: SignUpProfile) -> Result<Session, AuthError> {
        let email = normalize_email(&profile.email);
        if !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if profile.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let password_hash = bcrypt::hash(&profile.password, self.bcrypt_cost)?;
        let user = User {
            id: UserId::new(uuid::Uuid::now_v7().to_string()),
            email,
            display_name: trimmed(profile.display_name),
            photo_url: trimmed(profile.photo_url),
        };

        {
            let conn = self.pool.get()?;
            let inserted = conn.execute(
                "INSERT INTO users (id, email, display_name, photo_url, password_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.as_str(),
                    user.email,
                    user.display_name,
                    user.photo_url,
                    password_hash
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    return Err(AuthError::EmailInUse);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(user_id = %user.id, "Account created");
        self.open_session(user)
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<Session, AuthError> {
        let email = normalize_email(&credentials.email);

        let row = {
            let conn = self.pool.get()?;
            conn.query_row(
                "SELECT id, email, display_name, photo_url, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        User {
                            id: UserId::new(row.get::<_, String>(0)?),
                            email: row.get(1)?,
                            display_name: row.get(2)?,
                            photo_url: row.get(3)?,
                        },
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?
        };

        let Some((user, password_hash)) = row else {
            return Err(AuthError::InvalidCredentials);
        };

        if !bcrypt::verify(&credentials.password, &password_hash)? {
            tracing::warn!(user_id = %user.id, "Rejected sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(user_id = %user.id, "Signed in");
        self.open_session(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.current.send_replace(None);
        if let Some(session) = previous {
            session::delete_session(&self.pool, &session.token)?;
            tracing::info!(user_id = %session.user.id, "Signed out");
        }
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    async fn restore(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let purged = session::purge_expired(&self.pool, self.clock.now())?;
        if purged > 0 {
            tracing::info!(purged, "Removed expired sessions");
        }
        let session = session::find_session(&self.pool, token, self.clock.now())?;
        self.current.send_replace(session.clone());
        Ok(session)
    }

    fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<ManualClock>, LocalIdentityProvider) {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::create_pool(&dir.path().join("test.db")).unwrap();
        crate::db::run_migrations(&pool).unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let provider = LocalIdentityProvider::new(pool, clock.clone(), 24, 4);
        (dir, clock, provider)
    }

    fn profile(email: &str, password: &str) -> SignUpProfile {
        SignUpProfile {
            email: email.to_string(),
            password: password.to_string(),
            display_name: Some("Ana".to_string()),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn sign_up_signs_the_user_in() {
        let (_dir, _clock, provider) = setup();
        let session = provider.sign_up(profile("Ana@Example.com ", "secret1")).await.unwrap();

        assert_eq!(session.user.email, "ana@example.com");
        assert_eq!(provider.current_session(), Some(session));
    }

    #[tokio::test]
    async fn sign_up_validates_input() {
        let (_dir, _clock, provider) = setup();
        assert!(matches!(
            provider.sign_up(profile("not-an-email", "secret1")).await,
            Err(AuthError::InvalidEmail)
        ));
        assert!(matches!(
            provider.sign_up(profile("ana@example.com", "12345")).await,
            Err(AuthError::WeakPassword)
        ));
        assert!(provider.current_session().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (_dir, _clock, provider) = setup();
        provider.sign_up(profile("ana@example.com", "secret1")).await.unwrap();
        assert!(matches!(
            provider.sign_up(profile("ANA@example.com", "secret2")).await,
            Err(AuthError::EmailInUse)
        ));
    }

    #[tokio::test]
    async fn sign_in_checks_password() {
        let (_dir, _clock, provider) = setup();
        provider.sign_up(profile("ana@example.com", "secret1")).await.unwrap();
        provider.sign_out().await.unwrap();

        let bad = Credentials {
            email: "ana@example.com".into(),
            password: "wrong-one".into(),
        };
        assert!(matches!(provider.sign_in(bad).await, Err(AuthError::InvalidCredentials)));

        let unknown = Credentials {
            email: "ben@example.com".into(),
            password: "secret1".into(),
        };
        assert!(matches!(provider.sign_in(unknown).await, Err(AuthError::InvalidCredentials)));

        let good = Credentials {
            email: "ana@example.com".into(),
            password: "secret1".into(),
        };
        let session = provider.sign_in(good).await.unwrap();
        assert_eq!(session.user.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn watchers_see_session_changes() {
        let (_dir, _clock, provider) = setup();
        let mut rx = provider.watch();
        assert!(rx.borrow().is_none());

        provider.sign_up(profile("ana@example.com", "secret1")).await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_some());

        provider.sign_out().await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn restore_resumes_until_expiry() {
        let (_dir, clock, provider) = setup();
        let token = provider
            .sign_up(profile("ana@example.com", "secret1"))
            .await
            .unwrap()
            .token;

        let restored = provider.restore(&token).await.unwrap();
        assert_eq!(restored.map(|s| s.user.email), Some("ana@example.com".to_string()));

        clock.advance(Duration::hours(25));
        assert!(provider.restore(&token).await.unwrap().is_none());
        assert!(provider.current_session().is_none());
    }

    #[tokio::test]
    async fn restore_purges_other_expired_sessions() {
        let (_dir, clock, provider) = setup();
        let ana = provider
            .sign_up(profile("ana@example.com", "secret1"))
            .await
            .unwrap();
        session::create_session(&provider.pool, &ana.user.id, clock.now() - Duration::hours(1))
            .unwrap();

        let count = |pool: &DbPool| -> i64 {
            pool.get()
                .unwrap()
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count(&provider.pool), 2);

        assert!(provider.restore(&ana.token).await.unwrap().is_some());
        assert_eq!(count(&provider.pool), 1);
    }

    #[tokio::test]
    async fn sign_out_revokes_token() {
        let (_dir, _clock, provider) = setup();
        let token = provider
            .sign_up(profile("ana@example.com", "secret1"))
            .await
            .unwrap()
            .token;
        provider.sign_out().await.unwrap();
        assert!(provider.restore(&token).await.unwrap().is_none());
    }
}
