use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension};

use super::{AuthError, Session, User};
use crate::challenge::UserId;
use crate::state::DbPool;

fn format_expiry(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Create a new session for a user. Returns the session token.
pub fn create_session(
    pool: &DbPool,
    user_id: &UserId,
    expires_at: DateTime<Utc>,
) -> Result<String, AuthError> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, user_id.as_str(), token, format_expiry(expires_at)],
    )?;

    Ok(token)
}

/// Look up a session by token. Expired sessions are deleted and reported as
/// absent.
pub fn find_session(
    pool: &DbPool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<Session>, AuthError> {
    let conn = pool.get()?;

    let row = conn
        .query_row(
            "SELECT u.id, u.email, u.display_name, u.photo_url, s.expires_at
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ?1",
            params![token],
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
        .optional()?;

    let Some((user, expires_at)) = row else {
        return Ok(None);
    };

    let expires_at = match DateTime::parse_from_rfc3339(&expires_at) {
        Ok(at) => at.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!("Discarding session with unreadable expiry: {}", e);
            conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
            return Ok(None);
        }
    };

    if expires_at <= now {
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        return Ok(None);
    }

    Ok(Some(Session {
        token: token.to_string(),
        user,
        expires_at,
    }))
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<(), AuthError> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Remove every session that expired before `now`. Returns the count deleted.
pub fn purge_expired(pool: &DbPool, now: DateTime<Utc>) -> Result<usize, AuthError> {
    let conn = pool.get()?;
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![format_expiry(now)],
    )?;
    Ok(deleted)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
