//! Public profile documents in the `users` collection.

use serde_json::json;

use crate::auth::User;
use crate::challenge::UserId;
use crate::clock::Clock;
use crate::error::AppResult;
use crate::store::{collection, document, DocumentStore};

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Write the user's current profile, keeping the first `createdAt`.
pub async fn save_profile(store: &dyn DocumentStore, clock: &dyn Clock, user: &User) -> AppResult<()> {
    let now = clock.now().timestamp_millis();
    let created_at = store
        .get(collection::USERS, user.id.as_str())
        .await?
        .and_then(|doc| doc.millis_field("createdAt"))
        .unwrap_or(now);

    let fields = document(json!({
        "email": user.email,
        "displayName": user.display_name,
        "photoURL": user.photo_url,
        "createdAt": created_at,
        "updatedAt": now,
    }));
    store
        .merge_write(collection::USERS, user.id.as_str(), fields)
        .await?;
    tracing::info!(user_id = %user.id, "Profile saved");
    Ok(())
}

pub async fn load_profile(store: &dyn DocumentStore, user_id: &UserId) -> AppResult<Option<Profile>> {
    let doc = store.get(collection::USERS, user_id.as_str()).await?;
    Ok(doc.map(|doc| Profile {
        user_id: user_id.clone(),
        email: doc.str_field("email").map(str::to_string),
        display_name: doc.str_field("displayName").map(str::to_string),
        photo_url: doc.str_field("photoURL").map(str::to_string),
    }))
}
