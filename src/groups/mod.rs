//! Groups and memberships.

pub mod invite;

use serde_json::json;

use crate::auth::User;
use crate::challenge::domain::membership_document_id;
use crate::challenge::ingest::{ingest_group, ingest_member, ingest_members};
use crate::challenge::{Group, GroupId, Member, Role, UserId};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::store::{collection, document, Direction, DocumentStore, Filter, Query, Write};

pub use invite::{generate_invite_code, normalize_invite_code};

pub const SEARCH_LIMIT: usize = 10;

pub async fn load_group(store: &dyn DocumentStore, group_id: &GroupId) -> AppResult<Option<Group>> {
    let doc = store.get(collection::GROUPS, group_id.as_str()).await?;
    Ok(doc.as_ref().map(ingest_group))
}

/// Memberships of a group, owner first, then by join time.
pub async fn load_members(store: &dyn DocumentStore, group_id: &GroupId) -> AppResult<Vec<Member>> {
    let docs = store.query(&members_query(group_id)).await?;
    Ok(ingest_members(&docs, group_id))
}

pub fn members_query(group_id: &GroupId) -> Query {
    Query::collection(collection::MEMBERSHIPS).filter(Filter::eq("groupId", group_id.as_str()))
}

pub async fn load_membership(
    store: &dyn DocumentStore,
    group_id: &GroupId,
    user_id: &UserId,
) -> AppResult<Option<Member>> {
    let id = membership_document_id(group_id, user_id);
    let doc = store.get(collection::MEMBERSHIPS, &id).await?;
    Ok(doc.map(|d| ingest_member(&d, group_id)))
}

/// Create a group owned by `owner`. The group and the owner's membership are
/// written in one batch.
pub async fn create_group(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    owner: &User,
    name: &str,
    description: Option<&str>,
) -> AppResult<Group> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Group name is required."));
    }
    let description = description.map(str::trim).filter(|d| !d.is_empty());

    let group = Group {
        id: GroupId::new(uuid::Uuid::now_v7().to_string()),
        name: name.to_string(),
        name_lowercase: name.to_lowercase(),
        description: description.map(str::to_string),
        invite_code: generate_invite_code(),
        owner_id: owner.id.clone(),
    };
    let now = clock.now().timestamp_millis();

    let group_doc = document(json!({
        "name": group.name,
        "nameLowercase": group.name_lowercase,
        "description": group.description,
        "inviteCode": group.invite_code,
        "ownerId": owner.id.as_str(),
        "createdAt": now,
    }));
    let membership_doc = document(json!({
        "groupId": group.id.as_str(),
        "userId": owner.id.as_str(),
        "role": Role::Owner.as_str(),
        "joinedAt": now,
        "displayName": owner.membership_name("Owner"),
        "photoURL": owner.photo_url,
    }));

    store
        .batch_merge_write(vec![
            Write::merge(collection::GROUPS, group.id.as_str(), group_doc),
            Write::merge(
                collection::MEMBERSHIPS,
                membership_document_id(&group.id, &owner.id),
                membership_doc,
            ),
        ])
        .await?;

    tracing::info!(group_id = %group.id, owner = %owner.id, "Group created");
    Ok(group)
}

async fn add_member(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    user: &User,
    group: &Group,
) -> AppResult<()> {
    if load_membership(store, &group.id, &user.id).await?.is_some() {
        return Err(AppError::AlreadyMember);
    }

    let fields = document(json!({
        "groupId": group.id.as_str(),
        "userId": user.id.as_str(),
        "role": Role::Member.as_str(),
        "joinedAt": clock.now().timestamp_millis(),
        "displayName": user.membership_name("Member"),
        "photoURL": user.photo_url,
        "inviteCodeUsed": group.invite_code,
    }));
    store
        .merge_write(
            collection::MEMBERSHIPS,
            &membership_document_id(&group.id, &user.id),
            fields,
        )
        .await?;

    tracing::info!(group_id = %group.id, user_id = %user.id, "Member joined");
    Ok(())
}

/// Redeem an invite code. Returns the group joined.
pub async fn join_by_invite_code(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    user: &User,
    code: &str,
) -> AppResult<Group> {
    let code = normalize_invite_code(code);
    if code.is_empty() {
        return Err(AppError::validation("Enter an invite code."));
    }

    let query = Query::collection(collection::GROUPS)
        .filter(Filter::eq("inviteCode", code.as_str()))
        .limit(1);
    let group = match store.query(&query).await?.first() {
        Some(doc) => ingest_group(doc),
        None => return Err(AppError::not_found("No group found with that invite code.")),
    };

    add_member(store, clock, user, &group).await?;
    Ok(group)
}

/// Join a group picked from search results.
pub async fn join_group(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    user: &User,
    group_id: &GroupId,
) -> AppResult<Group> {
    let group = load_group(store, group_id)
        .await?
        .ok_or_else(|| AppError::not_found("Group not found."))?;
    add_member(store, clock, user, &group).await?;
    Ok(group)
}

/// Groups whose name starts with `term`, case-insensitively.
pub async fn search_groups(store: &dyn DocumentStore, term: &str) -> AppResult<Vec<Group>> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return Ok(Vec::new());
    }

    let query = Query::collection(collection::GROUPS)
        .filter(Filter::prefix("nameLowercase", term))
        .order_by("nameLowercase", Direction::Ascending)
        .limit(SEARCH_LIMIT);
    let docs = store.query(&query).await?;
    Ok(docs.iter().map(ingest_group).collect())
}

/// Groups the user belongs to, in join order. Memberships pointing at a
/// group that no longer exists are skipped.
pub async fn list_user_groups(store: &dyn DocumentStore, user_id: &UserId) -> AppResult<Vec<Group>> {
    let query = Query::collection(collection::MEMBERSHIPS)
        .filter(Filter::eq("userId", user_id.as_str()))
        .order_by("joinedAt", Direction::Ascending);
    let memberships = store.query(&query).await?;

    let mut groups = Vec::with_capacity(memberships.len());
    for membership in &memberships {
        let Some(group_id) = membership.str_field("groupId") else {
            continue;
        };
        match load_group(store, &GroupId::new(group_id)).await? {
            Some(group) => groups.push(group),
            None => tracing::warn!(group_id, "Membership points at a missing group"),
        }
    }
    Ok(groups)
}
