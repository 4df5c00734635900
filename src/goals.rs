//! The group goal: one per group, editable by the owner only.

use serde_json::json;

use crate::auth::User;
use crate::challenge::ingest::ingest_goal;
use crate::challenge::{Goal, GoalType, Group, GroupId};
use crate::clock::{parse_iso_date, Clock, ISO_DATE_FORMAT};
use crate::error::{AppError, AppResult};
use crate::groups::{load_group, load_membership};
use crate::store::{collection, document, DocumentStore, Filter, Query};

#[derive(Debug, Clone, Default)]
pub struct GoalInput {
    pub challenge_type: String,
    pub target_value: f64,
    pub goal_type: GoalType,
    pub description: Option<String>,
    /// Defaults to today.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn load_goal(store: &dyn DocumentStore, group_id: &GroupId) -> AppResult<Option<Goal>> {
    let doc = store.get(collection::GOALS, group_id.as_str()).await?;
    Ok(doc.as_ref().map(ingest_goal))
}

pub fn progress_query(group_id: &GroupId) -> Query {
    Query::collection(collection::PROGRESS).filter(Filter::eq("groupId", group_id.as_str()))
}

/// Load the group and check that `user` owns it.
async fn require_owner(store: &dyn DocumentStore, group_id: &GroupId, user: &User) -> AppResult<Group> {
    let group = load_group(store, group_id)
        .await?
        .ok_or_else(|| AppError::not_found("Group not found."))?;
    if group.owner_id == user.id {
        return Ok(group);
    }
    match load_membership(store, group_id, &user.id).await? {
        Some(member) if member.is_owner() => Ok(group),
        _ => Err(AppError::unauthorized(
            "Only the group owner can change the challenge.",
        )),
    }
}

fn optional_date(value: Option<&str>, field: &str) -> AppResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_iso_date(raw)
            .map(|d| Some(d.format(ISO_DATE_FORMAT).to_string()))
            .ok_or_else(|| AppError::validation(format!("{field} must be a date like 2024-01-31."))),
    }
}

/// Create or replace the group's goal. The first creation time is kept.
pub async fn save_goal(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    user: &User,
    group_id: &GroupId,
    input: GoalInput,
) -> AppResult<Goal> {
    let challenge_type = input.challenge_type.trim();
    if challenge_type.is_empty() {
        return Err(AppError::validation("Please provide a challenge type."));
    }
    if !input.target_value.is_finite() || input.target_value <= 0.0 {
        return Err(AppError::validation("Target value must be a positive number."));
    }
    let start_date = optional_date(input.start_date.as_deref(), "Start date")?
        .unwrap_or_else(|| clock.today());
    let end_date = optional_date(input.end_date.as_deref(), "End date")?;
    if end_date.as_deref().is_some_and(|end| end < start_date.as_str()) {
        return Err(AppError::validation(
            "End date must be on or after the start date.",
        ));
    }
    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    require_owner(store, group_id, user).await?;

    let now = clock.now();
    let existing = load_goal(store, group_id).await?;
    let created_at = existing
        .and_then(|g| g.created_at)
        .unwrap_or(now);

    let fields = document(json!({
        "groupId": group_id.as_str(),
        "challengeType": challenge_type,
        "targetValue": input.target_value,
        "goalType": input.goal_type.as_str(),
        "description": description,
        "startDate": start_date,
        "endDate": end_date,
        "createdAt": created_at.timestamp_millis(),
        "updatedAt": now.timestamp_millis(),
    }));
    store
        .merge_write(collection::GOALS, group_id.as_str(), fields)
        .await?;

    tracing::info!(group_id = %group_id, target = input.target_value, goal_type = %input.goal_type, "Goal saved");
    Ok(Goal {
        group_id: group_id.clone(),
        challenge_type: challenge_type.to_string(),
        target_value: input.target_value,
        goal_type: input.goal_type,
        description,
        start_date: Some(start_date),
        end_date,
        created_at: Some(created_at),
    })
}

/// Delete the goal and every progress entry of the group. Returns the number
/// of progress entries removed. Cannot be undone.
pub async fn reset_challenge(
    store: &dyn DocumentStore,
    user: &User,
    group_id: &GroupId,
) -> AppResult<usize> {
    require_owner(store, group_id, user).await?;

    store.delete(collection::GOALS, group_id.as_str()).await?;

    let ids: Vec<String> = store
        .query(&progress_query(group_id))
        .await?
        .into_iter()
        .map(|doc| doc.id)
        .collect();
    if !ids.is_empty() {
        store.batch_delete(collection::PROGRESS, &ids).await?;
    }

    tracing::info!(group_id = %group_id, deleted = ids.len(), "Challenge reset");
    Ok(ids.len())
}
