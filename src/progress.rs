//! Writing and deleting progress entries.
//!
//! An entry's document id is `groupId_userId_date`, so a second submission
//! for the same day merges into the first instead of adding a document.

use serde_json::json;

use crate::auth::User;
use crate::challenge::domain::progress_document_id;
use crate::challenge::ingest::ingest_entry;
use crate::challenge::GroupId;
use crate::clock::{parse_iso_date, Clock, ISO_DATE_FORMAT};
use crate::error::{AppError, AppResult};
use crate::goals::load_goal;
use crate::groups::load_membership;
use crate::store::{collection, document, DocumentStore};

#[derive(Debug, Clone, Default)]
pub struct ProgressInput {
    /// ISO date; defaults to today.
    pub date: Option<String>,
    /// Ignored for daily goals.
    pub quantity: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedProgress {
    pub id: String,
    pub date: String,
    pub quantity: f64,
    pub outcome: SaveOutcome,
}

pub async fn save_progress(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    user: &User,
    group_id: &GroupId,
    input: ProgressInput,
) -> AppResult<SavedProgress> {
    let date = match input.date.as_deref().map(str::trim) {
        None => clock.today(),
        Some("") => return Err(AppError::validation("Please select a date to log progress.")),
        Some(raw) => parse_iso_date(raw)
            .map(|d| d.format(ISO_DATE_FORMAT).to_string())
            .ok_or_else(|| AppError::validation("Dates look like 2024-01-31."))?,
    };

    if load_membership(store, group_id, &user.id).await?.is_none() {
        return Err(AppError::unauthorized("Join this group to log progress."));
    }

    let goal = load_goal(store, group_id).await?;
    let is_daily = goal.as_ref().is_some_and(|g| g.is_daily());

    let id = progress_document_id(group_id, &user.id, &date);
    let existing = store
        .get(collection::PROGRESS, &id)
        .await?
        .map(|doc| ingest_entry(&doc, group_id));

    if is_daily && existing.is_some() {
        return Err(AppError::validation(
            "You already logged progress for this day. Awesome consistency!",
        ));
    }

    let quantity = if is_daily {
        1.0
    } else {
        match input.quantity {
            Some(q) if q.is_finite() && q >= 0.0 => q,
            _ => return Err(AppError::validation("Quantity must be zero or a positive number.")),
        }
    };
    let notes = input
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let now = clock.now();
    let created_at = existing
        .as_ref()
        .and_then(|e| e.created_at)
        .unwrap_or(now);

    let fields = document(json!({
        "groupId": group_id.as_str(),
        "userId": user.id.as_str(),
        "date": date,
        "quantity": quantity,
        "notes": notes,
        "userDisplayName": user.membership_name("Member"),
        "userPhotoURL": user.photo_url,
        "createdAt": created_at.timestamp_millis(),
        "updatedAt": now.timestamp_millis(),
    }));
    store.merge_write(collection::PROGRESS, &id, fields).await?;

    let outcome = if existing.is_some() {
        SaveOutcome::Updated
    } else {
        SaveOutcome::Created
    };
    tracing::info!(entry = %id, quantity, ?outcome, "Progress saved");

    Ok(SavedProgress {
        id,
        date,
        quantity,
        outcome,
    })
}

/// Delete one of the caller's own entries.
pub async fn delete_progress(store: &dyn DocumentStore, user: &User, entry_id: &str) -> AppResult<()> {
    let doc = store
        .get(collection::PROGRESS, entry_id)
        .await?
        .ok_or_else(|| AppError::not_found("Progress entry not found."))?;

    let group_id = GroupId::new(doc.str_field("groupId").unwrap_or_default());
    let entry = ingest_entry(&doc, &group_id);
    if entry.user_id != user.id {
        return Err(AppError::unauthorized("You can only delete your own progress."));
    }

    store.delete(collection::PROGRESS, entry_id).await?;
    tracing::info!(entry = %entry_id, "Progress deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::{progress_query, save_goal, GoalInput};
    use crate::groups::{create_group, join_by_invite_code};
    use crate::challenge::{GoalType, Group};
    use crate::testing::{fixture, user, Fixture};

    async fn group_with_goal(fx: &Fixture, goal_type: Option<GoalType>) -> Group {
        let ana = user("ana", "Ana");
        let group = create_group(&fx.store, fx.clock.as_ref(), &ana, "Crew", None)
            .await
            .unwrap();
        if let Some(goal_type) = goal_type {
            let input = GoalInput {
                challenge_type: "Pushups".into(),
                target_value: 30.0,
                goal_type,
                ..GoalInput::default()
            };
            save_goal(&fx.store, fx.clock.as_ref(), &ana, &group.id, input)
                .await
                .unwrap();
        }
        group
    }

    fn on(date: &str, quantity: f64) -> ProgressInput {
        ProgressInput {
            date: Some(date.into()),
            quantity: Some(quantity),
            notes: None,
        }
    }

    #[tokio::test]
    async fn resubmitting_a_day_updates_in_place() {
        let fx = fixture();
        let group = group_with_goal(&fx, Some(GoalType::Numeric)).await;
        let ana = user("ana", "Ana");

        let first = save_progress(&fx.store, fx.clock.as_ref(), &ana, &group.id, on("2024-02-28", 5.0))
            .await
            .unwrap();
        assert_eq!(first.outcome, SaveOutcome::Created);

        fx.clock.advance(chrono::Duration::hours(3));
        let mut again = on("2024-02-28", 8.0);
        again.notes = Some(" second set ".into());
        let second = save_progress(&fx.store, fx.clock.as_ref(), &ana, &group.id, again)
            .await
            .unwrap();
        assert_eq!(second.outcome, SaveOutcome::Updated);
        assert_eq!(second.id, first.id);

        let docs = fx.store.query(&progress_query(&group.id)).await.unwrap();
        assert_eq!(docs.len(), 1);
        let entry = ingest_entry(&docs[0], &group.id);
        assert_eq!(entry.quantity, 8.0);
        assert_eq!(entry.notes.as_deref(), Some("second set"));
        assert_eq!(entry.user_display_name.as_deref(), Some("Ana"));
        assert!(entry.created_at < entry.updated_at);
    }

    #[tokio::test]
    async fn daily_goal_rejects_second_entry_for_a_day() {
        let fx = fixture();
        let group = group_with_goal(&fx, Some(GoalType::Daily)).await;
        let ana = user("ana", "Ana");

        let saved = save_progress(&fx.store, fx.clock.as_ref(), &ana, &group.id, on("2024-02-28", 40.0))
            .await
            .unwrap();
        assert_eq!(saved.quantity, 1.0);
        let before = fx.store.get(collection::PROGRESS, &saved.id).await.unwrap();

        let err = save_progress(&fx.store, fx.clock.as_ref(), &ana, &group.id, on("2024-02-28", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let after = fx.store.get(collection::PROGRESS, &saved.id).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn date_defaults_to_today_and_must_be_valid() {
        let fx = fixture();
        let group = group_with_goal(&fx, None).await;
        let ana = user("ana", "Ana");

        let saved = save_progress(
            &fx.store,
            fx.clock.as_ref(),
            &ana,
            &group.id,
            ProgressInput {
                quantity: Some(0.0),
                ..ProgressInput::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(saved.date, "2024-03-01");
        assert_eq!(saved.quantity, 0.0);

        for bad in ["", "2024-02-30", "yesterday"] {
            let result =
                save_progress(&fx.store, fx.clock.as_ref(), &ana, &group.id, on(bad, 1.0)).await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{bad} accepted");
        }
    }

    #[tokio::test]
    async fn numeric_quantity_must_be_non_negative() {
        let fx = fixture();
        let group = group_with_goal(&fx, Some(GoalType::Numeric)).await;
        let ana = user("ana", "Ana");

        for quantity in [-1.0, f64::NAN] {
            let result = save_progress(
                &fx.store,
                fx.clock.as_ref(),
                &ana,
                &group.id,
                on("2024-02-28", quantity),
            )
            .await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
        let missing = ProgressInput {
            date: Some("2024-02-28".into()),
            ..ProgressInput::default()
        };
        assert!(save_progress(&fx.store, fx.clock.as_ref(), &ana, &group.id, missing)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn non_members_cannot_log() {
        let fx = fixture();
        let group = group_with_goal(&fx, None).await;
        let err = save_progress(
            &fx.store,
            fx.clock.as_ref(),
            &user("eve", "Eve"),
            &group.id,
            on("2024-02-28", 1.0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn only_the_author_can_delete() {
        let fx = fixture();
        let group = group_with_goal(&fx, None).await;
        let ana = user("ana", "Ana");
        let ben = user("ben", "Ben");
        join_by_invite_code(&fx.store, fx.clock.as_ref(), &ben, &group.invite_code)
            .await
            .unwrap();

        let saved = save_progress(&fx.store, fx.clock.as_ref(), &ana, &group.id, on("2024-02-28", 2.0))
            .await
            .unwrap();

        let err = delete_progress(&fx.store, &ben, &saved.id).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        delete_progress(&fx.store, &ana, &saved.id).await.unwrap();
        let err = delete_progress(&fx.store, &ana, &saved.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
