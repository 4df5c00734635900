//! Snapshot documents to typed records.
//!
//! Ingestion never fails. The store may hold partially written documents, so
//! a missing or malformed field becomes an empty or zero default instead of
//! rejecting the document.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::domain::{Goal, GoalType, Group, GroupId, Member, ProgressEntry, Role, UserId};
use crate::clock::parse_iso_date;
use crate::store::StoredDocument;

fn timestamp(doc: &StoredDocument, field: &str) -> Option<DateTime<Utc>> {
    doc.millis_field(field)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Trimmed, non-empty string field.
fn text(doc: &StoredDocument, field: &str) -> Option<String> {
    doc.str_field(field)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First non-empty of several field names (current name first, legacy after).
fn text_any(doc: &StoredDocument, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| text(doc, f))
}

/// An ISO date field, or empty when missing or not a real calendar date.
fn iso_date(doc: &StoredDocument, field: &str) -> String {
    doc.str_field(field)
        .and_then(parse_iso_date)
        .map(|d| d.format(crate::clock::ISO_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

pub fn ingest_entry(doc: &StoredDocument, group_id: &GroupId) -> ProgressEntry {
    ProgressEntry {
        id: doc.id.clone(),
        group_id: text(doc, "groupId")
            .map(GroupId::new)
            .unwrap_or_else(|| group_id.clone()),
        user_id: UserId::new(text_any(doc, &["userId", "uid"]).unwrap_or_default()),
        date: iso_date(doc, "date"),
        quantity: doc.f64_field("quantity").unwrap_or(0.0),
        notes: text(doc, "notes"),
        user_display_name: text(doc, "userDisplayName"),
        user_photo_url: text(doc, "userPhotoURL"),
        created_at: timestamp(doc, "createdAt"),
        updated_at: timestamp(doc, "updatedAt"),
    }
}

/// Ingest a progress snapshot for one group.
///
/// At most one entry survives per `(user, date)`. If the snapshot holds more
/// than one, the one later in iteration order replaces the earlier one in
/// place.
pub fn ingest_entries(docs: &[StoredDocument], group_id: &GroupId) -> Vec<ProgressEntry> {
    let mut entries: Vec<ProgressEntry> = Vec::with_capacity(docs.len());
    let mut seen: HashMap<(UserId, String), usize> = HashMap::new();

    for doc in docs {
        let entry = ingest_entry(doc, group_id);
        let key = (entry.user_id.clone(), entry.date.clone());
        match seen.get(&key) {
            Some(&index) => {
                tracing::warn!(
                    user_id = %entry.user_id,
                    date = %entry.date,
                    replaced = %entries[index].id,
                    by = %entry.id,
                    "duplicate progress entry in snapshot"
                );
                entries[index] = entry;
            }
            None => {
                seen.insert(key, entries.len());
                entries.push(entry);
            }
        }
    }

    entries
}

pub fn ingest_member(doc: &StoredDocument, group_id: &GroupId) -> Member {
    Member {
        group_id: text(doc, "groupId")
            .map(GroupId::new)
            .unwrap_or_else(|| group_id.clone()),
        user_id: UserId::new(text(doc, "userId").unwrap_or_default()),
        display_name: text(doc, "displayName"),
        photo_url: text(doc, "photoURL"),
        role: Role::parse(doc.str_field("role").unwrap_or_default()),
        joined_at: timestamp(doc, "joinedAt"),
    }
}

/// Memberships ordered for display: the owner first, then by join time.
pub fn ingest_members(docs: &[StoredDocument], group_id: &GroupId) -> Vec<Member> {
    let mut members: Vec<Member> = docs.iter().map(|d| ingest_member(d, group_id)).collect();
    members.sort_by(|a, b| {
        b.is_owner()
            .cmp(&a.is_owner())
            .then_with(|| a.joined_at.cmp(&b.joined_at))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    members
}

/// Goal documents are keyed by group id. Both the current field names and
/// the older challenge schema (`title`, `targetQuantity`, `goalDescription`)
/// are understood.
pub fn ingest_goal(doc: &StoredDocument) -> Goal {
    Goal {
        group_id: GroupId::new(text(doc, "groupId").unwrap_or_else(|| doc.id.clone())),
        challenge_type: text_any(doc, &["challengeType", "title"]).unwrap_or_default(),
        target_value: doc
            .f64_field("targetValue")
            .or_else(|| doc.f64_field("targetQuantity"))
            .unwrap_or(0.0),
        goal_type: doc
            .str_field("goalType")
            .map(GoalType::parse)
            .unwrap_or_default(),
        description: text_any(doc, &["description", "goalDescription"]),
        start_date: Some(iso_date(doc, "startDate")).filter(|d| !d.is_empty()),
        end_date: Some(iso_date(doc, "endDate")).filter(|d| !d.is_empty()),
        created_at: timestamp(doc, "createdAt"),
    }
}

pub fn ingest_group(doc: &StoredDocument) -> Group {
    let name = text(doc, "name").unwrap_or_default();
    Group {
        id: GroupId::new(doc.id.clone()),
        name_lowercase: text(doc, "nameLowercase").unwrap_or_else(|| name.to_lowercase()),
        name,
        description: text(doc, "description"),
        invite_code: text(doc, "inviteCode").unwrap_or_default(),
        owner_id: UserId::new(text(doc, "ownerId").unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document;
    use serde_json::json;

    fn doc(id: &str, value: serde_json::Value) -> StoredDocument {
        StoredDocument::new(id, document(value))
    }

    #[test]
    fn well_formed_entry_is_typed() {
        let entry = ingest_entry(
            &doc(
                "g1_u1_2024-01-02",
                json!({
                    "groupId": "g1",
                    "userId": "u1",
                    "date": "2024-01-02",
                    "quantity": 4.5,
                    "notes": "  felt good  ",
                    "userDisplayName": "Ana",
                    "createdAt": 1_704_153_600_000_i64,
                    "updatedAt": 1_704_157_200_000_i64
                }),
            ),
            &GroupId::new("g1"),
        );
        assert_eq!(entry.user_id, UserId::new("u1"));
        assert_eq!(entry.date, "2024-01-02");
        assert_eq!(entry.quantity, 4.5);
        assert_eq!(entry.notes.as_deref(), Some("felt good"));
        assert_eq!(entry.user_display_name.as_deref(), Some("Ana"));
        assert_eq!(
            entry.updated_at.map(|t| t.timestamp_millis()),
            Some(1_704_157_200_000)
        );
    }

    #[test]
    fn malformed_entry_degrades_to_defaults() {
        let entry = ingest_entry(
            &doc(
                "x",
                json!({"date": 20240102, "quantity": "lots", "notes": "   ", "createdAt": "soon"}),
            ),
            &GroupId::new("g9"),
        );
        assert_eq!(entry.group_id, GroupId::new("g9"));
        assert_eq!(entry.user_id, UserId::new(""));
        assert_eq!(entry.date, "");
        assert_eq!(entry.quantity, 0.0);
        assert!(entry.notes.is_none());
        assert!(entry.created_at.is_none());
    }

    #[test]
    fn legacy_uid_field_is_accepted() {
        let entry = ingest_entry(
            &doc("x", json!({"uid": "u7", "date": "2024-01-02", "quantity": 1})),
            &GroupId::new("g1"),
        );
        assert_eq!(entry.user_id, UserId::new("u7"));
    }

    #[test]
    fn duplicate_user_date_keeps_later_document() {
        let group = GroupId::new("g1");
        let docs = vec![
            doc("first", json!({"userId": "u1", "date": "2024-01-02", "quantity": 3})),
            doc("other", json!({"userId": "u2", "date": "2024-01-02", "quantity": 1})),
            doc("second", json!({"userId": "u1", "date": "2024-01-02", "quantity": 8})),
        ];
        let entries = ingest_entries(&docs, &group);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "second");
        assert_eq!(entries[0].quantity, 8.0);
        assert_eq!(entries[1].id, "other");
    }

    #[test]
    fn zero_quantity_entries_are_kept() {
        let docs = vec![doc("z", json!({"userId": "u1", "date": "2024-01-02", "quantity": 0}))];
        let entries = ingest_entries(&docs, &GroupId::new("g1"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].quantity, 0.0);
    }

    #[test]
    fn members_sorted_owner_first_then_join_time() {
        let group = GroupId::new("g1");
        let docs = vec![
            doc("g1_b", json!({"userId": "b", "role": "member", "joinedAt": 3000})),
            doc("g1_c", json!({"userId": "c", "role": "member", "joinedAt": 2000})),
            doc("g1_a", json!({"userId": "a", "role": "owner", "joinedAt": 5000, "displayName": ""})),
        ];
        let members = ingest_members(&docs, &group);
        let order: Vec<&str> = members.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
        assert_eq!(members[0].display_name_or_default(), "Member");
    }

    #[test]
    fn goal_reads_current_schema() {
        let goal = ingest_goal(&doc(
            "g1",
            json!({"groupId": "g1", "challengeType": "Pushups", "targetValue": 100, "goalType": "daily"}),
        ));
        assert_eq!(goal.challenge_type, "Pushups");
        assert_eq!(goal.target(), Some(100.0));
        assert!(goal.is_daily());
    }

    #[test]
    fn goal_reads_legacy_challenge_schema() {
        let goal = ingest_goal(&doc(
            "default",
            json!({
                "title": "Daily Challenge",
                "targetQuantity": 30,
                "goalDescription": "Walk",
                "startDate": "2024-01-01",
                "endDate": ""
            }),
        ));
        assert_eq!(goal.group_id, GroupId::new("default"));
        assert_eq!(goal.challenge_type, "Daily Challenge");
        assert_eq!(goal.target_value, 30.0);
        assert_eq!(goal.goal_type, GoalType::Numeric);
        assert_eq!(goal.description.as_deref(), Some("Walk"));
        assert_eq!(goal.start_date.as_deref(), Some("2024-01-01"));
        assert!(goal.end_date.is_none());
    }

    #[test]
    fn goal_without_target_has_none() {
        let goal = ingest_goal(&doc("g1", json!({"challengeType": "Pages"})));
        assert_eq!(goal.target(), None);
    }

    #[test]
    fn group_lowercase_name_falls_back_to_name() {
        let group = ingest_group(&doc(
            "g1",
            json!({"name": "Morning Hustlers", "inviteCode": "ABC234", "ownerId": "u1"}),
        ));
        assert_eq!(group.name_lowercase, "morning hustlers");
        assert_eq!(group.invite_code, "ABC234");
        assert!(group.description.is_none());
    }
}
