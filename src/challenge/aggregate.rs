use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Goal, GoalType, Member, ProgressEntry, UserId, Viewer};
use crate::clock::start_of_day;

/// One user's folded progress. Not persisted; rebuilt from every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub user_id: UserId,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub total: f64,
    /// Contributing entries in fold order.
    pub entries: Vec<ProgressEntry>,
    /// When the running total first reached the target.
    pub completed_at: Option<DateTime<Utc>>,
    /// Calendar date of the entry that reached the target.
    pub completed_on: Option<String>,
}

impl AggregateRow {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Fold order: calendar date, then last update (entries never updated sort
/// first), then id so that equal keys still give one answer.
pub fn sort_for_fold(entries: &mut [ProgressEntry]) {
    entries.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.updated_at.cmp(&b.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Time credited to the entry that completes a goal: its last update, else
/// midnight of its date, else the epoch.
pub fn completion_time(entry: &ProgressEntry) -> DateTime<Utc> {
    entry
        .updated_at
        .or_else(|| start_of_day(&entry.date))
        .unwrap_or_default()
}

/// Fold one user's entries into a total and the first crossing of `target`.
fn fold(
    entries: &[ProgressEntry],
    goal_type: GoalType,
    target: Option<f64>,
) -> (f64, Option<(DateTime<Utc>, String)>) {
    let mut total = 0.0;
    let mut completion = None;

    for entry in entries {
        total += entry.contribution(goal_type);

        if completion.is_none() {
            if let Some(target) = target {
                if total >= target {
                    completion = Some((completion_time(entry), entry.date.clone()));
                }
            }
        }
    }

    (total, completion)
}

fn resolve_display_name(
    user_id: &UserId,
    entries: &[ProgressEntry],
    member: Option<&Member>,
    viewer: Option<&Viewer>,
) -> String {
    // The most recent denormalized name wins
    if let Some(name) = entries.iter().rev().find_map(|e| e.user_display_name.clone()) {
        return name;
    }
    if let Some(name) = member.and_then(|m| m.display_name.clone()) {
        return name;
    }
    match viewer {
        Some(viewer) if &viewer.user_id == user_id => viewer.fallback_name(),
        _ => format!("Member {}", user_id.short()),
    }
}

/// Build one row per user who has submitted entries or holds a membership.
///
/// Input order does not matter: entries are regrouped and resorted here, so
/// the same set of documents always yields the same rows.
pub fn aggregate(
    entries: &[ProgressEntry],
    goal: Option<&Goal>,
    members: &[Member],
    viewer: Option<&Viewer>,
) -> Vec<AggregateRow> {
    let goal_type = goal.map(|g| g.goal_type).unwrap_or_default();
    let target = goal.and_then(Goal::target);
    let member_lookup: HashMap<&UserId, &Member> =
        members.iter().map(|m| (&m.user_id, m)).collect();

    let mut grouped: BTreeMap<UserId, Vec<ProgressEntry>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.user_id.clone())
            .or_default()
            .push(entry.clone());
    }
    for member in members {
        grouped.entry(member.user_id.clone()).or_default();
    }

    grouped
        .into_iter()
        .map(|(user_id, mut user_entries)| {
            sort_for_fold(&mut user_entries);
            let (total, completion) = fold(&user_entries, goal_type, target);
            let member = member_lookup.get(&user_id).copied();
            let display_name = resolve_display_name(&user_id, &user_entries, member, viewer);
            let photo_url = user_entries
                .iter()
                .rev()
                .find_map(|e| e.user_photo_url.clone())
                .or_else(|| member.and_then(|m| m.photo_url.clone()));
            let (completed_at, completed_on) = match completion {
                Some((at, on)) => (Some(at), Some(on)),
                None => (None, None),
            };

            AggregateRow {
                user_id,
                display_name,
                photo_url,
                total,
                entries: user_entries,
                completed_at,
                completed_on,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::challenge::domain::{GroupId, Role};
    use chrono::TimeZone;

    pub(crate) fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, hour, 0, 0).unwrap()
    }

    pub(crate) fn entry(
        user: &str,
        date: &str,
        quantity: f64,
        updated_at: Option<DateTime<Utc>>,
    ) -> ProgressEntry {
        ProgressEntry {
            id: format!("g1_{user}_{date}"),
            group_id: GroupId::new("g1"),
            user_id: UserId::new(user),
            date: date.to_string(),
            quantity,
            notes: None,
            user_display_name: Some(user.to_uppercase()),
            user_photo_url: None,
            created_at: updated_at,
            updated_at,
        }
    }

    pub(crate) fn goal(target: f64, goal_type: GoalType) -> Goal {
        Goal {
            group_id: GroupId::new("g1"),
            challenge_type: "Pushups".into(),
            target_value: target,
            goal_type,
            description: None,
            start_date: None,
            end_date: None,
            created_at: None,
        }
    }

    pub(crate) fn member(user: &str, name: Option<&str>) -> Member {
        Member {
            group_id: GroupId::new("g1"),
            user_id: UserId::new(user),
            display_name: name.map(str::to_string),
            photo_url: None,
            role: Role::Member,
            joined_at: None,
        }
    }

    fn row<'a>(rows: &'a [AggregateRow], user: &str) -> &'a AggregateRow {
        rows.iter().find(|r| r.user_id.as_str() == user).unwrap()
    }

    #[test]
    fn totals_fold_in_date_order() {
        let entries = vec![
            entry("a", "2024-01-03", 2.0, Some(at(9))),
            entry("a", "2024-01-01", 5.0, Some(at(7))),
            entry("b", "2024-01-02", 1.5, Some(at(8))),
        ];
        let rows = aggregate(&entries, None, &[], None);

        let a = row(&rows, "a");
        assert_eq!(a.total, 7.0);
        assert_eq!(a.entries[0].date, "2024-01-01");
        assert_eq!(row(&rows, "b").total, 1.5);
    }

    #[test]
    fn completion_records_crossing_entry() {
        let target = goal(10.0, GoalType::Numeric);
        let entries = vec![
            entry("a", "2024-01-01", 4.0, Some(at(7))),
            entry("a", "2024-01-02", 7.0, Some(at(9))),
            entry("a", "2024-01-03", 3.0, Some(at(11))),
        ];
        let rows = aggregate(&entries, Some(&target), &[], None);
        let a = row(&rows, "a");

        assert_eq!(a.total, 14.0);
        assert_eq!(a.completed_at, Some(at(9)));
        assert_eq!(a.completed_on.as_deref(), Some("2024-01-02"));
    }

    #[test]
    fn completion_falls_back_to_midnight_of_date() {
        let target = goal(3.0, GoalType::Numeric);
        let entries = vec![entry("a", "2024-01-05", 3.0, None)];
        let rows = aggregate(&entries, Some(&target), &[], None);
        assert_eq!(
            rows[0].completed_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn later_entries_do_not_move_completion() {
        let target = goal(5.0, GoalType::Numeric);
        let mut entries = vec![entry("a", "2024-01-02", 5.0, Some(at(10)))];
        let before = aggregate(&entries, Some(&target), &[], None);

        entries.push(entry("a", "2024-01-03", 50.0, Some(at(12))));
        entries.push(entry("a", "2024-01-04", 1.0, Some(at(13))));
        let after = aggregate(&entries, Some(&target), &[], None);

        assert_eq!(before[0].completed_at, after[0].completed_at);
        assert_eq!(before[0].completed_on, after[0].completed_on);
    }

    #[test]
    fn daily_goal_counts_entries_not_quantity() {
        let target = goal(3.0, GoalType::Daily);
        let entries = vec![
            entry("a", "2024-01-01", 40.0, Some(at(6))),
            entry("a", "2024-01-02", 0.0, Some(at(7))),
            entry("a", "2024-01-03", 2.0, Some(at(8))),
        ];
        let rows = aggregate(&entries, Some(&target), &[], None);
        assert_eq!(rows[0].total, 3.0);
        assert_eq!(rows[0].completed_on.as_deref(), Some("2024-01-03"));
    }

    #[test]
    fn zero_or_missing_target_never_completes() {
        let entries = vec![entry("a", "2024-01-01", 1000.0, Some(at(6)))];
        for goal in [None, Some(goal(0.0, GoalType::Numeric))] {
            let rows = aggregate(&entries, goal.as_ref(), &[], None);
            assert!(rows[0].completed_at.is_none());
            assert_eq!(rows[0].total, 1000.0);
        }
    }

    #[test]
    fn zero_quantity_entry_contributes_nothing_but_is_kept() {
        let entries = vec![
            entry("a", "2024-01-01", 0.0, Some(at(6))),
            entry("a", "2024-01-02", 2.0, Some(at(7))),
        ];
        let rows = aggregate(&entries, None, &[], None);
        assert_eq!(rows[0].total, 2.0);
        assert_eq!(rows[0].entries.len(), 2);
    }

    #[test]
    fn members_without_entries_get_zero_rows() {
        let entries = vec![entry("a", "2024-01-01", 2.0, Some(at(6)))];
        let members = vec![member("a", Some("Ana")), member("z", Some("Zed"))];
        let rows = aggregate(&entries, Some(&goal(1.0, GoalType::Numeric)), &members, None);

        assert_eq!(rows.len(), 2);
        let z = row(&rows, "z");
        assert_eq!(z.total, 0.0);
        assert!(z.entries.is_empty());
        assert!(z.completed_at.is_none());
        assert_eq!(z.display_name, "Zed");
    }

    #[test]
    fn display_name_fallbacks() {
        let mut anonymous = entry("viewer01", "2024-01-01", 1.0, None);
        anonymous.user_display_name = None;
        let mut stranger = entry("stranger99", "2024-01-01", 1.0, None);
        stranger.user_display_name = None;

        let viewer = Viewer {
            user_id: UserId::new("viewer01"),
            display_name: None,
            email: Some("me@example.com".into()),
        };
        let rows = aggregate(&[anonymous, stranger], None, &[], Some(&viewer));

        assert_eq!(row(&rows, "viewer01").display_name, "me@example.com");
        assert_eq!(row(&rows, "stranger99").display_name, "Member strang");
    }

    #[test]
    fn denormalized_entry_name_beats_membership_name() {
        let mut renamed = entry("a", "2024-01-02", 1.0, Some(at(8)));
        renamed.user_display_name = Some("Ana B.".into());
        let rows = aggregate(&[renamed], None, &[member("a", Some("Ana"))], None);
        assert_eq!(rows[0].display_name, "Ana B.");
    }

    #[test]
    fn same_day_entries_ordered_by_update_time() {
        let mut early = entry("a", "2024-01-01", 1.0, Some(at(6)));
        early.id = "late-id".into();
        let mut late = entry("a", "2024-01-01", 2.0, Some(at(9)));
        late.id = "early-id".into();
        let rows = aggregate(&[late, early], None, &[], None);
        assert_eq!(rows[0].entries[0].updated_at, Some(at(6)));
    }
}
