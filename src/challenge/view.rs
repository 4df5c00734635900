use serde::Serialize;

use super::aggregate::{aggregate, AggregateRow};
use super::domain::{Goal, Member, ProgressEntry, Viewer};
use super::history::{history, HistoryItem};
use super::ranking::Leaderboard;

/// Everything a group page shows, derived from one set of snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeView {
    pub goal: Option<Goal>,
    pub leaderboard: Leaderboard,
    pub group_total: f64,
    /// Group progress toward the target, 0 to 100.
    pub completion_percentage: u32,
    pub history: Vec<HistoryItem>,
    pub viewer_row: Option<AggregateRow>,
    pub personal_entries: Vec<ProgressEntry>,
}

impl ChallengeView {
    pub fn winners(&self) -> Vec<&AggregateRow> {
        self.leaderboard.winners()
    }

    pub fn is_configured(&self) -> bool {
        self.goal.is_some()
    }
}

pub fn completion_percentage(group_total: f64, goal: Option<&Goal>) -> u32 {
    match goal.and_then(Goal::target) {
        Some(target) => {
            let percent = (group_total / target * 100.0).round();
            percent.clamp(0.0, 100.0) as u32
        }
        None => 0,
    }
}

/// The viewer's own entries, latest date first.
pub fn personal_entries(entries: &[ProgressEntry], viewer: &Viewer) -> Vec<ProgressEntry> {
    let mut mine: Vec<ProgressEntry> = entries
        .iter()
        .filter(|e| e.user_id == viewer.user_id)
        .cloned()
        .collect();
    mine.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    mine
}

/// Recompute the whole view. Pure: the same inputs always give the same view,
/// whatever order the snapshot delivered them in.
pub fn derive_view(
    entries: &[ProgressEntry],
    goal: Option<&Goal>,
    members: &[Member],
    viewer: Option<&Viewer>,
) -> ChallengeView {
    let leaderboard = Leaderboard::rank(aggregate(entries, goal, members, viewer));
    let group_total = leaderboard.group_total();
    let goal_type = goal.map(|g| g.goal_type).unwrap_or_default();

    let (viewer_row, personal) = match viewer {
        Some(viewer) => (
            leaderboard.row_for(&viewer.user_id).cloned(),
            personal_entries(entries, viewer),
        ),
        None => (None, Vec::new()),
    };

    ChallengeView {
        goal: goal.cloned(),
        completion_percentage: completion_percentage(group_total, goal),
        history: history(entries, members, goal_type),
        group_total,
        leaderboard,
        viewer_row,
        personal_entries: personal,
    }
}
