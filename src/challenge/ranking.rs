use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::aggregate::AggregateRow;
use super::domain::UserId;

/// Leaderboard order.
///
/// 1. Rows that reached the target come before rows that did not.
/// 2. Among finishers, the earlier completion wins regardless of total.
/// 3. Among the rest, the higher total wins.
/// 4. Display name, then user id, break any remaining tie.
pub fn compare_rows(a: &AggregateRow, b: &AggregateRow) -> Ordering {
    let by_progress = match (a.completed_at, b.completed_at) {
        (Some(a_at), Some(b_at)) => a_at.cmp(&b_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.total.total_cmp(&a.total),
    };

    by_progress
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub rows: Vec<AggregateRow>,
}

impl Leaderboard {
    pub fn rank(mut rows: Vec<AggregateRow>) -> Self {
        rows.sort_by(compare_rows);
        Self { rows }
    }

    /// Earliest completion time across all rows.
    pub fn first_completion(&self) -> Option<DateTime<Utc>> {
        self.rows.iter().filter_map(|r| r.completed_at).min()
    }

    /// Everyone who completed at the earliest completion time. More than one
    /// row means an exact tie for first place.
    pub fn winners(&self) -> Vec<&AggregateRow> {
        match self.first_completion() {
            Some(first) => self
                .rows
                .iter()
                .filter(|r| r.completed_at == Some(first))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn group_total(&self) -> f64 {
        self.rows.iter().map(|r| r.total).sum()
    }

    pub fn row_for(&self, user_id: &UserId) -> Option<&AggregateRow> {
        self.rows.iter().find(|r| &r.user_id == user_id)
    }

    /// One-based position of a user on the board.
    pub fn position_of(&self, user_id: &UserId) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| &r.user_id == user_id)
            .map(|i| i + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
