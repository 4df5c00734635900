use std::collections::HashMap;

use serde::Serialize;

use super::domain::{GoalType, Member, ProgressEntry, UserId};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// A progress entry as shown in the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub entry: ProgressEntry,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub quantity_label: String,
}

pub fn quantity_label(entry: &ProgressEntry, goal_type: GoalType) -> String {
    match goal_type {
        GoalType::Daily => "+1 day".to_string(),
        GoalType::Numeric => format!("+{}", entry.quantity),
    }
}

/// Most recent submission first; entries submitted at the same instant (or
/// with no known submission time) fall back to the later calendar date.
pub fn history(entries: &[ProgressEntry], members: &[Member], goal_type: GoalType) -> Vec<HistoryItem> {
    let member_lookup: HashMap<&UserId, &Member> =
        members.iter().map(|m| (&m.user_id, m)).collect();

    let mut sorted: Vec<&ProgressEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| a.id.cmp(&b.id))
    });

    sorted
        .into_iter()
        .map(|entry| {
            let member = member_lookup.get(&entry.user_id).copied();
            let display_name = member
                .and_then(|m| m.display_name.clone())
                .or_else(|| entry.user_display_name.clone())
                .unwrap_or_else(|| "Member".to_string());
            let photo_url = member
                .and_then(|m| m.photo_url.clone())
                .or_else(|| entry.user_photo_url.clone());

            HistoryItem {
                entry: entry.clone(),
                display_name,
                photo_url,
                quantity_label: quantity_label(entry, goal_type),
            }
        })
        .collect()
}

/// Fixed-size page cursor over the history feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page_size: usize,
    page: usize,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Pager {
    /// A zero page size is treated as one item per page.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Zero-based index of the current page.
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }

    /// Pull the page index back inside `[0, page_count - 1]`. Called whenever
    /// the item count may have shrunk.
    pub fn clamp(&mut self, total: usize) {
        let last = self.page_count(total).saturating_sub(1);
        self.page = self.page.min(last);
    }

    pub fn set_page(&mut self, page: usize, total: usize) {
        self.page = page;
        self.clamp(total);
    }

    pub fn next(&mut self, total: usize) {
        self.set_page(self.page + 1, total);
    }

    pub fn previous(&mut self) {
        self.page = self.page.saturating_sub(1);
    }

    pub fn has_next(&self, total: usize) -> bool {
        self.page + 1 < self.page_count(total)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    /// Items on the current page. Empty if the index is past the end.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = (self.page * self.page_size).min(items.len());
        let end = (start + self.page_size).min(items.len());
        &items[start..end]
    }
}
