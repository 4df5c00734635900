//! Progress aggregation, leaderboard ranking and history.
//!
//! Nothing in here touches the store. Each function takes the latest
//! snapshots and recomputes from scratch, so it can be driven by a live
//! subscription or called directly in tests.

pub mod aggregate;
pub mod domain;
pub mod history;
pub mod ingest;
pub mod ranking;
pub mod view;

pub use aggregate::{aggregate, AggregateRow};
pub use domain::{Goal, GoalType, Group, GroupId, Member, ProgressEntry, Role, UserId, Viewer};
pub use history::{history, HistoryItem, Pager, DEFAULT_PAGE_SIZE};
pub use ranking::Leaderboard;
pub use view::{derive_view, ChallengeView};
