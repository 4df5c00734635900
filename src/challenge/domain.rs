// Domain types - plain data, no I/O
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used when no display name is known.
    pub fn short(&self) -> String {
        self.0.chars().take(6).collect()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document id of a progress entry. One document per user per day per group.
pub fn progress_document_id(group_id: &GroupId, user_id: &UserId, date: &str) -> String {
    format!("{group_id}_{user_id}_{date}")
}

/// Document id of a membership. One document per user per group.
pub fn membership_document_id(group_id: &GroupId, user_id: &UserId) -> String {
    format!("{group_id}_{user_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    #[default]
    Numeric,
    Daily,
}

impl GoalType {
    /// Anything other than `daily` is a numeric goal.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("daily") {
            Self::Daily
        } else {
            Self::Numeric
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Daily => "daily",
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    #[default]
    Member,
}

impl Role {
    pub fn parse(value: &str) -> Self {
        if value == "owner" {
            Self::Owner
        } else {
            Self::Member
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub name_lowercase: String,
    pub description: Option<String>,
    pub invite_code: String,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub group_id: GroupId,
    pub user_id: UserId,
    /// Profile name captured when the membership was written.
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub role: Role,
    pub joined_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn display_name_or_default(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Member")
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub group_id: GroupId,
    pub challenge_type: String,
    pub target_value: f64,
    pub goal_type: GoalType,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Goal {
    /// The positive target, if any. A zero, negative or missing target
    /// disables completion tracking.
    pub fn target(&self) -> Option<f64> {
        (self.target_value.is_finite() && self.target_value > 0.0).then_some(self.target_value)
    }

    pub fn is_daily(&self) -> bool {
        self.goal_type == GoalType::Daily
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub id: String,
    pub group_id: GroupId,
    pub user_id: UserId,
    /// ISO calendar date, or empty if the stored value was unusable.
    pub date: String,
    pub quantity: f64,
    pub notes: Option<String>,
    pub user_display_name: Option<String>,
    pub user_photo_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressEntry {
    /// What this entry adds to a running total under the given goal type.
    pub fn contribution(&self, goal_type: GoalType) -> f64 {
        match goal_type {
            GoalType::Daily => 1.0,
            GoalType::Numeric => self.quantity,
        }
    }
}

/// The signed-in user looking at a derived view. Used only for naming rows
/// that carry no denormalized display name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Viewer {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Viewer {
    pub fn fallback_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or_else(|| self.email.as_deref().filter(|e| !e.is_empty()))
            .unwrap_or("You")
            .to_string()
    }
}
