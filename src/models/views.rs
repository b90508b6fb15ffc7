//! Read-side view types returned by the visibility projection and the
//! history ledger. All are plain serializable values computed on demand.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::labels;

/// An action the viewing user may take right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableAction {
    pub action_name: String,
    pub display_name: String,
    pub result_status: String,
    pub next_stage_name: Option<String>,
}

/// Entry of a user's pending list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItemView {
    pub item_id: i64,
    pub title: String,
    pub status: String,
    pub created_by: i64,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    pub current_stage_name: String,
    pub current_reviewer_name: String,
    pub available_actions: Vec<AvailableAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageView {
    pub stage_id: i64,
    pub name: String,
    pub stage_order: i32,
    pub required_role_id: i64,
    pub pinned_reviewer_name: String,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewHistoryEntry {
    pub review_id: i64,
    pub reviewed_at: DateTime<Utc>,
    pub actor_id: i64,
    pub actor_name: String,
    pub action: String,
    pub comment: Option<String>,
    pub previous_status: String,
    pub new_status: String,
    pub stage_name: String,
}

/// Full view of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetailView {
    pub item_id: i64,
    pub title: String,
    pub status: String,
    pub version: i64,
    pub template_name: String,
    pub created_by: i64,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    pub current_stage_name: String,
    pub current_reviewer_name: String,
    /// Newest first
    pub review_history: Vec<ReviewHistoryEntry>,
    pub available_actions: Vec<AvailableAction>,
    /// Ordered by stage order
    pub all_stages: Vec<StageView>,
}

/// One event of an item's timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub time: DateTime<Utc>,
    pub stage_name: String,
    pub actor_id: i64,
    pub actor_name: String,
    pub action: String,
    pub action_display_name: String,
    pub result_status: String,
    pub status_display_name: String,
    pub comment: Option<String>,
}

impl TimelineEvent {
    pub fn is_creation(&self) -> bool {
        self.action == crate::constants::actions::CREATED
    }
}

/// Ordered history of an item: the synthetic creation event first, then every
/// ledger record by timestamp ascending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub item_id: i64,
    pub current_status: String,
    pub events: Vec<TimelineEvent>,
}

/// Elapsed review time, or the sentinel for items nobody has acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDuration {
    NotStarted,
    Elapsed(Duration),
}

impl ReviewDuration {
    pub fn as_duration(&self) -> Duration {
        match self {
            Self::NotStarted => Duration::zero(),
            Self::Elapsed(d) => *d,
        }
    }
}

impl fmt::Display for ReviewDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.as_duration();
        write!(
            f,
            "{} days {} hours {} minutes",
            d.num_days(),
            d.num_hours() % 24,
            d.num_minutes() % 60
        )
    }
}

impl Serialize for ReviewDuration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub total_reviews: usize,
    pub first_review_time: Option<DateTime<Utc>>,
    pub last_review_time: Option<DateTime<Utc>>,
    pub total_duration: ReviewDuration,
    pub approval_count: usize,
    pub return_count: usize,
    pub reject_count: usize,
    pub current_status_display: String,
}

impl ReviewSummary {
    /// Label for the first review time, with the not-started sentinel
    pub fn first_review_label(&self) -> String {
        self.first_review_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| labels::REVIEW_NOT_STARTED.to_string())
    }

    pub fn last_review_label(&self) -> String {
        self.last_review_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| labels::REVIEW_NOT_STARTED.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewHistoryView {
    pub item_id: i64,
    pub title: String,
    pub template_name: String,
    pub timeline: Timeline,
    pub summary: ReviewSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_display() {
        let d = ReviewDuration::Elapsed(
            Duration::days(2) + Duration::hours(5) + Duration::minutes(17) + Duration::seconds(40),
        );
        assert_eq!(d.to_string(), "2 days 5 hours 17 minutes");
        assert_eq!(ReviewDuration::NotStarted.to_string(), "0 days 0 hours 0 minutes");
    }

    #[test]
    fn test_duration_serializes_as_label() {
        let json = serde_json::to_string(&ReviewDuration::Elapsed(Duration::hours(25))).unwrap();
        assert_eq!(json, "\"1 days 1 hours 0 minutes\"");
    }
}
