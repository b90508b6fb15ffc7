use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::statuses;

/// Item status.
///
/// Statuses are open-ended strings on the wire: templates may declare any
/// result status. Well-known ones get their own variant; everything else is
/// carried as `Custom` and round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ReviewStatus {
    /// Waiting for the reviewer of the stage with this order
    PendingReviewLevel(i32),
    ReturnedToCreator,
    ReturnedToReviewer,
    Approved,
    Rejected,
    Completed,
    Custom(String),
}

impl ReviewStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Completed)
    }

    /// Returned items accept only a resubmission
    pub fn is_returned(&self) -> bool {
        matches!(self, Self::ReturnedToCreator | Self::ReturnedToReviewer)
    }

    /// Counts toward a reviewer's workload
    pub fn is_pending(&self) -> bool {
        match self {
            Self::PendingReviewLevel(_) => true,
            Self::Custom(s) => s.starts_with(statuses::PENDING_PREFIX),
            _ => false,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingReviewLevel(order) => {
                write!(f, "{}{order}", statuses::PENDING_REVIEW_LEVEL_PREFIX)
            }
            Self::ReturnedToCreator => write!(f, "{}", statuses::RETURNED_TO_CREATOR),
            Self::ReturnedToReviewer => write!(f, "{}", statuses::RETURNED_TO_REVIEWER),
            Self::Approved => write!(f, "{}", statuses::APPROVED),
            Self::Rejected => write!(f, "{}", statuses::REJECTED),
            Self::Completed => write!(f, "{}", statuses::COMPLETED),
            Self::Custom(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ReviewStatus {
    fn from(s: &str) -> Self {
        match s {
            statuses::RETURNED_TO_CREATOR => Self::ReturnedToCreator,
            statuses::RETURNED_TO_REVIEWER => Self::ReturnedToReviewer,
            statuses::APPROVED => Self::Approved,
            statuses::REJECTED => Self::Rejected,
            statuses::COMPLETED => Self::Completed,
            other => other
                .strip_prefix(statuses::PENDING_REVIEW_LEVEL_PREFIX)
                .and_then(|level| level.parse::<i32>().ok())
                .filter(|level| *level > 0 && pending_status_for_order(*level) == other)
                .map(Self::PendingReviewLevel)
                .unwrap_or_else(|| Self::Custom(other.to_string())),
        }
    }
}

impl From<String> for ReviewStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ReviewStatus> for String {
    fn from(status: ReviewStatus) -> Self {
        status.to_string()
    }
}

pub fn is_terminal_status(status: &str) -> bool {
    ReviewStatus::from(status).is_terminal()
}

pub fn is_returned_status(status: &str) -> bool {
    ReviewStatus::from(status).is_returned()
}

pub fn is_pending_status(status: &str) -> bool {
    status.starts_with(statuses::PENDING_PREFIX)
}

/// `pending_review_level{order}`
pub fn pending_status_for_order(order: i32) -> String {
    ReviewStatus::PendingReviewLevel(order).to_string()
}
