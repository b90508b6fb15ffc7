//! # Review Vocabulary
//!
//! Action and status strings form the external wire contract: they are stored
//! verbatim in the ledger and returned verbatim by projections. Display names
//! live in static tables built once on first use.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Action names accepted by the transition engine (case-insensitive on input)
pub mod actions {
    pub const APPROVE: &str = "approve";
    pub const RETURN: &str = "return";
    pub const REJECT: &str = "reject";
    pub const RESUBMIT: &str = "resubmit";
    /// Synthetic action used only for the creation event of a timeline
    pub const CREATED: &str = "created";
}

/// Status strings with engine-level meaning
pub mod statuses {
    pub const PENDING_PREFIX: &str = "pending";
    pub const PENDING_REVIEW_LEVEL_PREFIX: &str = "pending_review_level";
    pub const PENDING_REVIEW_LEVEL1: &str = "pending_review_level1";
    pub const PENDING_REVIEW_LEVEL2: &str = "pending_review_level2";
    pub const PENDING_REVIEW_LEVEL3: &str = "pending_review_level3";
    pub const RETURNED_TO_CREATOR: &str = "returned_to_creator";
    pub const RETURNED_TO_REVIEWER: &str = "returned_to_reviewer";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";
    pub const COMPLETED: &str = "completed";
}

/// Permission names understood by the authorization gateway
pub mod permissions {
    pub const ADMIN_MANAGE: &str = "admin_manage";
}

/// Column widths of the review schema
pub mod limits {
    pub const MAX_NAME_LENGTH: usize = 255;
    pub const MAX_ACTION_LENGTH: usize = 64;
    pub const MAX_STATUS_LENGTH: usize = 64;
}

/// Fixed labels used by timelines and views
pub mod labels {
    pub const CREATION_STAGE: &str = "Creation";
    pub const CREATION_COMMENT: &str = "Item created";
    pub const RETURNED_TO_CREATOR_STAGE: &str = "Returned to creator";
    pub const UNKNOWN_STAGE: &str = "Unknown stage";
    pub const NO_STAGE: &str = "None";
    pub const NO_REVIEWER: &str = "None";
    pub const NO_SPECIFIC_REVIEWER: &str = "No specific reviewer";
    pub const UNKNOWN_STATUS: &str = "Unknown";
    pub const REVIEW_NOT_STARTED: &str = "Review has not started yet";
}

static ACTION_DISPLAY_NAMES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (actions::APPROVE, "Approve"),
        (actions::RETURN, "Return"),
        (actions::REJECT, "Reject"),
        (actions::RESUBMIT, "Resubmit"),
        (actions::CREATED, "Created"),
    ])
});

static STATUS_DISPLAY_NAMES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (statuses::RETURNED_TO_CREATOR, "Returned to Creator"),
        (statuses::RETURNED_TO_REVIEWER, "Returned to Reviewer"),
        (statuses::PENDING_REVIEW_LEVEL1, "Pending Level 1 Review"),
        (statuses::PENDING_REVIEW_LEVEL2, "Pending Level 2 Review"),
        (statuses::PENDING_REVIEW_LEVEL3, "Pending Level 3 Review"),
        (statuses::APPROVED, "Approved"),
        (statuses::REJECTED, "Rejected"),
        (statuses::COMPLETED, "Completed"),
    ])
});

/// Human-readable label for an action; unknown actions display as themselves
pub fn action_display_name(action: &str) -> String {
    ACTION_DISPLAY_NAMES
        .get(action)
        .map(|name| (*name).to_string())
        .unwrap_or_else(|| action.to_string())
}

/// Human-readable label for a status.
///
/// Pending levels beyond the table are derived from the level number so that
/// templates with many stages still render sensibly.
pub fn status_display_name(status: Option<&str>) -> String {
    let status = match status {
        Some(s) if !s.is_empty() => s,
        _ => return labels::UNKNOWN_STATUS.to_string(),
    };

    if let Some(name) = STATUS_DISPLAY_NAMES.get(status) {
        return (*name).to_string();
    }

    status
        .strip_prefix(statuses::PENDING_REVIEW_LEVEL_PREFIX)
        .and_then(|level| level.parse::<u32>().ok())
        .map(|level| format!("Pending Level {level} Review"))
        .unwrap_or_else(|| status.to_string())
}
