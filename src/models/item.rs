//! # Item Model
//!
//! One instance of work moving through a template. Items are mutated only by
//! the transition engine; every mutation bumps `version`, which doubles as the
//! optimistic-concurrency token.
//!
//! Maps to the `review_items` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::state_machine::states;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub item_id: i64,
    pub template_id: i64,
    pub title: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub status: String,
    /// `None` once terminal or while returned to the creator
    pub current_stage_id: Option<i64>,
    pub current_reviewer_id: Option<i64>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub template_id: i64,
    pub title: String,
    pub created_by: i64,
    pub status: String,
    pub current_stage_id: Option<i64>,
    pub current_reviewer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Filter used by the persistence gateway's `find_items`.
///
/// Conditions set on the query are AND-ed; `any_of` holds alternatives that
/// are OR-ed with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub current_reviewer_id: Option<i64>,
    pub created_by: Option<i64>,
    pub status: Option<String>,
    pub any_of: Vec<ItemQuery>,
}

impl ItemQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reviewer(mut self, user_id: i64) -> Self {
        self.current_reviewer_id = Some(user_id);
        self
    }

    pub fn creator(mut self, user_id: i64) -> Self {
        self.created_by = Some(user_id);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn or(mut self, alternative: ItemQuery) -> Self {
        self.any_of.push(alternative);
        self
    }

    /// Evaluate the filter against an item held in memory
    pub fn matches(&self, item: &Item) -> bool {
        let own = self
            .current_reviewer_id
            .is_none_or(|id| item.current_reviewer_id == Some(id))
            && self.created_by.is_none_or(|id| item.created_by == id)
            && self.status.as_ref().is_none_or(|s| &item.status == s);

        own && (self.any_of.is_empty() || self.any_of.iter().any(|alt| alt.matches(item)))
    }
}

impl Item {
    pub fn is_terminal(&self) -> bool {
        self.current_stage_id.is_none() && states::is_terminal_status(&self.status)
    }

    pub fn is_returned(&self) -> bool {
        states::is_returned_status(&self.status)
    }
}

/// New state computed for an item by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStateChange {
    pub item_id: i64,
    /// Version read before the change; the write succeeds only if unchanged
    pub expected_version: i64,
    pub status: String,
    pub current_stage_id: Option<i64>,
    pub current_reviewer_id: Option<i64>,
    pub changed_at: DateTime<Utc>,
}
