//! # Stage Model
//!
//! One step of a template. Reviewing a stage requires holding its role and,
//! when a reviewer is pinned, being that individual.
//!
//! Maps to the `review_stages` table.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Stage {
    pub stage_id: i64,
    pub template_id: i64,
    pub name: String,
    pub stage_order: i32,
    pub required_role_id: i64,
    pub pinned_reviewer_id: Option<i64>,
}

impl Stage {
    pub fn is_entry(&self) -> bool {
        self.stage_order == 1
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned_reviewer_id.is_some()
    }
}
