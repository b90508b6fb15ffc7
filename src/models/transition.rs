//! # Transition Model
//!
//! A named action available at a stage. `(stage_id, action_name)` is unique.
//!
//! Maps to the `review_transitions` table.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transition {
    pub transition_id: i64,
    pub stage_id: i64,
    /// Lowercase action tag
    pub action_name: String,
    /// `None` means the transition ends the workflow
    pub next_stage_id: Option<i64>,
    pub result_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransition {
    pub stage_id: i64,
    pub action_name: String,
    pub next_stage_id: Option<i64>,
    pub result_status: String,
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        self.next_stage_id.is_none()
    }
}
