//! # Workflow Template Model
//!
//! A template is the reusable definition of an approval workflow. Its stages
//! and transitions are attached at publication and never edited in place once
//! an item references the template.
//!
//! Maps to the `review_templates` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{NewTransition, Stage};
use crate::error::{ReviewError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WorkflowTemplate {
    pub template_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// New WorkflowTemplate for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflowTemplate {
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Stage as described by an administrator before ids exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    /// 1-based position; a template's orders must be exactly `1..=N`
    pub order: i32,
    pub required_role_id: i64,
    pub pinned_reviewer_id: Option<i64>,
}

/// Transition as described by an administrator, stages referenced by order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDefinition {
    pub from_order: i32,
    pub action: String,
    /// `None` makes the transition terminal
    pub to_order: Option<i32>,
    pub result_status: String,
}

impl TransitionDefinition {
    /// Bind the stage orders to the ids of a template's persisted stages
    pub fn bind_to(&self, stages: &[Stage]) -> Result<NewTransition> {
        let stage_id_for = |order: i32| -> Result<i64> {
            stages
                .iter()
                .find(|s| s.stage_order == order)
                .map(|s| s.stage_id)
                .ok_or(ReviewError::NotFound {
                    entity: "stage order",
                    id: i64::from(order),
                })
        };

        Ok(NewTransition {
            stage_id: stage_id_for(self.from_order)?,
            action_name: self.action.clone(),
            next_stage_id: self.to_order.map(stage_id_for).transpose()?,
            result_status: self.result_status.clone(),
        })
    }
}

/// A validated template with its stages and transitions, written as one unit.
///
/// Names, actions and statuses are already normalised; transitions still
/// reference stages by order because stage ids only exist once written.
#[derive(Debug, Clone)]
pub struct NewWorkflowDefinition {
    pub template: NewWorkflowTemplate,
    pub stages: Vec<StageDefinition>,
    pub transitions: Vec<TransitionDefinition>,
}

/// Complete template definition submitted for publication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub stages: Vec<StageDefinition>,
    pub transitions: Vec<TransitionDefinition>,
}

impl TemplateDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn created_by(mut self, user_id: i64) -> Self {
        self.created_by = Some(user_id);
        self
    }

    /// Append a stage; its order is the next position in the list
    pub fn stage(mut self, name: impl Into<String>, required_role_id: i64) -> Self {
        let order = self.stages.len() as i32 + 1;
        self.stages.push(StageDefinition {
            name: name.into(),
            order,
            required_role_id,
            pinned_reviewer_id: None,
        });
        self
    }

    /// Append a stage that is always reviewed by one individual
    pub fn pinned_stage(
        mut self,
        name: impl Into<String>,
        required_role_id: i64,
        reviewer_id: i64,
    ) -> Self {
        let order = self.stages.len() as i32 + 1;
        self.stages.push(StageDefinition {
            name: name.into(),
            order,
            required_role_id,
            pinned_reviewer_id: Some(reviewer_id),
        });
        self
    }

    pub fn transition(
        mut self,
        from_order: i32,
        action: impl Into<String>,
        to_order: Option<i32>,
        result_status: impl Into<String>,
    ) -> Self {
        self.transitions.push(TransitionDefinition {
            from_order,
            action: action.into(),
            to_order,
            result_status: result_status.into(),
        });
        self
    }
}
