//! # External Interfaces
//!
//! The engine talks to storage, authorization and the user directory only
//! through these traits. `memory` provides in-process implementations used by
//! tests and embedded deployments; `crate::database` provides PostgreSQL ones.

pub mod memory;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::{
    Item, ItemQuery, ItemStateChange, NewItem, NewReviewRecord, NewTransition,
    NewWorkflowDefinition, ReviewRecord, Stage, Transition, WorkflowTemplate,
};

pub use memory::{InMemoryDirectory, InMemoryStore};

/// Persistence gateway for every workflow entity
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn get_template(&self, template_id: i64) -> Result<Option<WorkflowTemplate>>;

    async fn get_stage(&self, stage_id: i64) -> Result<Option<Stage>>;

    /// Stages of a template ordered by `stage_order`
    async fn stages_for_template(&self, template_id: i64) -> Result<Vec<Stage>>;

    async fn transitions_for_template(&self, template_id: i64) -> Result<Vec<Transition>>;

    /// Write a template with all of its stages and transitions, or nothing.
    ///
    /// Stages are returned ordered by `stage_order`, transitions in the order
    /// given.
    async fn add_definition(
        &self,
        definition: NewWorkflowDefinition,
    ) -> Result<(WorkflowTemplate, Vec<Stage>, Vec<Transition>)>;

    /// Attach transitions to a template no item references, or write nothing.
    ///
    /// Serialized against `add_item` for the same template: fails with
    /// `InvalidState` once any item references it, and with `Validation` when
    /// a `(stage_id, action_name)` pair already exists.
    async fn add_transitions_if_unreferenced(
        &self,
        template_id: i64,
        transitions: Vec<NewTransition>,
    ) -> Result<Vec<Transition>>;

    async fn get_item(&self, item_id: i64) -> Result<Option<Item>>;

    /// Items matching the query ordered by item id
    async fn find_items(&self, query: &ItemQuery) -> Result<Vec<Item>>;

    /// Inserts the item with version 1
    async fn add_item(&self, item: NewItem) -> Result<Item>;

    /// Number of items in a pending status assigned to each reviewer.
    /// Reviewers with no pending items are present with a count of zero.
    async fn count_pending_by_reviewer(&self, reviewer_ids: &[i64]) -> Result<HashMap<i64, i64>>;

    /// Ledger of an item ordered by timestamp, then record id
    async fn records_for_item(&self, item_id: i64) -> Result<Vec<ReviewRecord>>;

    /// Write the new item state and append its ledger record as one unit.
    ///
    /// Succeeds only while the stored version equals
    /// `change.expected_version`; otherwise fails with `Conflict` and writes
    /// nothing. The returned item carries the bumped version.
    async fn commit_transition(
        &self,
        change: ItemStateChange,
        record: NewReviewRecord,
    ) -> Result<(Item, ReviewRecord)>;
}

/// Maps a role to permission grants
#[async_trait]
pub trait AuthorizationGateway: Send + Sync {
    async fn has_permission(&self, role_id: i64, permission: &str) -> Result<bool>;
}

/// User and role lookups
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn roles_of(&self, user_id: i64) -> Result<HashSet<i64>>;

    /// Members of a role ordered by user id
    async fn users_in_role(&self, role_id: i64) -> Result<Vec<i64>>;

    async fn role_exists(&self, role_id: i64) -> Result<bool>;

    async fn user_exists(&self, user_id: i64) -> Result<bool>;

    async fn display_name(&self, user_id: i64) -> Result<String>;
}
