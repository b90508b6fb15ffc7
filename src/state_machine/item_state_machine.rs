//! # Transition Engine
//!
//! The item state machine. `apply` validates an actor's action against the
//! guard chain and the template's transitions, computes the next stage,
//! status and reviewer, then commits the item state and its ledger record as
//! one unit.
//!
//! Calls on the same item are serialized either by a per-item lock
//! (`ConcurrencyMode::Locking`) or by the store's version check alone
//! (`ConcurrencyMode::Optimistic`). Calls on different items never contend.

use std::sync::Arc;
use tracing::{debug, info};

use super::events::ReviewAction;
use super::guards::{check_eligibility, ReviewContext};
use super::locks::ItemLocks;
use super::states::{is_terminal_status, pending_status_for_order, ReviewStatus};
use crate::cache::Clock;
use crate::config::ConcurrencyMode;
use crate::error::{ReviewError, Result};
use crate::gateway::{IdentityDirectory, ReviewStore};
use crate::logging::{log_error, log_review_operation};
use crate::models::{Item, ItemStateChange, NewItem, NewReviewRecord, ReviewRecord, Stage, Transition};
use crate::registry::DefinitionRegistry;
use crate::services::{HistoryLedger, ReviewerResolver};

/// One action submitted against an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub item_id: i64,
    pub actor_id: i64,
    /// Case-insensitive action name
    pub action: String,
    pub comment: Option<String>,
    /// Preferred next reviewer, honored only when eligible
    pub requested_next_reviewer: Option<i64>,
    /// Version the caller last saw; a mismatch fails with `Conflict`
    pub expected_version: Option<i64>,
}

impl ApplyRequest {
    pub fn new(item_id: i64, actor_id: i64, action: impl Into<String>) -> Self {
        Self {
            item_id,
            actor_id,
            action: action.into(),
            comment: None,
            requested_next_reviewer: None,
            expected_version: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_next_reviewer(mut self, reviewer_id: i64) -> Self {
        self.requested_next_reviewer = Some(reviewer_id);
        self
    }

    pub fn expecting_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Request to start a new item at the first stage of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItemRequest {
    pub template_id: i64,
    pub creator_id: i64,
    pub title: String,
    pub requested_reviewer: Option<i64>,
}

impl CreateItemRequest {
    pub fn new(template_id: i64, creator_id: i64, title: impl Into<String>) -> Self {
        Self {
            template_id,
            creator_id,
            title: title.into(),
            requested_reviewer: None,
        }
    }

    pub fn with_reviewer(mut self, reviewer_id: i64) -> Self {
        self.requested_reviewer = Some(reviewer_id);
        self
    }
}

/// Target state computed for an item
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedState {
    status: String,
    stage_id: Option<i64>,
    reviewer_id: Option<i64>,
}

impl PlannedState {
    fn terminal(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            stage_id: None,
            reviewer_id: None,
        }
    }
}

/// True when a record moved its item into a terminal status
pub fn is_completed(record: &ReviewRecord) -> bool {
    is_terminal_status(&record.new_status)
}

pub struct TransitionEngine {
    store: Arc<dyn ReviewStore>,
    directory: Arc<dyn IdentityDirectory>,
    registry: Arc<DefinitionRegistry>,
    resolver: Arc<ReviewerResolver>,
    ledger: Arc<HistoryLedger>,
    locks: ItemLocks,
    mode: ConcurrencyMode,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("mode", &self.mode)
            .field("active_locks", &self.locks.active())
            .finish_non_exhaustive()
    }
}

impl TransitionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ReviewStore>,
        directory: Arc<dyn IdentityDirectory>,
        registry: Arc<DefinitionRegistry>,
        resolver: Arc<ReviewerResolver>,
        ledger: Arc<HistoryLedger>,
        mode: ConcurrencyMode,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            registry,
            resolver,
            ledger,
            locks: ItemLocks::new(),
            mode,
            clock,
        }
    }

    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Apply an action to an item and return the ledger record it produced
    pub async fn apply(&self, request: ApplyRequest) -> Result<ReviewRecord> {
        let result = match self.mode {
            ConcurrencyMode::Locking => {
                let _lock = self.locks.acquire(request.item_id).await;
                self.apply_unlocked(&request).await
            }
            ConcurrencyMode::Optimistic => self.apply_unlocked(&request).await,
        };

        match &result {
            Ok(record) => log_review_operation(
                "apply",
                Some(record.item_id),
                Some(record.actor_id),
                Some(&record.action),
                Some(&record.previous_status),
                Some(&record.new_status),
            ),
            Err(err) if !err.is_client_error() => log_error(
                "transition_engine",
                "apply",
                &err.to_string(),
                Some(&format!(
                    "item_id={} actor_id={} action={}",
                    request.item_id, request.actor_id, request.action
                )),
            ),
            Err(err) => debug!(
                item_id = request.item_id,
                actor_id = request.actor_id,
                action = %request.action,
                code = err.code(),
                error = %err,
                "Action refused"
            ),
        }

        result
    }

    async fn apply_unlocked(&self, request: &ApplyRequest) -> Result<ReviewRecord> {
        let item = self
            .store
            .get_item(request.item_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("item", request.item_id))?;

        if let Some(expected) = request.expected_version {
            if expected != item.version {
                return Err(ReviewError::Conflict {
                    item_id: item.item_id,
                    expected,
                    actual: item.version,
                });
            }
        }

        let action = ReviewAction::parse(&request.action);
        let stage = match item.current_stage_id {
            Some(stage_id) => Some(self.registry.stage(stage_id).await?),
            None => None,
        };
        let roles = self.directory.roles_of(request.actor_id).await?;

        check_eligibility(&ReviewContext {
            item: &item,
            stage: stage.as_ref(),
            actor_id: request.actor_id,
            actor_roles: &roles,
            action: &action,
        })?;

        let planned = match &action {
            ReviewAction::Resubmit => self.plan_resubmit(&item, stage.as_ref(), request).await?,
            _ => {
                let stage = stage.as_ref().ok_or_else(|| {
                    ReviewError::invalid_state(format!("Item {} is not reviewable", item.item_id))
                })?;
                let transition = self
                    .registry
                    .resolve_transition(stage.stage_id, action.as_str())
                    .await?;

                match action {
                    ReviewAction::Reject => {
                        PlannedState::terminal(ReviewStatus::Rejected.to_string())
                    }
                    ReviewAction::Return => {
                        self.plan_return(&item, stage, request.actor_id).await?
                    }
                    _ => self.plan_advance(&transition, request).await?,
                }
            }
        };

        let now = self.clock.now();
        let change = ItemStateChange {
            item_id: item.item_id,
            expected_version: item.version,
            status: planned.status.clone(),
            current_stage_id: planned.stage_id,
            current_reviewer_id: planned.reviewer_id,
            changed_at: now,
        };
        let record = NewReviewRecord {
            item_id: item.item_id,
            actor_id: request.actor_id,
            action: action.as_str().to_string(),
            previous_status: item.status.clone(),
            new_status: planned.status,
            stage_id: item.current_stage_id,
            next_reviewer_id: planned.reviewer_id,
            comment: request.comment.clone(),
            reviewed_at: now,
        };

        let (updated, record) = self.ledger.append(change, record).await?;

        for reviewer in [item.current_reviewer_id, updated.current_reviewer_id]
            .into_iter()
            .flatten()
        {
            self.resolver.invalidate_workload(reviewer);
        }

        info!(
            item_id = updated.item_id,
            action = %record.action,
            from = %record.previous_status,
            to = %record.new_status,
            stage_id = ?updated.current_stage_id,
            reviewer_id = ?updated.current_reviewer_id,
            version = updated.version,
            "Committed item transition"
        );

        Ok(record)
    }

    /// Approve and custom actions: follow the transition's destination
    async fn plan_advance(&self, transition: &Transition, request: &ApplyRequest) -> Result<PlannedState> {
        let Some(next_stage_id) = transition.next_stage_id else {
            return Ok(PlannedState::terminal(transition.result_status.clone()));
        };

        let next_stage = self.registry.stage(next_stage_id).await?;
        let reviewer = self
            .require_reviewer(
                &next_stage,
                request.requested_next_reviewer,
                Some(request.actor_id),
            )
            .await?;

        Ok(PlannedState {
            status: transition.result_status.clone(),
            stage_id: Some(next_stage.stage_id),
            reviewer_id: Some(reviewer),
        })
    }

    /// Back to the most recent other approver, else to the creator
    async fn plan_return(&self, item: &Item, stage: &Stage, actor_id: i64) -> Result<PlannedState> {
        let previous = self
            .ledger
            .find_previous_approval(item.item_id, stage.stage_id, actor_id)
            .await?;

        if let Some((prior_stage_id, prior_actor)) =
            previous.and_then(|r| r.stage_id.map(|stage_id| (stage_id, r.actor_id)))
        {
            let prior_stage = self.registry.stage(prior_stage_id).await?;
            if let Some(reviewer) = self
                .resolver
                .resolve(&prior_stage, Some(prior_actor), Some(actor_id))
                .await?
            {
                return Ok(PlannedState {
                    status: ReviewStatus::ReturnedToReviewer.to_string(),
                    stage_id: Some(prior_stage.stage_id),
                    reviewer_id: Some(reviewer),
                });
            }
            debug!(
                item_id = item.item_id,
                prior_stage_id,
                "No eligible reviewer at prior stage, returning to creator"
            );
        }

        Ok(PlannedState {
            status: ReviewStatus::ReturnedToCreator.to_string(),
            stage_id: None,
            reviewer_id: Some(item.created_by),
        })
    }

    /// Re-enter stage 1 (returned to creator) or the stage the item was
    /// returned from (returned to reviewer)
    async fn plan_resubmit(
        &self,
        item: &Item,
        stage: Option<&Stage>,
        request: &ApplyRequest,
    ) -> Result<PlannedState> {
        let (target, hint) = match ReviewStatus::from(item.status.as_str()) {
            ReviewStatus::ReturnedToCreator => (
                self.registry.first_stage(item.template_id).await?,
                request.requested_next_reviewer,
            ),
            ReviewStatus::ReturnedToReviewer => {
                let last_return = self.ledger.last_return(item.item_id).await?;
                let target = match last_return.as_ref().and_then(|r| r.stage_id) {
                    Some(stage_id) => self.registry.stage(stage_id).await?,
                    None => stage.cloned().ok_or_else(|| {
                        ReviewError::invalid_state(format!(
                            "Item {} has no stage to resubmit to",
                            item.item_id
                        ))
                    })?,
                };
                let hint = request
                    .requested_next_reviewer
                    .or(last_return.map(|r| r.actor_id));
                (target, hint)
            }
            _ => {
                return Err(ReviewError::invalid_state(format!(
                    "Item {} cannot be resubmitted from status '{}'",
                    item.item_id, item.status
                )))
            }
        };

        let reviewer = self
            .require_reviewer(&target, hint, Some(request.actor_id))
            .await?;

        Ok(PlannedState {
            status: pending_status_for_order(target.stage_order),
            stage_id: Some(target.stage_id),
            reviewer_id: Some(reviewer),
        })
    }

    async fn require_reviewer(
        &self,
        stage: &Stage,
        requested: Option<i64>,
        exclude_actor_id: Option<i64>,
    ) -> Result<i64> {
        self.resolver
            .resolve(stage, requested, exclude_actor_id)
            .await?
            .ok_or_else(|| {
                ReviewError::invalid_state(format!(
                    "No eligible reviewer for stage '{}' (role {})",
                    stage.name, stage.required_role_id
                ))
            })
    }

    /// Start a new item at stage 1 of an active template
    pub async fn create_item(&self, request: CreateItemRequest) -> Result<Item> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(ReviewError::validation("Item title must not be empty"));
        }

        let definition = self.registry.definition(request.template_id).await?;
        if !definition.template.is_active {
            return Err(ReviewError::invalid_state(format!(
                "Template {} is not active",
                request.template_id
            )));
        }

        if !self.directory.user_exists(request.creator_id).await? {
            return Err(ReviewError::not_found("user", request.creator_id));
        }

        let first_stage = definition.first_stage().ok_or(ReviewError::NotFound {
            entity: "stage order",
            id: 1,
        })?;
        let reviewer = self
            .require_reviewer(
                first_stage,
                request.requested_reviewer.filter(|id| *id != request.creator_id),
                Some(request.creator_id),
            )
            .await?;

        let item = self
            .store
            .add_item(NewItem {
                template_id: request.template_id,
                title: title.to_string(),
                created_by: request.creator_id,
                status: pending_status_for_order(first_stage.stage_order),
                current_stage_id: Some(first_stage.stage_id),
                current_reviewer_id: Some(reviewer),
                created_at: self.clock.now(),
            })
            .await?;

        self.resolver.invalidate_workload(reviewer);
        log_review_operation(
            "create_item",
            Some(item.item_id),
            Some(item.created_by),
            None,
            None,
            Some(&item.status),
        );

        Ok(item)
    }
}
