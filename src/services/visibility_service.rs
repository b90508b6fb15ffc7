//! # Visibility Projection
//!
//! Read-only views computed on demand from stored state. Nothing here writes;
//! available actions come from the same guard chain the transition engine
//! enforces, so a listed action is one the user could take right now.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::constants::{action_display_name, labels};
use crate::error::{ReviewError, Result};
use crate::gateway::{AuthorizationGateway, IdentityDirectory, ReviewStore};
use crate::models::{
    AvailableAction, Item, ItemDetailView, ItemQuery, PendingItemView, ReviewHistoryEntry,
    ReviewHistoryView, StageView,
};
use crate::registry::{DefinitionRegistry, WorkflowDefinition};
use crate::services::display_names::{display_name_or_fallback, optional_display_name};
use crate::services::history_ledger::{record_stage_name, HistoryLedger};
use crate::state_machine::events::ReviewAction;
use crate::state_machine::guards::{is_eligible, ReviewContext};
use crate::state_machine::states::{pending_status_for_order, ReviewStatus};

pub struct VisibilityProjection {
    store: Arc<dyn ReviewStore>,
    directory: Arc<dyn IdentityDirectory>,
    authorization: Arc<dyn AuthorizationGateway>,
    registry: Arc<DefinitionRegistry>,
    ledger: Arc<HistoryLedger>,
    admin_permission: String,
}

impl std::fmt::Debug for VisibilityProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityProjection")
            .field("admin_permission", &self.admin_permission)
            .finish_non_exhaustive()
    }
}

impl VisibilityProjection {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        directory: Arc<dyn IdentityDirectory>,
        authorization: Arc<dyn AuthorizationGateway>,
        registry: Arc<DefinitionRegistry>,
        ledger: Arc<HistoryLedger>,
        admin_permission: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            authorization,
            registry,
            ledger,
            admin_permission: admin_permission.into(),
        }
    }

    /// Items waiting on `user_id`, ordered by item id.
    ///
    /// Visible when the user is the current reviewer, or the creator of an
    /// item returned to them.
    pub async fn pending_for(&self, user_id: i64) -> Result<Vec<PendingItemView>> {
        let query = ItemQuery::new()
            .or(ItemQuery::new().reviewer(user_id))
            .or(ItemQuery::new()
                .creator(user_id)
                .status(ReviewStatus::ReturnedToCreator.to_string()));
        let items = self.store.find_items(&query).await?;
        let roles = self.directory.roles_of(user_id).await?;

        let mut views = Vec::with_capacity(items.len());
        for item in items {
            if item.is_terminal() {
                continue;
            }
            let definition = self.registry.definition(item.template_id).await?;
            let available_actions = self
                .available_actions(&definition, &item, user_id, &roles)
                .await?;

            views.push(PendingItemView {
                item_id: item.item_id,
                title: item.title.clone(),
                status: item.status.clone(),
                created_by: item.created_by,
                created_by_name: display_name_or_fallback(self.directory.as_ref(), item.created_by)
                    .await,
                created_at: item.created_at,
                current_stage_name: current_stage_name(&definition, &item),
                current_reviewer_name: optional_display_name(
                    self.directory.as_ref(),
                    item.current_reviewer_id,
                    labels::NO_REVIEWER,
                )
                .await,
                available_actions,
            });
        }

        debug!(user_id, count = views.len(), "Computed pending items");
        Ok(views)
    }

    /// Full view of an item for its creator, its current reviewer, or anyone
    /// holding a role with the administrative permission
    pub async fn detail_for(&self, user_id: i64, item_id: i64) -> Result<ItemDetailView> {
        let item = self.load_item(item_id).await?;
        let roles = self.directory.roles_of(user_id).await?;
        self.ensure_can_view(user_id, &item, &roles).await?;

        let definition = self.registry.definition(item.template_id).await?;

        let mut review_history = Vec::new();
        for record in self.ledger.records_for(item_id).await?.into_iter().rev() {
            review_history.push(ReviewHistoryEntry {
                review_id: record.review_id,
                reviewed_at: record.reviewed_at,
                actor_id: record.actor_id,
                actor_name: display_name_or_fallback(self.directory.as_ref(), record.actor_id)
                    .await,
                stage_name: record_stage_name(&definition, record.stage_id),
                action: record.action,
                comment: record.comment,
                previous_status: record.previous_status,
                new_status: record.new_status,
            });
        }

        let mut all_stages = Vec::with_capacity(definition.stages.len());
        for stage in &definition.stages {
            all_stages.push(StageView {
                stage_id: stage.stage_id,
                name: stage.name.clone(),
                stage_order: stage.stage_order,
                required_role_id: stage.required_role_id,
                pinned_reviewer_name: optional_display_name(
                    self.directory.as_ref(),
                    stage.pinned_reviewer_id,
                    labels::NO_SPECIFIC_REVIEWER,
                )
                .await,
                is_current: item.current_stage_id == Some(stage.stage_id),
            });
        }

        let available_actions = if item.is_terminal() {
            Vec::new()
        } else {
            self.available_actions(&definition, &item, user_id, &roles)
                .await?
        };

        Ok(ItemDetailView {
            item_id: item.item_id,
            title: item.title.clone(),
            status: item.status.clone(),
            version: item.version,
            template_name: definition.template.name.clone(),
            created_by: item.created_by,
            created_by_name: display_name_or_fallback(self.directory.as_ref(), item.created_by)
                .await,
            created_at: item.created_at,
            current_stage_name: current_stage_name(&definition, &item),
            current_reviewer_name: optional_display_name(
                self.directory.as_ref(),
                item.current_reviewer_id,
                labels::NO_REVIEWER,
            )
            .await,
            review_history,
            available_actions,
            all_stages,
        })
    }

    /// Timeline and summary of an item, same access rule as the detail view
    pub async fn history_for(&self, user_id: i64, item_id: i64) -> Result<ReviewHistoryView> {
        let item = self.load_item(item_id).await?;
        let roles = self.directory.roles_of(user_id).await?;
        self.ensure_can_view(user_id, &item, &roles).await?;

        let definition = self.registry.definition(item.template_id).await?;
        let timeline = self.ledger.timeline_for(item_id).await?;
        let summary = HistoryLedger::summarize(&timeline);

        Ok(ReviewHistoryView {
            item_id,
            title: item.title,
            template_name: definition.template.name.clone(),
            timeline,
            summary,
        })
    }

    async fn load_item(&self, item_id: i64) -> Result<Item> {
        self.store
            .get_item(item_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("item", item_id))
    }

    async fn ensure_can_view(&self, user_id: i64, item: &Item, roles: &HashSet<i64>) -> Result<()> {
        if item.created_by == user_id || item.current_reviewer_id == Some(user_id) {
            return Ok(());
        }

        for role_id in roles {
            if self
                .authorization
                .has_permission(*role_id, &self.admin_permission)
                .await?
            {
                debug!(user_id, item_id = item.item_id, role_id, "Administrative view override");
                return Ok(());
            }
        }

        Err(ReviewError::forbidden(format!(
            "User {user_id} may not view item {}",
            item.item_id
        )))
    }

    /// Actions `user_id` may take on `item` right now
    async fn available_actions(
        &self,
        definition: &WorkflowDefinition,
        item: &Item,
        user_id: i64,
        roles: &HashSet<i64>,
    ) -> Result<Vec<AvailableAction>> {
        let stage = item.current_stage_id.and_then(|id| definition.stage(id));

        if item.is_returned() {
            let action = ReviewAction::Resubmit;
            let ctx = ReviewContext {
                item,
                stage,
                actor_id: user_id,
                actor_roles: roles,
                action: &action,
            };
            if !is_eligible(&ctx) {
                return Ok(Vec::new());
            }

            let target = if ctx.is_creator_resubmit() {
                definition.first_stage()
            } else {
                self.ledger
                    .last_return(item.item_id)
                    .await?
                    .and_then(|r| r.stage_id)
                    .and_then(|id| definition.stage(id))
                    .or(stage)
            };

            return Ok(target
                .map(|target| AvailableAction {
                    action_name: action.as_str().to_string(),
                    display_name: action.display_name(),
                    result_status: pending_status_for_order(target.stage_order),
                    next_stage_name: Some(target.name.clone()),
                })
                .into_iter()
                .collect());
        }

        let Some(stage) = stage else {
            return Ok(Vec::new());
        };

        let actions = definition
            .transitions_from(stage.stage_id)
            .filter(|transition| {
                let action = ReviewAction::parse(&transition.action_name);
                is_eligible(&ReviewContext {
                    item,
                    stage: Some(stage),
                    actor_id: user_id,
                    actor_roles: roles,
                    action: &action,
                })
            })
            .map(|transition| AvailableAction {
                action_name: transition.action_name.clone(),
                display_name: action_display_name(&transition.action_name),
                result_status: transition.result_status.clone(),
                next_stage_name: transition
                    .next_stage_id
                    .and_then(|id| definition.stage(id))
                    .map(|s| s.name.clone()),
            })
            .collect();

        Ok(actions)
    }
}

fn current_stage_name(definition: &WorkflowDefinition, item: &Item) -> String {
    match item.current_stage_id {
        Some(id) => definition
            .stage(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| labels::UNKNOWN_STAGE.to_string()),
        None if ReviewStatus::from(item.status.as_str()) == ReviewStatus::ReturnedToCreator => {
            labels::RETURNED_TO_CREATOR_STAGE.to_string()
        }
        None => labels::NO_STAGE.to_string(),
    }
}
