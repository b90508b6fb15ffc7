//! # History Ledger
//!
//! Append-only audit trail of every action taken on an item, plus the
//! timeline and summary derived from it. Records are written together with
//! the item state they describe and are never updated or deleted.

use std::sync::Arc;
use tracing::debug;

use crate::constants::{action_display_name, actions, labels, status_display_name};
use crate::error::{ReviewError, Result};
use crate::gateway::{IdentityDirectory, ReviewStore};
use crate::models::{
    Item, ItemStateChange, NewReviewRecord, ReviewDuration, ReviewRecord, ReviewSummary, Timeline,
    TimelineEvent,
};
use crate::registry::{DefinitionRegistry, WorkflowDefinition};
use crate::services::display_names::display_name_or_fallback;

pub struct HistoryLedger {
    store: Arc<dyn ReviewStore>,
    directory: Arc<dyn IdentityDirectory>,
    registry: Arc<DefinitionRegistry>,
}

impl std::fmt::Debug for HistoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLedger").finish_non_exhaustive()
    }
}

impl HistoryLedger {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        directory: Arc<dyn IdentityDirectory>,
        registry: Arc<DefinitionRegistry>,
    ) -> Self {
        Self {
            store,
            directory,
            registry,
        }
    }

    /// Write a record together with the item state it produced
    pub async fn append(
        &self,
        change: ItemStateChange,
        record: NewReviewRecord,
    ) -> Result<(Item, ReviewRecord)> {
        if record.item_id != change.item_id {
            return Err(ReviewError::Internal(format!(
                "Ledger record for item {} attached to change of item {}",
                record.item_id, change.item_id
            )));
        }
        self.store.commit_transition(change, record).await
    }

    /// Records of an item, oldest first
    pub async fn records_for(&self, item_id: i64) -> Result<Vec<ReviewRecord>> {
        self.store.records_for_item(item_id).await
    }

    /// Most recent approval taken at a stage other than `current_stage_id` by
    /// someone other than `actor_id`. Ties on timestamp go to the higher id.
    pub async fn find_previous_approval(
        &self,
        item_id: i64,
        current_stage_id: i64,
        actor_id: i64,
    ) -> Result<Option<ReviewRecord>> {
        let records = self.records_for(item_id).await?;
        let found = records
            .into_iter()
            .filter(|r| {
                r.is_approval()
                    && r.actor_id != actor_id
                    && r.stage_id.is_some_and(|stage| stage != current_stage_id)
            })
            .max_by(ReviewRecord::chronological);

        debug!(
            item_id,
            current_stage_id,
            found = found.as_ref().map(|r| r.review_id),
            "Searched ledger for previous approval"
        );
        Ok(found)
    }

    /// Most recent `return` record of an item
    pub async fn last_return(&self, item_id: i64) -> Result<Option<ReviewRecord>> {
        Ok(self
            .records_for(item_id)
            .await?
            .into_iter()
            .filter(ReviewRecord::is_return)
            .max_by(ReviewRecord::chronological))
    }

    /// Creation event followed by every record, oldest first
    pub async fn timeline_for(&self, item_id: i64) -> Result<Timeline> {
        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("item", item_id))?;
        let definition = self.registry.definition(item.template_id).await?;
        let records = self.records_for(item_id).await?;

        let initial_status = records
            .first()
            .map(|r| r.previous_status.clone())
            .unwrap_or_else(|| item.status.clone());

        let mut events = Vec::with_capacity(records.len() + 1);
        events.push(TimelineEvent {
            time: item.created_at,
            stage_name: labels::CREATION_STAGE.to_string(),
            actor_id: item.created_by,
            actor_name: display_name_or_fallback(self.directory.as_ref(), item.created_by).await,
            action: actions::CREATED.to_string(),
            action_display_name: action_display_name(actions::CREATED),
            status_display_name: status_display_name(Some(&initial_status)),
            result_status: initial_status,
            comment: Some(labels::CREATION_COMMENT.to_string()),
        });

        for record in records {
            events.push(TimelineEvent {
                time: record.reviewed_at,
                stage_name: record_stage_name(&definition, record.stage_id),
                actor_id: record.actor_id,
                actor_name: display_name_or_fallback(self.directory.as_ref(), record.actor_id)
                    .await,
                action_display_name: action_display_name(&record.action),
                action: record.action,
                status_display_name: status_display_name(Some(&record.new_status)),
                result_status: record.new_status,
                comment: record.comment,
            });
        }

        Ok(Timeline {
            item_id,
            current_status: item.status,
            events,
        })
    }

    /// Counts and time span over a timeline, creation event excluded
    pub fn summarize(timeline: &Timeline) -> ReviewSummary {
        let reviews: Vec<&TimelineEvent> =
            timeline.events.iter().filter(|e| !e.is_creation()).collect();

        let first = reviews.iter().map(|e| e.time).min();
        let last = reviews.iter().map(|e| e.time).max();
        let total_duration = match (first, last) {
            (Some(first), Some(last)) => ReviewDuration::Elapsed(last - first),
            _ => ReviewDuration::NotStarted,
        };
        let count = |action: &str| reviews.iter().filter(|e| e.action == action).count();

        ReviewSummary {
            total_reviews: reviews.len(),
            first_review_time: first,
            last_review_time: last,
            total_duration,
            approval_count: count(actions::APPROVE),
            return_count: count(actions::RETURN),
            reject_count: count(actions::REJECT),
            current_status_display: status_display_name(Some(&timeline.current_status)),
        }
    }
}

/// Stage label for a ledger record
pub(crate) fn record_stage_name(definition: &WorkflowDefinition, stage_id: Option<i64>) -> String {
    match stage_id {
        Some(id) => definition
            .stage(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| labels::UNKNOWN_STAGE.to_string()),
        None => labels::RETURNED_TO_CREATOR_STAGE.to_string(),
    }
}
