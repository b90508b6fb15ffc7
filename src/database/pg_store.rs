//! PostgreSQL persistence gateway.
//!
//! Item updates are conditional on the stored `version`; the update and the
//! ledger insert share one transaction. Template writes run in a transaction
//! holding the template row `FOR UPDATE`, and item inserts hold it `FOR SHARE`,
//! so transitions are never added once an item references the template.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::debug;

use crate::constants::statuses;
use crate::error::{ReviewError, Result};
use crate::gateway::ReviewStore;
use crate::models::{
    Item, ItemQuery, ItemStateChange, NewItem, NewReviewRecord, NewTransition,
    NewWorkflowDefinition, ReviewRecord, Stage, StageDefinition, Transition, WorkflowTemplate,
};

const ITEM_COLUMNS: &str = "item_id, template_id, title, created_by, created_at, status, \
     current_stage_id, current_reviewer_id, version, updated_at";

const STAGE_COLUMNS: &str =
    "stage_id, template_id, name, stage_order, required_role_id, pinned_reviewer_id";

const TRANSITION_COLUMNS: &str = "transition_id, stage_id, action_name, next_stage_id, result_status";

const RECORD_COLUMNS: &str = "review_id, item_id, actor_id, action, previous_status, new_status, \
     stage_id, next_reviewer_id, comment, reviewed_at";

#[derive(Debug, Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `LIKE` pattern matching values that start with `prefix`
fn prefix_pattern(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

fn push_item_filter(builder: &mut QueryBuilder<'_, Postgres>, query: &ItemQuery) {
    builder.push("(TRUE");
    if let Some(reviewer_id) = query.current_reviewer_id {
        builder.push(" AND current_reviewer_id = ").push_bind(reviewer_id);
    }
    if let Some(creator_id) = query.created_by {
        builder.push(" AND created_by = ").push_bind(creator_id);
    }
    if let Some(status) = &query.status {
        builder.push(" AND status = ").push_bind(status.clone());
    }
    if !query.any_of.is_empty() {
        builder.push(" AND (FALSE");
        for alternative in &query.any_of {
            builder.push(" OR ");
            push_item_filter(builder, alternative);
        }
        builder.push(")");
    }
    builder.push(")");
}

async fn insert_stage(
    conn: &mut PgConnection,
    template_id: i64,
    stage: StageDefinition,
) -> Result<Stage> {
    Ok(sqlx::query_as::<_, Stage>(&format!(
        "INSERT INTO review_stages \
         (template_id, name, stage_order, required_role_id, pinned_reviewer_id) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {STAGE_COLUMNS}"
    ))
    .bind(template_id)
    .bind(stage.name)
    .bind(stage.order)
    .bind(stage.required_role_id)
    .bind(stage.pinned_reviewer_id)
    .fetch_one(&mut *conn)
    .await?)
}

async fn insert_transition(conn: &mut PgConnection, transition: NewTransition) -> Result<Transition> {
    let stage_id = transition.stage_id;
    let action = transition.action_name.clone();

    sqlx::query_as::<_, Transition>(&format!(
        "INSERT INTO review_transitions (stage_id, action_name, next_stage_id, result_status) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {TRANSITION_COLUMNS}"
    ))
    .bind(transition.stage_id)
    .bind(transition.action_name)
    .bind(transition.next_stage_id)
    .bind(transition.result_status)
    .fetch_one(&mut *conn)
    .await
    .map_err(|err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ReviewError::validation(format!(
            "Stage {stage_id} already has a '{action}' transition"
        )),
        _ => ReviewError::from(err),
    })
}

/// Lock a template row for the rest of the transaction
async fn lock_template(conn: &mut PgConnection, template_id: i64, mode: &str) -> Result<()> {
    let locked: Option<(i64,)> = sqlx::query_as(&format!(
        "SELECT template_id FROM review_templates WHERE template_id = $1 FOR {mode}"
    ))
    .bind(template_id)
    .fetch_optional(&mut *conn)
    .await?;

    locked
        .map(|_| ())
        .ok_or_else(|| ReviewError::not_found("template", template_id))
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn get_template(&self, template_id: i64) -> Result<Option<WorkflowTemplate>> {
        Ok(sqlx::query_as::<_, WorkflowTemplate>(
            "SELECT template_id, name, description, is_active, created_by, created_at \
             FROM review_templates WHERE template_id = $1",
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_stage(&self, stage_id: i64) -> Result<Option<Stage>> {
        Ok(sqlx::query_as::<_, Stage>(
            "SELECT stage_id, template_id, name, stage_order, required_role_id, pinned_reviewer_id \
             FROM review_stages WHERE stage_id = $1",
        )
        .bind(stage_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn stages_for_template(&self, template_id: i64) -> Result<Vec<Stage>> {
        Ok(sqlx::query_as::<_, Stage>(
            "SELECT stage_id, template_id, name, stage_order, required_role_id, pinned_reviewer_id \
             FROM review_stages WHERE template_id = $1 ORDER BY stage_order, stage_id",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn transitions_for_template(&self, template_id: i64) -> Result<Vec<Transition>> {
        Ok(sqlx::query_as::<_, Transition>(
            "SELECT t.transition_id, t.stage_id, t.action_name, t.next_stage_id, t.result_status \
             FROM review_transitions t \
             INNER JOIN review_stages s ON s.stage_id = t.stage_id \
             WHERE s.template_id = $1 ORDER BY t.transition_id",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_definition(
        &self,
        definition: NewWorkflowDefinition,
    ) -> Result<(WorkflowTemplate, Vec<Stage>, Vec<Transition>)> {
        let mut tx = self.pool.begin().await?;

        let template = sqlx::query_as::<_, WorkflowTemplate>(
            "INSERT INTO review_templates (name, description, is_active, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING template_id, name, description, is_active, created_by, created_at",
        )
        .bind(definition.template.name)
        .bind(definition.template.description)
        .bind(definition.template.is_active)
        .bind(definition.template.created_by)
        .bind(definition.template.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let mut stage_defs = definition.stages;
        stage_defs.sort_by_key(|s| s.order);
        let mut stages = Vec::with_capacity(stage_defs.len());
        for stage in stage_defs {
            stages.push(insert_stage(&mut tx, template.template_id, stage).await?);
        }

        let mut transitions = Vec::with_capacity(definition.transitions.len());
        for transition in &definition.transitions {
            let bound = transition.bind_to(&stages)?;
            transitions.push(insert_transition(&mut tx, bound).await?);
        }

        tx.commit().await?;
        debug!(
            template_id = template.template_id,
            stages = stages.len(),
            transitions = transitions.len(),
            "Stored workflow definition"
        );
        Ok((template, stages, transitions))
    }

    async fn add_transitions_if_unreferenced(
        &self,
        template_id: i64,
        transitions: Vec<NewTransition>,
    ) -> Result<Vec<Transition>> {
        let mut tx = self.pool.begin().await?;
        lock_template(&mut tx, template_id, "UPDATE").await?;

        let (referencing,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM review_items WHERE template_id = $1")
                .bind(template_id)
                .fetch_one(&mut *tx)
                .await?;
        if referencing > 0 {
            return Err(ReviewError::invalid_state(format!(
                "Template {template_id} is referenced by {referencing} item(s); publish a new template instead"
            )));
        }

        let foreign: Option<(i64,)> = sqlx::query_as(
            "SELECT s.stage_id FROM UNNEST($2::BIGINT[]) AS s(stage_id) \
             WHERE NOT EXISTS (SELECT 1 FROM review_stages r \
                               WHERE r.stage_id = s.stage_id AND r.template_id = $1) \
             LIMIT 1",
        )
        .bind(template_id)
        .bind(
            transitions
                .iter()
                .flat_map(|t| std::iter::once(t.stage_id).chain(t.next_stage_id))
                .collect::<Vec<i64>>(),
        )
        .fetch_optional(&mut *tx)
        .await?;
        if let Some((stage_id,)) = foreign {
            return Err(ReviewError::validation(format!(
                "Stage {stage_id} does not belong to template {template_id}"
            )));
        }

        let mut added = Vec::with_capacity(transitions.len());
        for transition in transitions {
            added.push(insert_transition(&mut tx, transition).await?);
        }

        tx.commit().await?;
        Ok(added)
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<Item>> {
        Ok(sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM review_items WHERE item_id = $1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_items(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {ITEM_COLUMNS} FROM review_items WHERE "));
        push_item_filter(&mut builder, query);
        builder.push(" ORDER BY item_id");

        debug!(sql = builder.sql(), "Finding items");
        Ok(builder
            .build_query_as::<Item>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn add_item(&self, item: NewItem) -> Result<Item> {
        let mut tx = self.pool.begin().await?;
        lock_template(&mut tx, item.template_id, "SHARE").await?;

        let stored = sqlx::query_as::<_, Item>(&format!(
            "INSERT INTO review_items \
             (template_id, title, created_by, created_at, status, current_stage_id, \
              current_reviewer_id, version, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $4) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item.template_id)
        .bind(item.title)
        .bind(item.created_by)
        .bind(item.created_at)
        .bind(item.status)
        .bind(item.current_stage_id)
        .bind(item.current_reviewer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn count_pending_by_reviewer(&self, reviewer_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT current_reviewer_id, COUNT(*) FROM review_items \
             WHERE current_reviewer_id = ANY($1) AND status LIKE $2 \
             GROUP BY current_reviewer_id",
        )
        .bind(reviewer_ids)
        .bind(prefix_pattern(statuses::PENDING_PREFIX))
        .fetch_all(&self.pool)
        .await?;

        let mut counts: HashMap<i64, i64> = reviewer_ids.iter().map(|id| (*id, 0)).collect();
        counts.extend(rows);
        Ok(counts)
    }

    async fn records_for_item(&self, item_id: i64) -> Result<Vec<ReviewRecord>> {
        Ok(sqlx::query_as::<_, ReviewRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM review_records \
             WHERE item_id = $1 ORDER BY reviewed_at, review_id"
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn commit_transition(
        &self,
        change: ItemStateChange,
        record: NewReviewRecord,
    ) -> Result<(Item, ReviewRecord)> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Item>(&format!(
            "UPDATE review_items \
             SET status = $2, current_stage_id = $3, current_reviewer_id = $4, \
                 version = version + 1, updated_at = $5 \
             WHERE item_id = $1 AND version = $6 \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(change.item_id)
        .bind(&change.status)
        .bind(change.current_stage_id)
        .bind(change.current_reviewer_id)
        .bind(change.changed_at)
        .bind(change.expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(item) = updated else {
            let current: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM review_items WHERE item_id = $1")
                    .bind(change.item_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(match current {
                Some((actual,)) => ReviewError::Conflict {
                    item_id: change.item_id,
                    expected: change.expected_version,
                    actual,
                },
                None => ReviewError::not_found("item", change.item_id),
            });
        };

        let stored = sqlx::query_as::<_, ReviewRecord>(&format!(
            "INSERT INTO review_records \
             (item_id, actor_id, action, previous_status, new_status, stage_id, \
              next_reviewer_id, comment, reviewed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(record.item_id)
        .bind(record.actor_id)
        .bind(record.action)
        .bind(record.previous_status)
        .bind(record.new_status)
        .bind(record.stage_id)
        .bind(record.next_reviewer_id)
        .bind(record.comment)
        .bind(record.reviewed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((item, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_pattern_escapes_wildcards() {
        assert_eq!(prefix_pattern("pending"), "pending%");
        assert_eq!(prefix_pattern("pending_review"), "pending\\_review%");
    }

    #[test]
    fn test_item_filter_sql() {
        let query = ItemQuery::new()
            .or(ItemQuery::new().reviewer(5))
            .or(ItemQuery::new().creator(5).status("returned_to_creator"));
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM review_items WHERE ");
        push_item_filter(&mut builder, &query);
        assert_eq!(
            builder.sql(),
            "SELECT 1 FROM review_items WHERE (TRUE AND (FALSE OR (TRUE AND current_reviewer_id = $1) \
             OR (TRUE AND created_by = $2 AND status = $3)))"
        );
    }
}
