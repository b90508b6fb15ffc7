//! In-memory gateways.
//!
//! `InMemoryStore` keeps each table in a `DashMap` with atomic id sequences.
//! `commit_transition` holds the item's map entry while checking the version
//! and appending the record, which makes it atomic per item. Template writes
//! and item inserts share one mutex so a template's transitions cannot change
//! once an item references it.
//! `InMemoryDirectory` implements both the identity directory and the
//! authorization gateway.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use super::{AuthorizationGateway, IdentityDirectory, ReviewStore};
use crate::error::{ReviewError, Result};
use crate::models::{
    Item, ItemQuery, ItemStateChange, NewItem, NewReviewRecord, NewTransition,
    NewWorkflowDefinition, ReviewRecord, Stage, Transition, WorkflowTemplate,
};
use crate::state_machine::states::is_pending_status;

#[derive(Debug)]
pub struct InMemoryStore {
    templates: DashMap<i64, WorkflowTemplate>,
    stages: DashMap<i64, Stage>,
    transitions: DashMap<i64, Transition>,
    items: DashMap<i64, Item>,
    records: DashMap<i64, Vec<ReviewRecord>>,
    definition_lock: Mutex<()>,
    template_seq: AtomicI64,
    stage_seq: AtomicI64,
    transition_seq: AtomicI64,
    item_seq: AtomicI64,
    record_seq: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
            stages: DashMap::new(),
            transitions: DashMap::new(),
            items: DashMap::new(),
            records: DashMap::new(),
            definition_lock: Mutex::new(()),
            template_seq: AtomicI64::new(1),
            stage_seq: AtomicI64::new(1),
            transition_seq: AtomicI64::new(1),
            item_seq: AtomicI64::new(1),
            record_seq: AtomicI64::new(1),
        }
    }

    fn next(seq: &AtomicI64) -> i64 {
        seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    /// Rows for new transitions, rejecting `(stage, action)` pairs already
    /// stored or repeated within the batch. Nothing is written.
    fn prepare_transitions(&self, transitions: Vec<NewTransition>) -> Result<Vec<Transition>> {
        let mut taken: HashSet<(i64, String)> = self
            .transitions
            .iter()
            .map(|t| (t.stage_id, t.action_name.clone()))
            .collect();

        let mut rows = Vec::with_capacity(transitions.len());
        for transition in transitions {
            if !taken.insert((transition.stage_id, transition.action_name.clone())) {
                return Err(ReviewError::validation(format!(
                    "Stage {} already has a '{}' transition",
                    transition.stage_id, transition.action_name
                )));
            }
            rows.push(transition);
        }

        Ok(rows
            .into_iter()
            .map(|transition| Transition {
                transition_id: Self::next(&self.transition_seq),
                stage_id: transition.stage_id,
                action_name: transition.action_name,
                next_stage_id: transition.next_stage_id,
                result_status: transition.result_status,
            })
            .collect())
    }

    fn write_definition(
        &self,
        definition: NewWorkflowDefinition,
    ) -> Result<(WorkflowTemplate, Vec<Stage>, Vec<Transition>)> {
        let _guard = self.definition_lock.lock();

        let template_id = Self::next(&self.template_seq);
        let template = WorkflowTemplate {
            template_id,
            name: definition.template.name,
            description: definition.template.description,
            is_active: definition.template.is_active,
            created_by: definition.template.created_by,
            created_at: definition.template.created_at,
        };

        let mut stage_defs = definition.stages;
        stage_defs.sort_by_key(|s| s.order);
        let stages: Vec<Stage> = stage_defs
            .into_iter()
            .map(|stage| Stage {
                stage_id: Self::next(&self.stage_seq),
                template_id,
                name: stage.name,
                stage_order: stage.order,
                required_role_id: stage.required_role_id,
                pinned_reviewer_id: stage.pinned_reviewer_id,
            })
            .collect();

        let bound = definition
            .transitions
            .iter()
            .map(|t| t.bind_to(&stages))
            .collect::<Result<Vec<_>>>()?;
        let transitions = self.prepare_transitions(bound)?;

        self.templates.insert(template_id, template.clone());
        for stage in &stages {
            self.stages.insert(stage.stage_id, stage.clone());
        }
        for transition in &transitions {
            self.transitions
                .insert(transition.transition_id, transition.clone());
        }
        Ok((template, stages, transitions))
    }

    fn write_transitions(
        &self,
        template_id: i64,
        transitions: Vec<NewTransition>,
    ) -> Result<Vec<Transition>> {
        let _guard = self.definition_lock.lock();

        if !self.templates.contains_key(&template_id) {
            return Err(ReviewError::not_found("template", template_id));
        }

        let referencing = self
            .items
            .iter()
            .filter(|i| i.template_id == template_id)
            .count();
        if referencing > 0 {
            return Err(ReviewError::invalid_state(format!(
                "Template {template_id} is referenced by {referencing} item(s); publish a new template instead"
            )));
        }

        let own_stage = |stage_id: i64| {
            self.stages
                .get(&stage_id)
                .is_some_and(|s| s.template_id == template_id)
        };
        if let Some(foreign) = transitions
            .iter()
            .find(|t| !own_stage(t.stage_id) || !t.next_stage_id.is_none_or(own_stage))
        {
            return Err(ReviewError::validation(format!(
                "Transition '{}' references a stage outside template {template_id}",
                foreign.action_name
            )));
        }

        let rows = self.prepare_transitions(transitions)?;
        for transition in &rows {
            self.transitions
                .insert(transition.transition_id, transition.clone());
        }
        Ok(rows)
    }

    fn write_item(&self, item: NewItem) -> Item {
        let _guard = self.definition_lock.lock();

        let item_id = Self::next(&self.item_seq);
        let stored = Item {
            item_id,
            template_id: item.template_id,
            title: item.title,
            created_by: item.created_by,
            created_at: item.created_at,
            status: item.status,
            current_stage_id: item.current_stage_id,
            current_reviewer_id: item.current_reviewer_id,
            version: 1,
            updated_at: item.created_at,
        };
        self.items.insert(item_id, stored.clone());
        stored
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn get_template(&self, template_id: i64) -> Result<Option<WorkflowTemplate>> {
        Ok(self.templates.get(&template_id).map(|t| t.clone()))
    }

    async fn get_stage(&self, stage_id: i64) -> Result<Option<Stage>> {
        Ok(self.stages.get(&stage_id).map(|s| s.clone()))
    }

    async fn stages_for_template(&self, template_id: i64) -> Result<Vec<Stage>> {
        let mut stages: Vec<Stage> = self
            .stages
            .iter()
            .filter(|s| s.template_id == template_id)
            .map(|s| s.clone())
            .collect();
        stages.sort_by_key(|s| (s.stage_order, s.stage_id));
        Ok(stages)
    }

    async fn transitions_for_template(&self, template_id: i64) -> Result<Vec<Transition>> {
        let stage_ids: HashSet<i64> = self
            .stages
            .iter()
            .filter(|s| s.template_id == template_id)
            .map(|s| s.stage_id)
            .collect();
        let mut transitions: Vec<Transition> = self
            .transitions
            .iter()
            .filter(|t| stage_ids.contains(&t.stage_id))
            .map(|t| t.clone())
            .collect();
        transitions.sort_by_key(|t| t.transition_id);
        Ok(transitions)
    }

    async fn add_definition(
        &self,
        definition: NewWorkflowDefinition,
    ) -> Result<(WorkflowTemplate, Vec<Stage>, Vec<Transition>)> {
        self.write_definition(definition)
    }

    async fn add_transitions_if_unreferenced(
        &self,
        template_id: i64,
        transitions: Vec<NewTransition>,
    ) -> Result<Vec<Transition>> {
        self.write_transitions(template_id, transitions)
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<Item>> {
        Ok(self.items.get(&item_id).map(|i| i.clone()))
    }

    async fn find_items(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .items
            .iter()
            .filter(|i| query.matches(i.value()))
            .map(|i| i.clone())
            .collect();
        items.sort_by_key(|i| i.item_id);
        Ok(items)
    }

    async fn add_item(&self, item: NewItem) -> Result<Item> {
        Ok(self.write_item(item))
    }

    async fn count_pending_by_reviewer(&self, reviewer_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let mut counts: HashMap<i64, i64> = reviewer_ids.iter().map(|id| (*id, 0)).collect();
        for item in self.items.iter() {
            if !is_pending_status(&item.status) {
                continue;
            }
            if let Some(count) = item
                .current_reviewer_id
                .and_then(|reviewer| counts.get_mut(&reviewer))
            {
                *count += 1;
            }
        }
        Ok(counts)
    }

    async fn records_for_item(&self, item_id: i64) -> Result<Vec<ReviewRecord>> {
        let mut records = self
            .records
            .get(&item_id)
            .map(|r| r.clone())
            .unwrap_or_default();
        records.sort_by(ReviewRecord::chronological);
        Ok(records)
    }

    async fn commit_transition(
        &self,
        change: ItemStateChange,
        record: NewReviewRecord,
    ) -> Result<(Item, ReviewRecord)> {
        let mut item = self
            .items
            .get_mut(&change.item_id)
            .ok_or_else(|| ReviewError::not_found("item", change.item_id))?;

        if item.version != change.expected_version {
            return Err(ReviewError::Conflict {
                item_id: change.item_id,
                expected: change.expected_version,
                actual: item.version,
            });
        }

        item.status = change.status;
        item.current_stage_id = change.current_stage_id;
        item.current_reviewer_id = change.current_reviewer_id;
        item.version += 1;
        item.updated_at = change.changed_at;

        let stored = ReviewRecord {
            review_id: Self::next(&self.record_seq),
            item_id: record.item_id,
            actor_id: record.actor_id,
            action: record.action,
            previous_status: record.previous_status,
            new_status: record.new_status,
            stage_id: record.stage_id,
            next_reviewer_id: record.next_reviewer_id,
            comment: record.comment,
            reviewed_at: record.reviewed_at,
        };
        self.records
            .entry(change.item_id)
            .or_default()
            .push(stored.clone());

        Ok((item.clone(), stored))
    }
}

/// Users, roles and permissions held in memory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: DashMap<i64, String>,
    roles: DashMap<i64, String>,
    memberships: DashMap<i64, HashSet<i64>>,
    grants: DashMap<i64, HashSet<String>>,
    unavailable_names: RwLock<HashSet<i64>>,
    role_member_lookups: AtomicUsize,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: i64, name: impl Into<String>) {
        self.users.insert(user_id, name.into());
    }

    pub fn add_role(&self, role_id: i64, name: impl Into<String>) {
        self.roles.insert(role_id, name.into());
    }

    pub fn assign_role(&self, user_id: i64, role_id: i64) {
        self.memberships.entry(user_id).or_default().insert(role_id);
    }

    pub fn revoke_role(&self, user_id: i64, role_id: i64) {
        if let Some(mut roles) = self.memberships.get_mut(&user_id) {
            roles.remove(&role_id);
        }
    }

    pub fn grant_permission(&self, role_id: i64, permission: impl Into<String>) {
        self.grants.entry(role_id).or_default().insert(permission.into());
    }

    /// Make `display_name` fail for a user, as a flaky directory would
    pub fn make_name_unavailable(&self, user_id: i64) {
        self.unavailable_names.write().insert(user_id);
    }

    /// Number of `users_in_role` calls served so far
    pub fn role_member_lookups(&self) -> usize {
        self.role_member_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn roles_of(&self, user_id: i64) -> Result<HashSet<i64>> {
        Ok(self
            .memberships
            .get(&user_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn users_in_role(&self, role_id: i64) -> Result<Vec<i64>> {
        self.role_member_lookups.fetch_add(1, Ordering::SeqCst);
        let mut members: Vec<i64> = self
            .memberships
            .iter()
            .filter(|m| m.value().contains(&role_id))
            .map(|m| *m.key())
            .collect();
        members.sort_unstable();
        Ok(members)
    }

    async fn role_exists(&self, role_id: i64) -> Result<bool> {
        Ok(self.roles.contains_key(&role_id))
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        Ok(self.users.contains_key(&user_id))
    }

    async fn display_name(&self, user_id: i64) -> Result<String> {
        if self.unavailable_names.read().contains(&user_id) {
            return Err(ReviewError::Internal(format!(
                "directory unavailable for user {user_id}"
            )));
        }
        self.users
            .get(&user_id)
            .map(|n| n.clone())
            .ok_or_else(|| ReviewError::not_found("user", user_id))
    }
}

#[async_trait]
impl AuthorizationGateway for InMemoryDirectory {
    async fn has_permission(&self, role_id: i64, permission: &str) -> Result<bool> {
        Ok(self
            .grants
            .get(&role_id)
            .is_some_and(|perms| perms.contains(permission)))
    }
}
