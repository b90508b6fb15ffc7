//! # Workflow Definition Registry
//!
//! Publishes templates and serves their stages and transitions. Definitions
//! are read on every transition and change only through `add_transitions`
//! (allowed while no item references the template), so each one is loaded
//! once and cached per template id until that happens.
//!
//! Every template carries a generation bumped on invalidation. A load only
//! fills the cache if the generation it started under is still current, so
//! a read racing `add_transitions` cannot cache the old definition.
//!
//! ```rust,no_run
//! use reviewflow_core::gateway::{InMemoryDirectory, InMemoryStore};
//! use reviewflow_core::models::TemplateDefinition;
//! use reviewflow_core::registry::DefinitionRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> reviewflow_core::Result<()> {
//! let directory = Arc::new(InMemoryDirectory::new());
//! directory.add_role(1, "Manager");
//! let registry = DefinitionRegistry::new(Arc::new(InMemoryStore::new()), directory);
//!
//! let definition = registry
//!     .publish(
//!         TemplateDefinition::new("single sign-off")
//!             .stage("Manager", 1)
//!             .transition(1, "approve", None, "approved"),
//!     )
//!     .await?;
//! assert_eq!(definition.stages.len(), 1);
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ReviewError, Result};
use crate::gateway::{IdentityDirectory, ReviewStore};
use crate::logging::log_registry_operation;
use crate::models::{
    NewWorkflowDefinition, NewWorkflowTemplate, Stage, StageDefinition, TemplateDefinition,
    Transition, TransitionDefinition, WorkflowTemplate,
};
use crate::state_machine::events::normalize_action_name;
use crate::validation::{validate_template_definition, validate_transitions};

/// A template with its stages (ordered) and transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    pub template: WorkflowTemplate,
    pub stages: Vec<Stage>,
    pub transitions: Vec<Transition>,
}

impl WorkflowDefinition {
    pub fn template_id(&self) -> i64 {
        self.template.template_id
    }

    pub fn first_stage(&self) -> Option<&Stage> {
        self.stage_by_order(1)
    }

    pub fn stage_by_order(&self, order: i32) -> Option<&Stage> {
        self.stages.iter().find(|s| s.stage_order == order)
    }

    pub fn stage(&self, stage_id: i64) -> Option<&Stage> {
        self.stages.iter().find(|s| s.stage_id == stage_id)
    }

    pub fn transitions_from(&self, stage_id: i64) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.stage_id == stage_id)
    }

    /// Transition for a stage and a normalized action name
    pub fn transition(&self, stage_id: i64, action: &str) -> Option<&Transition> {
        self.transitions_from(stage_id)
            .find(|t| t.action_name == action)
    }

    /// `(from_order, action)` pairs already defined
    fn transition_keys(&self) -> Vec<(i32, String)> {
        self.transitions
            .iter()
            .filter_map(|t| {
                self.stage(t.stage_id)
                    .map(|s| (s.stage_order, t.action_name.clone()))
            })
            .collect()
    }
}

/// Action lowercased, status trimmed, as stored
fn normalized(transition: &TransitionDefinition) -> TransitionDefinition {
    TransitionDefinition {
        from_order: transition.from_order,
        action: normalize_action_name(&transition.action),
        to_order: transition.to_order,
        result_status: transition.result_status.trim().to_string(),
    }
}

pub struct DefinitionRegistry {
    store: Arc<dyn ReviewStore>,
    directory: Arc<dyn IdentityDirectory>,
    definitions: DashMap<i64, Arc<WorkflowDefinition>>,
    /// stage id -> template id
    stage_index: DashMap<i64, i64>,
    /// template id -> invalidation count
    generations: DashMap<i64, u64>,
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("cached_definitions", &self.definitions.len())
            .finish()
    }
}

impl DefinitionRegistry {
    pub fn new(store: Arc<dyn ReviewStore>, directory: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            store,
            directory,
            definitions: DashMap::new(),
            stage_index: DashMap::new(),
            generations: DashMap::new(),
        }
    }

    /// Structural checks plus directory checks: every stage role exists and
    /// every pinned reviewer exists and holds the stage's role.
    pub async fn validate(&self, definition: &TemplateDefinition) -> Result<()> {
        validate_template_definition(definition)?;

        for stage in &definition.stages {
            if !self.directory.role_exists(stage.required_role_id).await? {
                return Err(ReviewError::validation(format!(
                    "Stage '{}' requires unknown role {}",
                    stage.name, stage.required_role_id
                )));
            }

            if let Some(reviewer_id) = stage.pinned_reviewer_id {
                if !self.directory.user_exists(reviewer_id).await? {
                    return Err(ReviewError::validation(format!(
                        "Stage '{}' is pinned to unknown user {reviewer_id}",
                        stage.name
                    )));
                }
                let roles = self.directory.roles_of(reviewer_id).await?;
                if !roles.contains(&stage.required_role_id) {
                    return Err(ReviewError::validation(format!(
                        "Pinned reviewer {reviewer_id} of stage '{}' does not hold role {}",
                        stage.name, stage.required_role_id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Validate and persist a template with its stages and transitions
    pub async fn publish(&self, definition: TemplateDefinition) -> Result<Arc<WorkflowDefinition>> {
        self.validate(&definition).await?;

        let (template, stages, transitions) = self
            .store
            .add_definition(NewWorkflowDefinition {
                template: NewWorkflowTemplate {
                    name: definition.name.trim().to_string(),
                    description: definition.description.clone(),
                    is_active: true,
                    created_by: definition.created_by,
                    created_at: Utc::now(),
                },
                stages: definition
                    .stages
                    .iter()
                    .map(|stage| StageDefinition {
                        name: stage.name.trim().to_string(),
                        ..stage.clone()
                    })
                    .collect(),
                transitions: definition.transitions.iter().map(normalized).collect(),
            })
            .await?;

        let published = Arc::new(WorkflowDefinition {
            template,
            stages,
            transitions,
        });
        self.cache(Arc::clone(&published));

        log_registry_operation(
            "publish",
            Some(published.template_id()),
            Some(&published.template.name),
            "success",
            None,
        );

        Ok(published)
    }

    /// Attach transitions to a published template no item references yet
    pub async fn add_transitions(
        &self,
        template_id: i64,
        transitions: Vec<TransitionDefinition>,
    ) -> Result<Arc<WorkflowDefinition>> {
        let current = self.definition(template_id).await?;

        let orders: HashSet<i32> = current.stages.iter().map(|s| s.stage_order).collect();
        validate_transitions(&orders, &current.transition_keys(), &transitions)?;

        let bound = transitions
            .iter()
            .map(|t| normalized(t).bind_to(&current.stages))
            .collect::<Result<Vec<_>>>()?;
        let added = self
            .store
            .add_transitions_if_unreferenced(template_id, bound)
            .await?;

        self.invalidate(template_id);
        log_registry_operation(
            "add_transitions",
            Some(template_id),
            Some(&current.template.name),
            "success",
            Some(&format!("{} transition(s) added", added.len())),
        );

        self.definition(template_id).await
    }

    fn cache(&self, definition: Arc<WorkflowDefinition>) {
        for stage in &definition.stages {
            self.stage_index
                .insert(stage.stage_id, definition.template_id());
        }
        self.definitions
            .insert(definition.template_id(), definition);
    }

    /// Drop a template's cached definition; the next read reloads it
    pub fn invalidate(&self, template_id: i64) {
        *self.generations.entry(template_id).or_insert(0) += 1;
        if let Some((_, definition)) = self.definitions.remove(&template_id) {
            for stage in &definition.stages {
                self.stage_index.remove(&stage.stage_id);
            }
            debug!(template_id, "Invalidated cached workflow definition");
        }
    }

    pub async fn definition(&self, template_id: i64) -> Result<Arc<WorkflowDefinition>> {
        if let Some(cached) = self.definitions.get(&template_id) {
            return Ok(Arc::clone(cached.value()));
        }
        let generation = self.generation(template_id);

        let template = self
            .store
            .get_template(template_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("template", template_id))?;
        let stages = self.store.stages_for_template(template_id).await?;
        let transitions = self.store.transitions_for_template(template_id).await?;

        info!(
            template_id,
            stages = stages.len(),
            transitions = transitions.len(),
            "Loaded workflow definition"
        );

        let definition = Arc::new(WorkflowDefinition {
            template,
            stages,
            transitions,
        });
        self.cache_if_current(Arc::clone(&definition), generation);
        Ok(definition)
    }

    fn generation(&self, template_id: i64) -> u64 {
        *self.generations.entry(template_id).or_insert(0)
    }

    /// Cache a definition loaded under `generation` unless the template was
    /// invalidated since. Returns whether it was cached.
    fn cache_if_current(&self, definition: Arc<WorkflowDefinition>, generation: u64) -> bool {
        let template_id = definition.template_id();
        // Holding the generation entry keeps `invalidate` out until cached.
        match self.generations.get(&template_id) {
            Some(current) if *current == generation => {
                self.cache(definition);
                true
            }
            _ => {
                debug!(template_id, "Definition changed while loading, not caching");
                false
            }
        }
    }

    /// Definition of the template a stage belongs to
    pub async fn definition_for_stage(&self, stage_id: i64) -> Result<Arc<WorkflowDefinition>> {
        let indexed = self.stage_index.get(&stage_id).map(|t| *t.value());
        let template_id = match indexed {
            Some(template_id) => template_id,
            None => {
                self.store
                    .get_stage(stage_id)
                    .await?
                    .ok_or_else(|| ReviewError::not_found("stage", stage_id))?
                    .template_id
            }
        };
        self.definition(template_id).await
    }

    pub async fn stage(&self, stage_id: i64) -> Result<Stage> {
        let definition = self.definition_for_stage(stage_id).await?;
        definition
            .stage(stage_id)
            .cloned()
            .ok_or_else(|| ReviewError::not_found("stage", stage_id))
    }

    /// Transition for `(stage, action)`; `InvalidAction` when none exists
    pub async fn resolve_transition(&self, stage_id: i64, action: &str) -> Result<Transition> {
        let definition = self.definition_for_stage(stage_id).await?;
        let action = normalize_action_name(action);
        definition
            .transition(stage_id, &action)
            .cloned()
            .ok_or(ReviewError::InvalidAction { stage_id, action })
    }

    pub async fn first_stage(&self, template_id: i64) -> Result<Stage> {
        self.stage_by_order(template_id, 1).await
    }

    pub async fn stage_by_order(&self, template_id: i64, order: i32) -> Result<Stage> {
        let definition = self.definition(template_id).await?;
        definition
            .stage_by_order(order)
            .cloned()
            .ok_or(ReviewError::NotFound {
                entity: "stage order",
                id: i64::from(order),
            })
    }
}
