//! Shared fixtures for integration tests: an in-memory review world with a
//! manual clock and a handful of users and roles.

#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use reviewflow_core::cache::ManualClock;
use reviewflow_core::config::{ConcurrencyMode, ConfigManager, ReviewConfig};
use reviewflow_core::constants::permissions;
use reviewflow_core::gateway::{InMemoryDirectory, InMemoryStore};
use reviewflow_core::models::{Item, TemplateDefinition};
use reviewflow_core::state_machine::{ApplyRequest, CreateItemRequest};
use reviewflow_core::{Result, SystemContext, WorkflowDefinition};

pub const CREATOR: i64 = 1;
pub const OTHER_CREATOR: i64 = 2;
pub const MANAGER_A: i64 = 10;
pub const MANAGER_B: i64 = 11;
pub const DIRECTOR_A: i64 = 20;
pub const DIRECTOR_B: i64 = 21;
pub const EXECUTIVE: i64 = 30;
pub const AUDITOR: i64 = 90;
pub const OUTSIDER: i64 = 99;

pub const MANAGER_ROLE: i64 = 1;
pub const DIRECTOR_ROLE: i64 = 2;
pub const EXECUTIVE_ROLE: i64 = 3;
pub const AUDITOR_ROLE: i64 = 9;

pub struct TestWorld {
    pub system: SystemContext,
    pub store: Arc<InMemoryStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub clock: Arc<ManualClock>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_mode(ConcurrencyMode::Locking)
    }

    pub fn with_mode(mode: ConcurrencyMode) -> Self {
        let mut config = ReviewConfig::default();
        config.engine.concurrency_mode = mode;
        Self::with_config(config)
    }

    pub fn with_config(config: ReviewConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap(),
        ));
        seed_directory(&directory);

        let config_manager = ConfigManager::from_config(config, "test").unwrap();
        let system = SystemContext::from_parts(
            config_manager,
            store.clone(),
            directory.clone(),
            directory.clone(),
            clock.clone(),
        );

        Self {
            system,
            store,
            directory,
            clock,
        }
    }

    pub fn tick(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }

    /// Manager then director; both stages can approve, return or reject
    pub async fn two_stage(&self) -> Arc<WorkflowDefinition> {
        self.system
            .registry
            .publish(
                TemplateDefinition::new("2-stage")
                    .with_description("Manager and director sign-off")
                    .created_by(CREATOR)
                    .stage("Manager review", MANAGER_ROLE)
                    .stage("Director review", DIRECTOR_ROLE)
                    .transition(1, "approve", Some(2), "pending_review_level2")
                    .transition(1, "return", None, "returned_to_creator")
                    .transition(1, "reject", None, "rejected")
                    .transition(2, "approve", None, "approved")
                    .transition(2, "return", None, "returned_to_reviewer")
                    .transition(2, "reject", None, "rejected"),
            )
            .await
            .unwrap()
    }

    /// Manager, director, then an executive stage pinned to one person
    pub async fn three_stage_pinned(&self) -> Arc<WorkflowDefinition> {
        self.system
            .registry
            .publish(
                TemplateDefinition::new("3-stage")
                    .stage("Manager review", MANAGER_ROLE)
                    .stage("Director review", DIRECTOR_ROLE)
                    .pinned_stage("Executive sign-off", EXECUTIVE_ROLE, EXECUTIVE)
                    .transition(1, "approve", Some(2), "pending_review_level2")
                    .transition(1, "return", None, "returned_to_creator")
                    .transition(2, "approve", Some(3), "pending_review_level3")
                    .transition(2, "return", None, "returned_to_reviewer")
                    .transition(2, "escalate", Some(3), "pending_review_level3")
                    .transition(3, "approve", None, "completed")
                    .transition(3, "return", None, "returned_to_reviewer")
                    .transition(3, "reject", None, "rejected"),
            )
            .await
            .unwrap()
    }

    pub async fn create(&self, definition: &WorkflowDefinition, title: &str) -> Item {
        self.system
            .engine
            .create_item(CreateItemRequest::new(definition.template_id(), CREATOR, title))
            .await
            .unwrap()
    }

    pub async fn act(&self, item_id: i64, actor_id: i64, action: &str) -> Result<Item> {
        self.tick(5);
        self.system
            .engine
            .apply(ApplyRequest::new(item_id, actor_id, action))
            .await?;
        Ok(self.item(item_id).await)
    }

    pub async fn item(&self, item_id: i64) -> Item {
        use reviewflow_core::gateway::ReviewStore;
        self.store.get_item(item_id).await.unwrap().unwrap()
    }
}

fn seed_directory(directory: &InMemoryDirectory) {
    for (role_id, name) in [
        (MANAGER_ROLE, "manager"),
        (DIRECTOR_ROLE, "director"),
        (EXECUTIVE_ROLE, "executive"),
        (AUDITOR_ROLE, "auditor"),
    ] {
        directory.add_role(role_id, name);
    }

    for (user_id, name, role) in [
        (CREATOR, "Carla Creator", None),
        (OTHER_CREATOR, "Omar Owner", None),
        (MANAGER_A, "Maya Manager", Some(MANAGER_ROLE)),
        (MANAGER_B, "Milo Manager", Some(MANAGER_ROLE)),
        (DIRECTOR_A, "Dana Director", Some(DIRECTOR_ROLE)),
        (DIRECTOR_B, "Dev Director", Some(DIRECTOR_ROLE)),
        (EXECUTIVE, "Eve Executive", Some(EXECUTIVE_ROLE)),
        (AUDITOR, "Ari Auditor", Some(AUDITOR_ROLE)),
        (OUTSIDER, "Oscar Outsider", None),
    ] {
        directory.add_user(user_id, name);
        if let Some(role_id) = role {
            directory.assign_role(user_id, role_id);
        }
    }

    directory.grant_permission(AUDITOR_ROLE, permissions::ADMIN_MANAGE);
}
