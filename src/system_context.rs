//! # System Context
//!
//! Dependency container wiring the gateways, caches and services into one
//! engine instance. Tests build it from in-memory gateways via
//! [`SystemContext::from_parts`]; deployments use [`SystemContext::new`].

use std::sync::Arc;
use tracing::info;

use crate::cache::{Clock, SystemClock};
use crate::config::ConfigManager;
use crate::database::{connect, run_migrations, PgDirectory, PgReviewStore};
use crate::error::Result;
use crate::gateway::{AuthorizationGateway, IdentityDirectory, ReviewStore};
use crate::logging::init_structured_logging;
use crate::registry::DefinitionRegistry;
use crate::services::{HistoryLedger, ReviewerResolver, VisibilityProjection};
use crate::state_machine::TransitionEngine;

pub struct SystemContext {
    pub config_manager: Arc<ConfigManager>,
    pub store: Arc<dyn ReviewStore>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub authorization: Arc<dyn AuthorizationGateway>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<DefinitionRegistry>,
    pub resolver: Arc<ReviewerResolver>,
    pub ledger: Arc<HistoryLedger>,
    pub engine: Arc<TransitionEngine>,
    pub visibility: Arc<VisibilityProjection>,
}

impl std::fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("environment", &self.config_manager.environment())
            .field("store", &"Arc<dyn ReviewStore>")
            .field("directory", &"Arc<dyn IdentityDirectory>")
            .field("authorization", &"Arc<dyn AuthorizationGateway>")
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl SystemContext {
    /// Load configuration for the detected environment, start logging,
    /// connect to PostgreSQL and apply migrations.
    pub async fn new() -> Result<Self> {
        let config_manager = ConfigManager::load()?;
        init_structured_logging(&config_manager.config().logging);
        Self::with_postgres(config_manager).await
    }

    /// PostgreSQL-backed context for an already loaded configuration
    pub async fn with_postgres(config_manager: Arc<ConfigManager>) -> Result<Self> {
        let pool = connect(&config_manager.config().database).await?;
        run_migrations(&pool).await?;

        let directory = Arc::new(PgDirectory::new(pool.clone()));
        Ok(Self::from_parts(
            config_manager,
            Arc::new(PgReviewStore::new(pool)),
            directory.clone(),
            directory,
            Arc::new(SystemClock),
        ))
    }

    /// Wire services over arbitrary gateway implementations
    pub fn from_parts(
        config_manager: Arc<ConfigManager>,
        store: Arc<dyn ReviewStore>,
        directory: Arc<dyn IdentityDirectory>,
        authorization: Arc<dyn AuthorizationGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config_manager.config();

        let registry = Arc::new(DefinitionRegistry::new(store.clone(), directory.clone()));
        let resolver = Arc::new(ReviewerResolver::new(
            store.clone(),
            directory.clone(),
            &config.cache,
            clock.clone(),
        ));
        let ledger = Arc::new(HistoryLedger::new(
            store.clone(),
            directory.clone(),
            registry.clone(),
        ));
        let engine = Arc::new(TransitionEngine::new(
            store.clone(),
            directory.clone(),
            registry.clone(),
            resolver.clone(),
            ledger.clone(),
            config.engine.concurrency_mode,
            clock.clone(),
        ));
        let visibility = Arc::new(VisibilityProjection::new(
            store.clone(),
            directory.clone(),
            authorization.clone(),
            registry.clone(),
            ledger.clone(),
            config.engine.admin_permission.clone(),
        ));

        info!(
            environment = config_manager.environment(),
            concurrency_mode = %config.engine.concurrency_mode,
            cache_enabled = config.cache.enabled,
            "Review system context initialized"
        );

        Self {
            config_manager,
            store,
            directory,
            authorization,
            clock,
            registry,
            resolver,
            ledger,
            engine,
            visibility,
        }
    }
}
