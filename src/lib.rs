#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Reviewflow Core
//!
//! Multi-stage approval workflow engine. Items move through an ordered chain
//! of review stages defined by a template; every action is recorded in an
//! append-only ledger and read back through per-user projections.
//!
//! ## Module Organization
//!
//! - [`registry`] - Template publication and cached workflow definitions
//! - [`services`] - Reviewer resolution, history ledger and visibility projections
//! - [`state_machine`] - Status vocabulary, eligibility guards and the transition engine
//! - [`gateway`] - Storage, authorization and directory traits with in-memory implementations
//! - [`database`] - PostgreSQL gateways and embedded migrations
//! - [`config`] - Layered configuration with environment overrides
//! - [`cache`] - Clock abstraction and TTL caches
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reviewflow_core::cache::SystemClock;
//! use reviewflow_core::config::{ConfigManager, ReviewConfig};
//! use reviewflow_core::gateway::{InMemoryDirectory, InMemoryStore};
//! use reviewflow_core::models::TemplateDefinition;
//! use reviewflow_core::state_machine::{ApplyRequest, CreateItemRequest};
//! use reviewflow_core::SystemContext;
//!
//! # async fn example() -> reviewflow_core::Result<()> {
//! let directory = Arc::new(InMemoryDirectory::new());
//! directory.add_role(1, "editor");
//! directory.add_user(10, "Alice");
//! directory.add_user(20, "Bob");
//! directory.assign_role(20, 1);
//!
//! let config = ConfigManager::from_config(ReviewConfig::default(), "development")?;
//! let system = SystemContext::from_parts(
//!     config,
//!     Arc::new(InMemoryStore::new()),
//!     directory.clone(),
//!     directory,
//!     Arc::new(SystemClock),
//! );
//!
//! let workflow = system
//!     .registry
//!     .publish(
//!         TemplateDefinition::new("Article review")
//!             .stage("Editing", 1)
//!             .transition(1, "approve", None, "approved"),
//!     )
//!     .await?;
//!
//! let item = system
//!     .engine
//!     .create_item(CreateItemRequest::new(workflow.template_id(), 10, "Draft"))
//!     .await?;
//! system
//!     .engine
//!     .apply(ApplyRequest::new(item.item_id, 20, "approve"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod registry;
pub mod services;
pub mod state_machine;
pub mod system_context;
pub mod validation;

pub use crate::config::{ConcurrencyMode, ConfigManager, ReviewConfig};
pub use crate::error::{Result, ReviewError};
pub use crate::registry::{DefinitionRegistry, WorkflowDefinition};
pub use crate::services::{HistoryLedger, ReviewerResolver, VisibilityProjection};
pub use crate::state_machine::{ApplyRequest, CreateItemRequest, TransitionEngine};
pub use crate::system_context::SystemContext;
