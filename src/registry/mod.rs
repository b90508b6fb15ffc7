//! # Registry
//!
//! Published workflow definitions.

pub mod definition_registry;

pub use definition_registry::{DefinitionRegistry, WorkflowDefinition};
