//! # Services
//!
//! Reviewer resolution, the audit ledger and read-side projections.

pub mod display_names;
pub mod history_ledger;
pub mod reviewer_selection_service;
pub mod visibility_service;

pub use display_names::{display_name_or_fallback, fallback_name};
pub use history_ledger::HistoryLedger;
pub use reviewer_selection_service::{ReviewerResolver, ReviewerSelection, SelectionSource};
pub use visibility_service::VisibilityProjection;
