//! # Data Layer
//!
//! Entities of the approval workflow. Relationships are expressed through ids
//! resolved via the persistence gateway; no model holds a reference to
//! another.

pub mod item;
pub mod review_record;
pub mod stage;
pub mod template;
pub mod transition;
pub mod views;

pub use item::{Item, ItemQuery, ItemStateChange, NewItem};
pub use review_record::{NewReviewRecord, ReviewRecord};
pub use stage::Stage;
pub use template::{
    NewWorkflowDefinition, NewWorkflowTemplate, StageDefinition, TemplateDefinition,
    TransitionDefinition, WorkflowTemplate,
};
pub use transition::{NewTransition, Transition};
pub use views::{
    AvailableAction, ItemDetailView, PendingItemView, ReviewDuration, ReviewHistoryEntry,
    ReviewHistoryView, ReviewSummary, StageView, Timeline, TimelineEvent,
};
