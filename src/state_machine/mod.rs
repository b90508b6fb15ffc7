//! # Item State Machine
//!
//! Status vocabulary, review actions, eligibility guards, per-item locks and
//! the transition engine that ties them together.

pub mod events;
pub mod guards;
pub mod item_state_machine;
pub mod locks;
pub mod states;

pub use events::ReviewAction;
pub use guards::{check_eligibility, ReviewContext, ReviewGuard};
pub use item_state_machine::{is_completed, ApplyRequest, CreateItemRequest, TransitionEngine};
pub use locks::ItemLocks;
pub use states::ReviewStatus;
