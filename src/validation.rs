//! Structural validation of template definitions.
//!
//! Pure checks with no storage access. Checks that need the identity
//! directory (roles and pinned reviewers exist) live in the definition
//! registry.

use std::collections::HashSet;

use crate::constants::{actions, limits};
use crate::error::{ReviewError, Result};
use crate::models::{TemplateDefinition, TransitionDefinition};
use crate::state_machine::events::{normalize_action_name, ReviewAction};
use crate::state_machine::states::{is_returned_status, is_terminal_status};

/// Actions that cannot appear in a transition table
const RESERVED_ACTIONS: [&str; 2] = [actions::RESUBMIT, actions::CREATED];

/// Validates a complete definition before anything is persisted
pub fn validate_template_definition(definition: &TemplateDefinition) -> Result<()> {
    if definition.name.trim().is_empty() {
        return Err(ReviewError::validation("Template name must not be empty"));
    }
    check_length("Template name", definition.name.trim(), limits::MAX_NAME_LENGTH)?;

    if definition.stages.is_empty() {
        return Err(ReviewError::validation(format!(
            "Template '{}' must define at least one stage",
            definition.name
        )));
    }

    for stage in &definition.stages {
        if stage.name.trim().is_empty() {
            return Err(ReviewError::validation(format!(
                "Stage {} of template '{}' has an empty name",
                stage.order, definition.name
            )));
        }
        check_length("Stage name", stage.name.trim(), limits::MAX_NAME_LENGTH)?;
    }

    let orders: Vec<i32> = definition.stages.iter().map(|s| s.order).collect();
    validate_stage_orders(&orders)?;

    let order_set: HashSet<i32> = orders.into_iter().collect();
    validate_transitions(&order_set, &[], &definition.transitions)
}

/// Stage orders must be exactly `1..=N`
pub fn validate_stage_orders(orders: &[i32]) -> Result<()> {
    let mut sorted = orders.to_vec();
    sorted.sort_unstable();

    let contiguous = sorted
        .iter()
        .enumerate()
        .all(|(index, order)| *order == index as i32 + 1);

    if contiguous {
        Ok(())
    } else {
        Err(ReviewError::validation(format!(
            "Stage orders must form a contiguous sequence 1..{}, got {:?}",
            orders.len(),
            sorted
        )))
    }
}

/// Validates new transitions against the stage orders of their template.
///
/// `existing` holds `(from_order, action)` pairs already stored; a new
/// transition may not repeat one of them or another new transition.
pub fn validate_transitions(
    stage_orders: &HashSet<i32>,
    existing: &[(i32, String)],
    transitions: &[TransitionDefinition],
) -> Result<()> {
    let mut seen: HashSet<(i32, String)> = existing
        .iter()
        .map(|(order, action)| (*order, normalize_action_name(action)))
        .collect();

    for transition in transitions {
        let action = normalize_action_name(&transition.action);

        if action.is_empty() {
            return Err(ReviewError::validation(format!(
                "Transition from stage {} has an empty action name",
                transition.from_order
            )));
        }

        if RESERVED_ACTIONS.contains(&action.as_str()) {
            return Err(ReviewError::validation(format!(
                "Action '{action}' is reserved and cannot be declared as a transition"
            )));
        }

        if transition.result_status.trim().is_empty() {
            return Err(ReviewError::validation(format!(
                "Transition '{action}' from stage {} has an empty result status",
                transition.from_order
            )));
        }

        check_length("Action name", &action, limits::MAX_ACTION_LENGTH)?;
        check_length(
            "Result status",
            transition.result_status.trim(),
            limits::MAX_STATUS_LENGTH,
        )?;
        validate_result_status(&action, transition)?;

        if !stage_orders.contains(&transition.from_order) {
            return Err(ReviewError::validation(format!(
                "Transition '{action}' references unknown source stage {}",
                transition.from_order
            )));
        }

        if let Some(to) = transition.to_order {
            if !stage_orders.contains(&to) {
                return Err(ReviewError::validation(format!(
                    "Transition '{action}' from stage {} references unknown destination stage {to}",
                    transition.from_order
                )));
            }
        }

        if !seen.insert((transition.from_order, action.clone())) {
            return Err(ReviewError::validation(format!(
                "Stage {} already has a '{action}' transition",
                transition.from_order
            )));
        }
    }

    Ok(())
}

/// The declared result status must agree with where the transition leads.
///
/// Approve and custom actions reach a terminal status exactly when they have
/// no destination. Reject is always terminal. Return ignores its destination
/// and records a returned status; no other action may declare one.
fn validate_result_status(action: &str, transition: &TransitionDefinition) -> Result<()> {
    let status = transition.result_status.trim();
    let from = transition.from_order;
    let terminal = is_terminal_status(status);
    let returned = is_returned_status(status);

    let problem = match ReviewAction::parse(action) {
        ReviewAction::Return if !returned => Some(format!(
            "must declare a returned status, not '{status}'"
        )),
        ReviewAction::Return => None,
        _ if returned => Some(format!(
            "may not declare the returned status '{status}'"
        )),
        ReviewAction::Reject if transition.to_order.is_some() || !terminal => Some(format!(
            "must be terminal with no destination stage, got '{status}'"
        )),
        advancing if advancing.is_advancing() => match transition.to_order {
            Some(to) if terminal => Some(format!(
                "moves to stage {to} but declares the terminal status '{status}'"
            )),
            None if !terminal => Some(format!(
                "has no destination stage but declares the non-terminal status '{status}'"
            )),
            _ => None,
        },
        _ => None,
    };

    match problem {
        Some(problem) => Err(ReviewError::validation(format!(
            "Transition '{action}' from stage {from} {problem}"
        ))),
        None => Ok(()),
    }
}

fn check_length(field: &str, value: &str, max: usize) -> Result<()> {
    let length = value.chars().count();
    if length > max {
        return Err(ReviewError::validation(format!(
            "{field} is {length} characters long; the limit is {max}"
        )));
    }
    Ok(())
}
