use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{action_display_name, actions};

/// Actions that drive an item through its stages.
///
/// Parsing is case-insensitive. Any name outside the built-in vocabulary is a
/// `Custom` action, legal only where a template defines a transition for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ReviewAction {
    Approve,
    Return,
    Reject,
    Resubmit,
    Custom(String),
}

impl ReviewAction {
    pub fn parse(name: &str) -> Self {
        let normalized = normalize_action_name(name);
        match normalized.as_str() {
            actions::APPROVE => Self::Approve,
            actions::RETURN => Self::Return,
            actions::REJECT => Self::Reject,
            actions::RESUBMIT => Self::Resubmit,
            _ => Self::Custom(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Approve => actions::APPROVE,
            Self::Return => actions::RETURN,
            Self::Reject => actions::REJECT,
            Self::Resubmit => actions::RESUBMIT,
            Self::Custom(name) => name,
        }
    }

    pub fn display_name(&self) -> String {
        action_display_name(self.as_str())
    }

    /// Moves the item forward along the template's transitions
    pub fn is_advancing(&self) -> bool {
        matches!(self, Self::Approve | Self::Custom(_))
    }
}

/// Lowercase, surrounding whitespace removed
pub fn normalize_action_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for ReviewAction {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<ReviewAction> for String {
    fn from(action: ReviewAction) -> Self {
        action.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(ReviewAction::parse("APPROVE"), ReviewAction::Approve);
        assert_eq!(ReviewAction::parse(" Return "), ReviewAction::Return);
        assert_eq!(
            ReviewAction::parse("Escalate"),
            ReviewAction::Custom("escalate".to_string())
        );
    }

    #[test]
    fn test_advancing_actions() {
        assert!(ReviewAction::Approve.is_advancing());
        assert!(ReviewAction::parse("escalate").is_advancing());
        assert!(!ReviewAction::Reject.is_advancing());
        assert!(!ReviewAction::Resubmit.is_advancing());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ReviewAction::Resubmit.display_name(), "Resubmit");
        assert_eq!(ReviewAction::parse("escalate").display_name(), "escalate");
    }
}
