//! Error types for the review workflow engine.
//!
//! Every operation crossing the engine boundary returns [`ReviewError`] as a
//! typed result. Only storage or other unexpected failures surface as
//! [`ReviewError::Internal`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    /// Item, user, stage or template absent
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Actor lacks the role, is not the current reviewer/creator, or lacks the admin override
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No transition matches the stage + action pair
    #[error("Action '{action}' is not valid for stage {stage_id}")]
    InvalidAction { stage_id: i64, action: String },

    /// Item is not in a state that accepts the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed template definition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Concurrent modification detected
    #[error("Item {item_id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        item_id: i64,
        expected: i64,
        actual: i64,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReviewError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// True for errors caused by the caller's request rather than the system
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidAction { .. } => "invalid_action",
            Self::InvalidState(_) => "invalid_state",
            Self::Validation(_) => "validation_error",
            Self::Conflict { .. } => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for ReviewError {
    fn from(err: sqlx::Error) -> Self {
        ReviewError::Internal(format!("Database error: {err}"))
    }
}

impl From<serde_json::Error> for ReviewError {
    fn from(err: serde_json::Error) -> Self {
        ReviewError::Internal(format!("Serialization error: {err}"))
    }
}

impl From<crate::config::ConfigurationError> for ReviewError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        ReviewError::Internal(format!("Configuration error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
