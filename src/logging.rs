//! # Structured Logging Module
//!
//! `tracing-subscriber` initialisation plus helpers that emit review
//! operations with fixed field names so log pipelines can index them.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging.
///
/// `RUST_LOG` wins over the configured level. Safe to call more than once and
/// tolerant of a global subscriber installed by the host application.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed(),
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Log a committed review operation
pub fn log_review_operation(
    operation: &str,
    item_id: Option<i64>,
    actor_id: Option<i64>,
    action: Option<&str>,
    from_status: Option<&str>,
    to_status: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        item_id = item_id,
        actor_id = actor_id,
        action = action,
        from_status = from_status,
        to_status = to_status,
        timestamp = %Utc::now().to_rfc3339(),
        "REVIEW_OPERATION"
    );
}

/// Log a template registry operation
pub fn log_registry_operation(
    operation: &str,
    template_id: Option<i64>,
    name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        template_id = template_id,
        name = name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "REGISTRY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
