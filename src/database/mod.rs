//! # Database Operations
//!
//! PostgreSQL implementations of the gateways, built on SQLx runtime
//! queries, plus pool setup and schema migrations.
//!
//! ```rust,no_run
//! use reviewflow_core::config::DatabaseConfig;
//! use reviewflow_core::database::{connect, run_migrations, PgReviewStore};
//!
//! # async fn example() -> reviewflow_core::Result<()> {
//! let pool = connect(&DatabaseConfig::default()).await?;
//! run_migrations(&pool).await?;
//! let store = PgReviewStore::new(pool);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod migrations;
pub mod pg_directory;
pub mod pg_store;

pub use connection::connect;
pub use migrations::run_migrations;
pub use pg_directory::PgDirectory;
pub use pg_store::PgReviewStore;
