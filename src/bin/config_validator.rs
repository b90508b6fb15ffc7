//! # Reviewflow Configuration Validator
//!
//! Loads the layered configuration for an environment, validates it and
//! prints the effective values with sensitive fields masked.

use anyhow::Context;
use clap::{Parser, Subcommand};
use reviewflow_core::config::ConfigManager;
use std::path::PathBuf;
use std::process;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate reviewflow configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the effective configuration as JSON
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match cli.command {
        Some(Commands::Show) => show_config(&cli),
        Some(Commands::Validate) | None => validate_config(&cli),
    };

    if let Err(e) = result {
        error!("Configuration validation failed: {e:#}");
        eprintln!("Configuration invalid: {e:#}");
        process::exit(1);
    }
}

fn load(cli: &Cli) -> anyhow::Result<std::sync::Arc<ConfigManager>> {
    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);

    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
        .with_context(|| format!("loading configuration for environment '{environment}'"))
}

fn validate_config(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    let config = manager.config();

    println!("Environment:      {}", manager.environment());
    println!("Config directory: {}", manager.config_directory().display());
    println!("Concurrency mode: {}", config.engine.concurrency_mode);
    println!("Admin permission: {}", config.engine.admin_permission);
    println!(
        "Caching:          {} (workload {}s, roles {}s)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.workload_ttl_seconds,
        config.cache.role_membership_ttl_seconds
    );
    println!("Pool size:        {}", config.database.max_connections);
    println!("Configuration is valid");
    Ok(())
}

fn show_config(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    let rendered = serde_json::to_string_pretty(&manager.debug_config())
        .context("rendering configuration")?;
    println!("{rendered}");
    Ok(())
}
