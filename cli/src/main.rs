// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # duplex
//!
//! The `duplex` binary boots one orchestration component per process.
//!
//! ## Commands
//!
//! - `duplex serve core|recovery|sandbox|runner|monitor` - Run a component
//! - `duplex config show|validate|generate` - Configuration management
//! - `duplex switch-core <id>` - Ask the System Monitor to change the active core

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use duplex_cli::commands::{self, ConfigCommand, ServeArgs, SwitchCoreArgs};
use duplex_core::domain::node_config::NodeConfigManifest;

/// duplex - redundant core orchestrator
#[derive(Parser)]
#[command(name = "duplex")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "DUPLEX_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "DUPLEX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, text); defaults to the configured format
    #[arg(long, global = true, env = "DUPLEX_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one component as a long-lived process
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Designate the active core through the System Monitor
    #[command(name = "switch-core")]
    SwitchCore(SwitchCoreArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // config errors surface from the command itself; logging just falls back to defaults
    let configured = NodeConfigManifest::load_or_default(cli.config.clone())
        .map(|c| c.logging())
        .ok();
    let level = cli
        .log_level
        .clone()
        .or_else(|| configured.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| configured.as_ref().map(|l| l.format.clone()))
        .unwrap_or_else(|| "text".to_string());
    init_logging(&level, &format)?;

    match cli.command {
        Some(Commands::Serve(args)) => commands::serve::handle_command(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::SwitchCore(args)) => commands::switch_core::handle_command(args).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().with_current_span(false).init(),
        "text" => builder.with_target(false).compact().init(),
        other => anyhow::bail!("Unknown log format '{}': expected json or text", other),
    }

    Ok(())
}
