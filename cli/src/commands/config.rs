// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use duplex_core::domain::node_config::{NodeConfigManifest, ProbeKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file populated with the defaults
    Generate {
        /// Output path (default: ./duplex-config.yaml)
        #[arg(short, long, default_value = "./duplex-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. DUPLEX_CONFIG_PATH: {}",
            std::env::var("DUPLEX_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./duplex-config.yaml");
        println!("  4. ~/.duplex/config.yaml");
        println!("  5. /etc/duplex/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Cores:".bold());
    for core in &spec.cores {
        let marker = if core.id == spec.core_manager.core_id {
            " (this process)".green().to_string()
        } else {
            String::new()
        };
        println!("  {} → {}{}", core.id.bold(), core.url, marker);
        println!("    Scope: {}  Self container: {}", core.container_scope, core.self_container);
    }
    println!(
        "  Health interval: {}s  Marker staleness: {}s",
        spec.core_manager.health_interval_seconds, spec.core_manager.marker_staleness_seconds
    );
    println!("  Shared dir: {}", spec.core_manager.shared_dir.display());
    println!();

    println!("{}", "Dependencies:".bold());
    println!("  Language model: {} ({})", spec.llm.endpoint, spec.llm.model);
    println!("  Source control: {}", spec.source_control.url);
    println!(
        "  Audit store: {}",
        if spec.database.is_some() { "postgres" } else { "in-memory" }
    );
    println!();

    println!("{}", "Monitored components:".bold());
    if spec.monitor.components.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for component in &spec.monitor.components {
        match &component.probe {
            ProbeKind::Http { url } => println!("  {} (http {})", component.name, url),
            ProbeKind::Database => println!("  {} (database)", component.name),
        }
    }
    println!();

    println!("{}", "Listen:".bold());
    println!("  {}:{}", spec.network.bind_address, spec.network.port);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    NodeConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
