// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # ExApp Gateway CLI
//!
//! The `exapp-gateway` binary runs the gateway daemon and administers it
//! over its admin API.
//!
//! ## Commands
//!
//! - `exapp-gateway serve` - Run the gateway in the foreground
//! - `exapp-gateway status` - Health check a running gateway
//! - `exapp-gateway config show|validate|generate` - Configuration management
//! - `exapp-gateway app list|show|register|unregister|enable|disable|init|rotate-secret|grant|revoke`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use exapp_gateway::commands::{self, AppCommand, ConfigCommand};
use exapp_gateway::daemon;
use exapp_gateway_core::domain::gateway_config::{GatewayConfigManifest, CONFIG_PATH_ENV};

/// ExApp Gateway - trust boundary between the host and external apps
#[derive(Parser)]
#[command(name = "exapp-gateway")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Gateway host for client commands
    #[arg(long, global = true, env = "EXAPP_GATEWAY_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Gateway port for client commands (default: 8780)
    #[arg(long, global = true, env = "EXAPP_GATEWAY_PORT", default_value = "8780")]
    port: u16,

    /// Admin API bearer token
    #[arg(long, global = true, env = "EXAPP_GATEWAY_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "EXAPP_GATEWAY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    #[command(name = "serve")]
    Serve,

    /// Check whether a gateway is running
    #[command(name = "status")]
    Status,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// ExApp administration
    #[command(name = "app")]
    App {
        #[command(subcommand)]
        command: AppCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) => {
            let config = GatewayConfigManifest::load_or_default(cli.config).context("Failed to load configuration")?;
            let level = cli.log_level.unwrap_or_else(|| config.spec.logging.level.clone());
            daemon::init_logging(&level, &config.spec.logging.format)?;
            info!(name = %config.metadata.name, "Starting ExApp gateway");
            daemon::start_daemon(config).await
        }
        Some(Commands::Status) => {
            init_cli_logging(cli.log_level.as_deref())?;
            commands::status(&cli.host, cli.port).await
        }
        Some(Commands::Config { command }) => {
            init_cli_logging(cli.log_level.as_deref())?;
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::App { command }) => {
            init_cli_logging(cli.log_level.as_deref())?;
            commands::app::handle_command(command, &cli.host, cli.port, cli.admin_token).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

fn init_cli_logging(level: Option<&str>) -> Result<()> {
    daemon::init_logging(level.unwrap_or("warn"), "text")
}
