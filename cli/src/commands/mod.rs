// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the exapp-gateway CLI

use anyhow::Result;
use colored::Colorize;

use crate::daemon::{check_gateway_running, GatewayStatus};

pub mod app;
pub mod config;

pub use self::app::AppCommand;
pub use self::config::ConfigCommand;

pub async fn status(host: &str, port: u16) -> Result<()> {
    match check_gateway_running(host, port).await? {
        GatewayStatus::Running { version } => {
            println!(
                "{} Gateway is running on {}:{} (version {})",
                "✓".green(),
                host,
                port,
                version.as_deref().unwrap_or("unknown")
            );
        }
        GatewayStatus::Stopped => {
            println!("{} Gateway is not running on {}:{}", "✗".red(), host, port);
        }
        GatewayStatus::Unhealthy { error } => {
            println!("{} Gateway is unhealthy: {}", "⚠".yellow(), error);
        }
    }
    Ok(())
}
