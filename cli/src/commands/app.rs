// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! ExApp administration commands
//!
//! Commands: list, show, register, unregister, enable, disable, init,
//! rotate-secret, grant, revoke

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use exapp_gateway_core::domain::daemon::MANUAL_DEPLOY_ID;
use exapp_gateway_core::domain::exapp::{AppId, AppSecret, ExAppRegistration};
use exapp_gateway_core::domain::scope::ScopeGroup;
use exapp_gateway_core::presentation::admin_api::AppView;

use crate::daemon::AdminClient;

#[derive(Subcommand)]
pub enum AppCommand {
    /// List registered ExApps
    List,

    /// Show one ExApp and its scopes
    Show {
        app_id: String,
    },

    /// Register an ExApp; prints the shared secret once
    Register {
        app_id: String,

        /// Version string the app reports in EX-APP-VERSION
        #[arg(long)]
        version: String,

        /// Display name (default: app id)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        port: u16,

        /// Daemon config the app runs on
        #[arg(long, default_value = "manual")]
        daemon: String,

        /// Deployment type accepted by the daemon
        #[arg(long, default_value = MANUAL_DEPLOY_ID)]
        deploy_id: String,

        /// Shared secret (default: generated)
        #[arg(long, env = "EXAPP_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },

    /// Unregister an ExApp
    Unregister {
        app_id: String,
    },

    /// Enable an ExApp
    Enable {
        app_id: String,
    },

    /// Disable an ExApp
    Disable {
        app_id: String,
    },

    /// Dispatch initialization
    Init {
        app_id: String,

        /// Initialization follows an update
        #[arg(long)]
        update: bool,
    },

    /// Replace the shared secret; prints the new secret once
    RotateSecret {
        app_id: String,

        /// New secret (default: generated)
        #[arg(long)]
        secret: Option<String>,
    },

    /// Grant a scope group (number or name, e.g. 2 or SYSTEM)
    Grant {
        app_id: String,
        scope: String,
    },

    /// Revoke a scope group (number or name)
    Revoke {
        app_id: String,
        scope: String,
    },
}

pub async fn handle_command(command: AppCommand, host: &str, port: u16, token: Option<String>) -> Result<()> {
    let client = AdminClient::new(host, port, token)?;

    match command {
        AppCommand::List => list(&client).await,
        AppCommand::Show { app_id } => show(&client, &app_id).await,
        AppCommand::Register { app_id, version, name, port, daemon, deploy_id, secret } => {
            let registration = ExAppRegistration {
                name: name.unwrap_or_else(|| app_id.clone()),
                app_id: AppId::new(app_id),
                version,
                secret: secret.map(AppSecret::new),
                port,
                daemon_config_name: daemon,
                accepts_deploy_id: deploy_id,
            };
            let created = client.register_app(&registration).await?;
            println!("{} Registered {}", "✓".green(), created.app.app_id.as_str().bold());
            print_secret(&created.secret);
            Ok(())
        }
        AppCommand::Unregister { app_id } => {
            client.unregister_app(&app_id).await?;
            println!("{} Unregistered {}", "✓".green(), app_id.bold());
            Ok(())
        }
        AppCommand::Enable { app_id } => {
            let app = client.enable_app(&app_id).await?;
            println!("{} {} is {}", "✓".green(), app_id.bold(), state_label(&app));
            Ok(())
        }
        AppCommand::Disable { app_id } => {
            let app = client.disable_app(&app_id).await?;
            println!("{} {} is {}", "✓".green(), app_id.bold(), state_label(&app));
            Ok(())
        }
        AppCommand::Init { app_id, update } => {
            client.dispatch_init(&app_id, update).await?;
            println!("{} Initialization dispatched for {}", "✓".green(), app_id.bold());
            Ok(())
        }
        AppCommand::RotateSecret { app_id, secret } => {
            let rotated = client.rotate_secret(&app_id, secret).await?;
            println!("{} Secret rotated for {}", "✓".green(), app_id.bold());
            print_secret(&rotated.secret);
            Ok(())
        }
        AppCommand::Grant { app_id, scope } => {
            let group = parse_scope(&scope)?;
            client.grant_scope(&app_id, group.0).await?;
            println!("{} Granted {} to {}", "✓".green(), scope.to_uppercase(), app_id.bold());
            Ok(())
        }
        AppCommand::Revoke { app_id, scope } => {
            let group = parse_scope(&scope)?;
            client.revoke_scope(&app_id, group.0).await?;
            println!("{} Revoked {} from {}", "✓".green(), scope.to_uppercase(), app_id.bold());
            Ok(())
        }
    }
}

async fn list(client: &AdminClient) -> Result<()> {
    let apps = client.list_apps().await?;
    if apps.is_empty() {
        println!("No ExApps registered");
        return Ok(());
    }

    println!("{:<28} {:<12} {:<8} {:<10} {}", "APP", "VERSION", "PORT", "DAEMON", "STATE".bold());
    for app in &apps {
        println!(
            "{:<28} {:<12} {:<8} {:<10} {}",
            app.app_id.as_str(),
            app.version,
            app.port,
            app.daemon_config_name,
            state_label(app)
        );
    }
    Ok(())
}

async fn show(client: &AdminClient, app_id: &str) -> Result<()> {
    let app = client.get_app(app_id).await?;
    let (_, scope_names) = client.app_scopes(app_id).await?;

    println!("{}", app.name.bold());
    println!("  ID: {}", app.app_id.as_str());
    println!("  Version: {}", app.version);
    println!("  Port: {}", app.port);
    println!("  Daemon: {}", app.daemon_config_name);
    println!("  State: {}", state_label(&app));
    if let Some(detail) = app.state.get("message").and_then(|e| e.as_str()) {
        println!("  Error: {}", detail.red());
    }
    if let Some(progress) = app.state.get("progress").and_then(|p| p.as_u64()) {
        println!("  Init progress: {}%", progress);
    }
    println!(
        "  Last check: {}",
        app.last_check_time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
    );
    println!("  Scopes: {}", scope_names.join(", "));
    Ok(())
}

fn print_secret(secret: &str) {
    println!("  Secret: {}", secret.yellow());
    println!("  {}", "Store it now; it is not shown again.".dimmed());
}

fn state_label(app: &AppView) -> colored::ColoredString {
    let label = app.state.get("state").and_then(|s| s.as_str()).unwrap_or("unknown");
    match label {
        "active" => label.green(),
        "error" => label.red(),
        "initializing" => label.yellow(),
        _ => label.normal(),
    }
}

/// Accepts a numeric group id or a known group name.
pub fn parse_scope(value: &str) -> Result<ScopeGroup> {
    if let Ok(id) = value.parse::<u32>() {
        return Ok(ScopeGroup(id));
    }
    ScopeGroup::from_name(&value.to_uppercase())
        .with_context(|| format!("Unknown scope group '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope() {
        assert_eq!(parse_scope("2").unwrap(), ScopeGroup::SYSTEM);
        assert_eq!(parse_scope("system").unwrap(), ScopeGroup::SYSTEM);
        assert_eq!(parse_scope("BASIC").unwrap(), ScopeGroup::BASIC);
        assert!(parse_scope("everything").is_err());
    }
}
