// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Logging setup
//! - Storage and service bootstrap
//! - HTTP health checks
//! - Graceful shutdown

use anyhow::{Context, Result};
use std::time::Duration;

pub mod client;
pub mod server;

pub use client::AdminClient;
pub use server::start_daemon;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Running { version: Option<String> },
    Stopped,
    Unhealthy { error: String },
}

pub fn base_url(host: &str, port: u16) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

/// Probe `GET /health`.
pub async fn check_gateway_running(host: &str, port: u16) -> Result<GatewayStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;
    let health_url = format!("{}/health", base_url(host, port));

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let version = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["version"].as_str().map(str::to_string));
            Ok(GatewayStatus::Running { version })
        }
        Ok(resp) => Ok(GatewayStatus::Unhealthy { error: format!("health check returned {}", resp.status()) }),
        Err(e) if e.is_connect() || e.is_timeout() => Ok(GatewayStatus::Stopped),
        Err(e) => Ok(GatewayStatus::Unhealthy { error: e.to_string() }),
    }
}

/// Initialize tracing subscriber for logging; `format` is `text` or `json`.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if format == "json" {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_target(false).compact().try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("127.0.0.1", 8780), "http://127.0.0.1:8780");
        assert_eq!(base_url("https://gw.internal", 443), "https://gw.internal:443");
    }

    #[tokio::test]
    async fn test_check_gateway_running() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"healthy","version":"0.1.0"}"#)
            .create_async()
            .await;
        let url = server.url();
        let (host, port) = url.rsplit_once(':').unwrap();
        let status = check_gateway_running(host, port.parse().unwrap()).await.unwrap();
        assert_eq!(status, GatewayStatus::Running { version: Some("0.1.0".into()) });
        mock.assert_async().await;
    }
}
