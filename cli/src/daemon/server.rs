// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gateway HTTP server bootstrap

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use exapp_gateway_core::{
    application::{repository_factory::RepositorySet, GatewayServices},
    domain::{gateway_config::GatewayConfigManifest, repository::StorageBackend},
    infrastructure::db::Database,
    presentation,
};

pub async fn start_daemon(config: GatewayConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let spec = &config.spec;

    let backend = spec.storage.to_backend()?;
    let pool = match &backend {
        StorageBackend::PostgreSQL(pg) => {
            info!("Connecting to PostgreSQL");
            let db = Database::new(pg).await.context("Failed to connect to PostgreSQL")?;
            db.migrate().await.context("Failed to run database migrations")?;
            Some(db.get_pool().clone())
        }
        StorageBackend::InMemory => {
            warn!("Using in-memory storage; registrations are lost on restart");
            None
        }
    };
    let repositories = RepositorySet::for_backend(&backend, pool)?;

    let services = GatewayServices::build(spec, repositories)
        .await
        .context("Failed to initialize gateway services")?;

    if spec.admin.token.is_none() {
        warn!("No admin token configured; the admin API is disabled");
    }

    let app = presentation::app(services.clone());

    let addr = format!("{}:{}", spec.server.bind_address, spec.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(
        address = %addr,
        outbound_scheme = ?spec.auth.outbound_scheme,
        "Gateway listening"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Gateway shutting down");
    services.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
