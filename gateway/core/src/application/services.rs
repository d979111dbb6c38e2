// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gateway Services - composition root
//!
//! Builds every application service from a [`GatewayConfigSpec`] and a
//! [`RepositorySet`], seeds configured daemons and default scopes, and starts
//! the background tasks (init workers, init timeout monitor, throttle purge).
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Shared state handed to the presentation layer

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::exapp_client::ExAppClient;
use crate::application::init_timeout::InitTimeoutMonitor;
use crate::application::init_worker::{InitQueue, InitWorkerPool};
use crate::application::lifecycle::LifecycleCoordinator;
use crate::application::providers::ProviderRegistry;
use crate::application::registry::AppRegistry;
use crate::application::repository_factory::RepositorySet;
use crate::application::request_validation::RequestValidator;
use crate::application::scope_authority::ScopeAuthority;
use crate::domain::cache::Cache;
use crate::domain::events::AdminNotifier;
use crate::domain::gateway_config::GatewayConfigSpec;
use crate::domain::proxy::ExAppProxy;
use crate::infrastructure::cache::{InMemoryTtlCache, NoopCache};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::notifier::EventBusNotifier;
use crate::infrastructure::proxy_gateway::HttpProxyGateway;
use crate::infrastructure::signing::AuthVerifier;
use crate::infrastructure::throttle::AttemptThrottler;

pub struct GatewayServices {
    pub registry: Arc<AppRegistry>,
    pub scopes: Arc<ScopeAuthority>,
    pub validator: Arc<RequestValidator>,
    pub lifecycle: Arc<LifecycleCoordinator>,
    pub providers: Arc<ProviderRegistry>,
    pub client: Arc<ExAppClient>,
    pub event_bus: EventBus,
    pub admin_token: Option<String>,
    shutdown: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl GatewayServices {
    /// Outbound calls go through [`HttpProxyGateway`] signed with the configured scheme.
    pub async fn build(spec: &GatewayConfigSpec, repositories: RepositorySet) -> Result<Arc<Self>> {
        let verifier = AuthVerifier::with_default_protocols(spec.auth.replay_window);
        let signer = verifier
            .protocol(spec.auth.outbound_scheme)
            .with_context(|| format!("No signer for outbound scheme {}", spec.auth.outbound_scheme))?;
        let proxy: Arc<dyn ExAppProxy> = Arc::new(
            HttpProxyGateway::new(repositories.daemons.clone(), signer, spec.lifecycle.request_timeout)
                .context("Failed to create outbound HTTP client")?,
        );
        Self::build_with_proxy(spec, repositories, verifier, proxy).await
    }

    /// Same as [`GatewayServices::build`] with an injected proxy.
    pub async fn build_with_proxy(
        spec: &GatewayConfigSpec,
        repositories: RepositorySet,
        verifier: AuthVerifier,
        proxy: Arc<dyn ExAppProxy>,
    ) -> Result<Arc<Self>> {
        let cache: Arc<dyn Cache> = if spec.cache.enabled {
            Arc::new(InMemoryTtlCache::new(spec.cache.capacity))
        } else {
            Arc::new(NoopCache)
        };
        let ttl = spec.cache.ttl;

        let registry = Arc::new(AppRegistry::new(&repositories, cache.clone(), ttl));
        let scopes = Arc::new(ScopeAuthority::new(repositories.api_scopes.clone(), registry.clone(), cache, ttl));

        for daemon in &spec.daemons {
            registry
                .save_daemon(daemon)
                .await
                .with_context(|| format!("Failed to register daemon config {}", daemon.name))?;
        }
        scopes.seed_defaults().await.context("Failed to seed default API scopes")?;

        let event_bus = EventBus::with_default_capacity();
        let notifier: Arc<dyn AdminNotifier> = Arc::new(EventBusNotifier::new(event_bus.clone()));
        let throttler = Arc::new(AttemptThrottler::new(spec.throttle.clone()));
        let validator = Arc::new(RequestValidator::new(
            verifier,
            registry.clone(),
            scopes.clone(),
            throttler.clone(),
            notifier,
            event_bus.clone(),
        ));

        let client = Arc::new(ExAppClient::new(registry.clone(), proxy.clone()));
        let providers = Arc::new(ProviderRegistry::new(client.clone()));

        let shutdown = CancellationToken::new();
        let (queue, receiver) = InitQueue::channel(spec.lifecycle.init_queue_capacity);
        let lifecycle = Arc::new(
            LifecycleCoordinator::new(
                registry.clone(),
                proxy,
                event_bus.clone(),
                queue,
                spec.lifecycle.clone(),
                shutdown.clone(),
            )
            .with_providers(providers.clone()),
        );

        let mut background =
            InitWorkerPool::start(receiver, lifecycle.clone(), spec.lifecycle.init_workers, shutdown.clone());
        let monitor = Arc::new(InitTimeoutMonitor::new(
            lifecycle.clone(),
            spec.lifecycle.init_check_interval,
            shutdown.clone(),
        ));
        background.push(monitor.start());
        background.push(spawn_throttle_purge(throttler, spec.throttle.window, shutdown.clone()));

        info!(
            outbound_daemons = spec.daemons.len(),
            cache_enabled = spec.cache.enabled,
            init_workers = spec.lifecycle.init_workers,
            "Gateway services started"
        );

        Ok(Arc::new(Self {
            registry,
            scopes,
            validator,
            lifecycle,
            providers,
            client,
            event_bus,
            admin_token: spec.admin.token.clone(),
            shutdown,
            background: Mutex::new(background),
        }))
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel background work and wait for it to stop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.background.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Gateway services stopped");
    }
}

fn spawn_throttle_purge(
    throttler: Arc<AttemptThrottler>,
    every: std::time::Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if every.is_zero() {
            return;
        }
        let mut tick = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    throttler.purge_expired();
                    debug!(tracked_clients = throttler.tracked_clients(), "Purged expired throttle attempts");
                }
                _ = shutdown.cancelled() => break,
            }
        }
    })
}
