// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Lifecycle Coordinator
//!
//! Drives an ExApp through registration, initialization, enable/disable and
//! heartbeat polling. State changes go through [`AppRegistry::update`];
//! calls into the app go through the [`ExAppProxy`] port.
//!
//! ```text
//! register ─▶ Registered ─dispatch_init─▶ Initializing(0..99) ─100─▶ Ready ─enable─▶ Active
//!                                              │                                      │
//!                                              └─error / timeout─▶ Error    disable ◀─┘
//! ```
//!
//! `dispatch_init` only enqueues; the worker pool runs [`InitJobRunner`]:
//! wait for `GET /heartbeat`, then `POST /init` with bounded retries. Apps
//! without an `/init` endpoint (404/501) are completed directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::init_worker::{DispatchError, InitHandle, InitJob, InitJobRunner, InitQueue};
use crate::application::providers::ProviderRegistry;
use crate::application::registry::{AppRegistry, RegistryError};
use crate::domain::events::ExAppLifecycleEvent;
use crate::domain::exapp::{AppId, AppSecret, ExApp, ExAppRegistration, InitOutcome, InvalidProgress};
use crate::domain::gateway_config::LifecycleConfig;
use crate::domain::proxy::{ExAppProxy, ProxyRequest, ProxyResponse};
use crate::infrastructure::event_bus::EventBus;

/// Every n-th failed heartbeat is logged and recorded on the app.
const HEARTBEAT_REPORT_EVERY: u32 = 10;

pub const INIT_TIMEOUT_ERROR: &str = "initialization timed out";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    InvalidProgress(#[from] InvalidProgress),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("app {app_id} could not be enabled: {reason}")]
    EnableRejected { app_id: AppId, reason: String },
}

/// Cancellation handle of the init job currently owning an app.
struct InitTask {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct HeartbeatBody {
    status: String,
}

pub struct LifecycleCoordinator {
    registry: Arc<AppRegistry>,
    proxy: Arc<dyn ExAppProxy>,
    event_bus: EventBus,
    queue: InitQueue,
    providers: Option<Arc<ProviderRegistry>>,
    config: LifecycleConfig,
    /// In-flight init/heartbeat work per app.
    tasks: DashMap<AppId, InitTask>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl LifecycleCoordinator {
    pub fn new(
        registry: Arc<AppRegistry>,
        proxy: Arc<dyn ExAppProxy>,
        event_bus: EventBus,
        queue: InitQueue,
        config: LifecycleConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            proxy,
            event_bus,
            queue,
            providers: None,
            config,
            tasks: DashMap::new(),
            next_generation: AtomicU64::new(0),
            shutdown,
        }
    }

    /// Provider registrations are dropped together with their app.
    pub fn with_providers(mut self, providers: Arc<ProviderRegistry>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    pub async fn register(&self, registration: ExAppRegistration) -> Result<ExApp, LifecycleError> {
        let app = self.registry.register(registration).await?;
        self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::Registered {
            app_id: app.app_id.clone(),
            version: app.version.clone(),
            registered_at: Utc::now(),
        });
        Ok(app)
    }

    /// Disable (best effort), cancel background work, and remove the app.
    pub async fn unregister(&self, app_id: &AppId) -> Result<bool, LifecycleError> {
        self.cancel_tasks(app_id);
        if let Some(app) = self.registry.get(app_id).await? {
            if app.enabled {
                self.notify_enabled(&app, false).await;
            }
        }
        let existed = self.registry.unregister(app_id).await?;
        if let Some(providers) = &self.providers {
            let removed = providers.remove_app(app_id);
            if removed > 0 {
                debug!(app_id = %app_id, removed, "Removed provider registrations");
            }
        }
        if existed {
            self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::Unregistered {
                app_id: app_id.clone(),
                unregistered_at: Utc::now(),
            });
        }
        Ok(existed)
    }

    pub async fn rotate_secret(&self, app_id: &AppId, secret: Option<AppSecret>) -> Result<ExApp, LifecycleError> {
        let app = self.registry.rotate_secret(app_id, secret).await?;
        self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::SecretRotated {
            app_id: app_id.clone(),
            rotated_at: Utc::now(),
        });
        Ok(app)
    }

    fn cancel_tasks(&self, app_id: &AppId) {
        if let Some((_, task)) = self.tasks.remove(app_id) {
            task.cancel.cancel();
        }
    }

    /// Drop the task entry unless a newer dispatch has replaced it.
    fn finish_task(&self, app_id: &AppId, generation: u64) {
        self.tasks.remove_if(app_id, |_, task| task.generation == generation);
    }

    /// True while an init job for the app is queued or running.
    pub fn has_pending_init(&self, app_id: &AppId) -> bool {
        self.tasks.contains_key(app_id)
    }

    /// Enter `Initializing(0)` and queue the init handshake.
    ///
    /// A queue that cannot take the job fails the app and returns the error.
    pub async fn dispatch_init(&self, app_id: &AppId, is_update: bool) -> Result<InitHandle, LifecycleError> {
        let now = Utc::now();
        self.registry.update(app_id, |app| app.begin_init(now)).await?;

        let token = self.shutdown.child_token();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let task = InitTask { generation, cancel: token.clone() };
        if let Some(previous) = self.tasks.insert(app_id.clone(), task) {
            previous.cancel.cancel();
        }

        let job = InitJob { app_id: app_id.clone(), is_update, generation, cancel: token };
        match self.queue.dispatch(job) {
            Ok(handle) => {
                info!(app_id = %app_id, is_update, "Init dispatched");
                self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::InitDispatched {
                    app_id: app_id.clone(),
                    is_update,
                    dispatched_at: now,
                });
                Ok(handle)
            }
            Err(e) => {
                error!(app_id = %app_id, error = %e, "Failed to dispatch init");
                self.cancel_tasks(app_id);
                let reason = e.to_string();
                self.set_init_progress(app_id, 0, Some(reason.as_str())).await?;
                Err(e.into())
            }
        }
    }

    /// Apply a progress report. Reaching 100 enables the app.
    pub async fn set_init_progress(
        &self,
        app_id: &AppId,
        progress: u16,
        error: Option<&str>,
    ) -> Result<InitOutcome, LifecycleError> {
        if progress > 100 {
            return Err(InvalidProgress(progress).into());
        }
        let now = Utc::now();
        let (_, outcome) = self
            .registry
            .update(app_id, |app| app.apply_init_progress(progress, error, now))
            .await?;
        let outcome = outcome?;

        match outcome {
            InitOutcome::Progressed(p) => {
                debug!(app_id = %app_id, progress = p, "Init progress");
                self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::InitProgressed {
                    app_id: app_id.clone(),
                    progress: p,
                    reported_at: now,
                });
            }
            InitOutcome::Failed => {
                let message = error.unwrap_or_default().to_string();
                warn!(app_id = %app_id, error = %message, "Init failed");
                self.cancel_tasks(app_id);
                self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::InitFailed {
                    app_id: app_id.clone(),
                    error: message,
                    failed_at: now,
                });
            }
            InitOutcome::Completed => {
                info!(app_id = %app_id, "Init completed");
                self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::InitProgressed {
                    app_id: app_id.clone(),
                    progress: 100,
                    reported_at: now,
                });
                self.enable(app_id).await?;
            }
            InitOutcome::Ignored => {
                debug!(app_id = %app_id, progress, "Ignoring progress report for initialized app");
            }
        }
        Ok(outcome)
    }

    /// Persist `enabled=true`, then confirm with the app; roll back on refusal.
    pub async fn enable(&self, app_id: &AppId) -> Result<ExApp, LifecycleError> {
        let now = Utc::now();
        let (app, previous_phase) = self
            .registry
            .update(app_id, |app| {
                let previous = app.status.phase.clone();
                app.mark_enabled(now);
                previous
            })
            .await?;

        let request = ProxyRequest::put("/enabled?enabled=1").with_timeout(self.config.enable_timeout);
        let failure = match self.proxy.request(&app, request).await {
            Ok(response) => enable_refusal(&response),
            Err(e) => Some(e.to_string()),
        };

        match failure {
            None => {
                info!(app_id = %app_id, "ExApp enabled");
                self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::Enabled {
                    app_id: app_id.clone(),
                    enabled_at: now,
                });
                Ok(app)
            }
            Some(reason) => {
                warn!(app_id = %app_id, reason = %reason, "ExApp refused enable, rolling back");
                self.registry
                    .update(app_id, |app| app.revert_enable(previous_phase))
                    .await?;
                self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::EnableFailed {
                    app_id: app_id.clone(),
                    reason: reason.clone(),
                    failed_at: Utc::now(),
                });
                Err(LifecycleError::EnableRejected { app_id: app_id.clone(), reason })
            }
        }
    }

    /// Tell the app (best effort), then persist `enabled=false`.
    pub async fn disable(&self, app_id: &AppId) -> Result<ExApp, LifecycleError> {
        let app = self.registry.require(app_id).await?;
        self.notify_enabled(&app, false).await;
        let (app, _) = self.registry.update(app_id, |app| app.mark_disabled()).await?;
        info!(app_id = %app_id, "ExApp disabled");
        self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::Disabled {
            app_id: app_id.clone(),
            disabled_at: Utc::now(),
        });
        Ok(app)
    }

    async fn notify_enabled(&self, app: &ExApp, enabled: bool) {
        let route = format!("/enabled?enabled={}", if enabled { 1 } else { 0 });
        let request = ProxyRequest::put(route).with_timeout(self.config.enable_timeout);
        match self.proxy.request(app, request).await {
            Ok(response) if response.is_success() => {}
            Ok(response) => {
                warn!(app_id = %app.app_id, status = response.status, "ExApp answered enabled change with an error")
            }
            Err(e) => warn!(app_id = %app.app_id, error = %e, "Could not reach ExApp to change enabled state"),
        }
    }

    /// Poll `GET /heartbeat` until it answers `{"status":"ok"}`.
    ///
    /// Returns false when attempts run out, the app disappears, or `cancel` fires.
    pub async fn heartbeat(&self, app_id: &AppId, cancel: &CancellationToken) -> Result<bool, LifecycleError> {
        let max_attempts = self.config.heartbeat_max_attempts.max(1);
        let mut failures = 0u32;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                debug!(app_id = %app_id, "Heartbeat polling cancelled");
                return Ok(false);
            }
            let Some(app) = self.registry.get(app_id).await? else {
                debug!(app_id = %app_id, "App removed during heartbeat polling");
                return Ok(false);
            };

            let request = ProxyRequest::get("/heartbeat").with_timeout(self.config.request_timeout);
            match self.proxy.request(&app, request).await {
                Ok(response) if heartbeat_ok(&response) => {
                    let now = Utc::now();
                    self.registry
                        .update(app_id, |app| {
                            app.last_check_time = Some(now);
                            app.status.heartbeat_failures = failures;
                        })
                        .await?;
                    debug!(app_id = %app_id, attempt, "Heartbeat succeeded");
                    self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::HeartbeatSucceeded {
                        app_id: app_id.clone(),
                        attempts: attempt,
                        checked_at: now,
                    });
                    return Ok(true);
                }
                Ok(_) | Err(_) => {
                    failures += 1;
                    if failures % HEARTBEAT_REPORT_EVERY == 0 {
                        warn!(app_id = %app_id, failures, "ExApp heartbeat still failing");
                        self.registry
                            .update(app_id, |app| app.status.heartbeat_failures = failures)
                            .await?;
                    }
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
                    _ = cancel.cancelled() => return Ok(false),
                }
            }
        }

        warn!(app_id = %app_id, attempts = max_attempts, "ExApp heartbeat attempts exhausted");
        self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::HeartbeatExhausted {
            app_id: app_id.clone(),
            attempts: max_attempts,
            gave_up_at: Utc::now(),
        });
        Ok(false)
    }

    /// `POST /init` with bounded retries. Returns the outcome to record, if any.
    async fn request_init(&self, app_id: &AppId, cancel: &CancellationToken) -> Result<Option<InitStep>, LifecycleError> {
        let attempts = self.config.init_retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let Some(app) = self.registry.get(app_id).await? else {
                return Ok(None);
            };
            let request = ProxyRequest::post("/init").with_timeout(self.config.request_timeout);
            match self.proxy.request(&app, request).await {
                Ok(response) if response.status == 404 || response.status == 501 => {
                    debug!(app_id = %app_id, status = response.status, "ExApp has no init endpoint");
                    return Ok(Some(InitStep::Complete));
                }
                Ok(response) if response.is_success() => return Ok(Some(InitStep::Started)),
                Ok(response) => last_error = format!("init answered with status {}", response.status),
                Err(e) => last_error = e.to_string(),
            }
            warn!(app_id = %app_id, attempt, error = %last_error, "Init request failed");

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.init_retry_delay) => {}
                    _ = cancel.cancelled() => return Ok(None),
                }
            }
        }
        Ok(Some(InitStep::Failed(last_error)))
    }

    /// Fail every initialization that started before `now - init_timeout`.
    pub async fn fail_stalled_inits(&self, now: DateTime<Utc>) -> Result<Vec<AppId>, LifecycleError> {
        let Some(deadline) = chrono::Duration::from_std(self.config.init_timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
        else {
            return Ok(Vec::new());
        };

        let mut failed = Vec::new();
        for app in self.registry.list().await? {
            if !app.init_stalled_since(deadline) {
                continue;
            }
            match self.set_init_progress(&app.app_id, 0, Some(INIT_TIMEOUT_ERROR)).await {
                Ok(_) => failed.push(app.app_id),
                Err(e) => warn!(app_id = %app.app_id, error = %e, "Failed to time out stalled init"),
            }
        }
        Ok(failed)
    }
}

enum InitStep {
    /// The app accepted `/init` and reports progress itself.
    Started,
    /// The app has no init handshake.
    Complete,
    Failed(String),
}

fn heartbeat_ok(response: &ProxyResponse) -> bool {
    response.status == 200
        && response
            .json::<HeartbeatBody>()
            .map(|body| body.status == "ok")
            .unwrap_or(false)
}

/// Reason the app refused `PUT /enabled`, if it did.
fn enable_refusal(response: &ProxyResponse) -> Option<String> {
    if !response.is_success() {
        return Some(format!("status {}", response.status));
    }
    match response.json::<serde_json::Value>() {
        Ok(body) => body
            .get("error")
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty())
            .map(str::to_string),
        Err(_) => None,
    }
}

#[async_trait]
impl InitJobRunner for LifecycleCoordinator {
    async fn run_init_job(&self, job: InitJob) {
        let app_id = job.app_id.clone();
        let result: Result<(), LifecycleError> = async {
            if !self.heartbeat(&app_id, &job.cancel).await? {
                if !job.cancel.is_cancelled() && self.registry.get(&app_id).await?.is_some() {
                    self.set_init_progress(&app_id, 0, Some("heartbeat failed")).await?;
                }
                return Ok(());
            }
            match self.request_init(&app_id, &job.cancel).await? {
                Some(InitStep::Complete) => {
                    self.set_init_progress(&app_id, 100, None).await?;
                }
                Some(InitStep::Started) => {
                    debug!(app_id = %app_id, is_update = job.is_update, "ExApp accepted init");
                }
                Some(InitStep::Failed(reason)) => {
                    self.set_init_progress(&app_id, 0, Some(reason.as_str())).await?;
                }
                None => {}
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!(app_id = %app_id, error = %e, "Init job failed");
        }
        self.finish_task(&app_id, job.generation);
    }
}
