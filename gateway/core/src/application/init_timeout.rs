// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Init Timeout Monitor - Background task failing stalled initializations
//!
//! Apps that entered `Initializing` more than `init_timeout` ago without
//! finishing or erroring are moved to `Failed("initialization timed out")`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic sweep over the registry driven by the lifecycle config

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::lifecycle::{LifecycleCoordinator, LifecycleError};

pub struct InitTimeoutMonitor {
    lifecycle: Arc<LifecycleCoordinator>,
    check_interval: Duration,
    shutdown_token: CancellationToken,
}

impl InitTimeoutMonitor {
    pub fn new(lifecycle: Arc<LifecycleCoordinator>, check_interval: Duration, shutdown_token: CancellationToken) -> Self {
        Self { lifecycle, check_interval, shutdown_token }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if self.check_interval.is_zero() {
            info!("Init timeout monitor is disabled");
            return;
        }

        info!(
            interval_ms = self.check_interval.as_millis() as u64,
            "Starting init timeout monitor"
        );
        let mut tick = interval(self.check_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.sweep().await {
                        Ok(0) => debug!("No stalled initializations"),
                        Ok(failed) => info!(failed, "Timed out stalled initializations"),
                        Err(e) => warn!(error = %e, "Init timeout sweep failed"),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping init timeout monitor");
                    break;
                }
            }
        }
    }

    /// One pass; returns how many apps were failed.
    pub async fn sweep(&self) -> Result<usize, LifecycleError> {
        let failed = self.lifecycle.fail_stalled_inits(Utc::now()).await?;
        for app_id in &failed {
            warn!(app_id = %app_id, "ExApp initialization timed out");
        }
        Ok(failed.len())
    }
}
