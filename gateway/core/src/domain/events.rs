// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::exapp::AppId;

/// ExApp lifecycle events, published on every state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExAppLifecycleEvent {
    Registered {
        app_id: AppId,
        version: String,
        registered_at: DateTime<Utc>,
    },
    Unregistered {
        app_id: AppId,
        unregistered_at: DateTime<Utc>,
    },
    SecretRotated {
        app_id: AppId,
        rotated_at: DateTime<Utc>,
    },
    InitDispatched {
        app_id: AppId,
        is_update: bool,
        dispatched_at: DateTime<Utc>,
    },
    InitProgressed {
        app_id: AppId,
        progress: u8,
        reported_at: DateTime<Utc>,
    },
    InitFailed {
        app_id: AppId,
        error: String,
        failed_at: DateTime<Utc>,
    },
    Enabled {
        app_id: AppId,
        enabled_at: DateTime<Utc>,
    },
    EnableFailed {
        app_id: AppId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    Disabled {
        app_id: AppId,
        disabled_at: DateTime<Utc>,
    },
    HeartbeatSucceeded {
        app_id: AppId,
        attempts: u32,
        checked_at: DateTime<Utc>,
    },
    HeartbeatExhausted {
        app_id: AppId,
        attempts: u32,
        gave_up_at: DateTime<Utc>,
    },
}

/// Trust-boundary events. Reasons are for operators only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SecurityEvent {
    RequestRejected {
        claimed_app_id: Option<String>,
        client: String,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
    VersionDrift {
        app_id: AppId,
        stored_version: String,
        claimed_version: String,
        detected_at: DateTime<Utc>,
    },
    ClientThrottled {
        client: String,
        attempts: u32,
        throttled_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminNotification {
    pub app_id: AppId,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl AdminNotification {
    pub fn version_drift(app_id: &AppId, stored: &str, claimed: &str) -> Self {
        Self {
            app_id: app_id.clone(),
            subject: format!("ExApp {} was disabled", app_id),
            message: format!(
                "ExApp {} presented version {} while {} is registered. It has been disabled and must be re-enabled manually.",
                app_id, claimed, stored
            ),
            created_at: Utc::now(),
        }
    }
}

/// Delivers notifications to every administrator.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify_admins(&self, notification: AdminNotification);
}
