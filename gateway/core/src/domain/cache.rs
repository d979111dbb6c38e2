// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cache Port
//!
//! Narrow read-through cache interface used by the registry and scope
//! authority. Every mutation invalidates the affected keys; the TTL only
//! bounds staleness across gateway instances.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::domain::exapp::AppId;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Duration);

    async fn invalidate(&self, key: &str);
}

/// Typed read; entries that no longer deserialize count as a miss.
pub async fn get_typed<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let value = cache.get(key).await?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(key, error = %e, "Discarding undecodable cache entry");
            cache.invalidate(key).await;
            None
        }
    }
}

pub async fn set_typed<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    match serde_json::to_value(value) {
        Ok(v) => cache.set(key, v, ttl).await,
        Err(e) => tracing::debug!(key, error = %e, "Value not cacheable"),
    }
}

pub mod keys {
    use super::AppId;

    pub const API_SCOPES: &str = "/api_scopes";

    pub fn exapp(app_id: &AppId) -> String {
        format!("/exapp/{}", app_id)
    }

    pub fn exapp_scopes(app_id: &AppId) -> String {
        format!("/exapp_scopes/{}", app_id)
    }

    pub fn exapp_user(app_id: &AppId, user_id: &str) -> String {
        format!("/exapp_user/{}/{}", app_id, user_id)
    }

    pub fn daemon(name: &str) -> String {
        format!("/daemon_config/{}", name)
    }
}
