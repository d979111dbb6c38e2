// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host-side entry point for calling into an ExApp by id.

use std::sync::Arc;
use tracing::debug;

use crate::application::registry::{AppRegistry, RegistryError};
use crate::domain::exapp::{AppId, ExApp};
use crate::domain::proxy::{ExAppProxy, ProxyError, ProxyRequest, ProxyResponse};

fn registry_error(app_id: &AppId, err: RegistryError) -> ProxyError {
    match err {
        RegistryError::NotFound(_) => ProxyError::UnknownApp(app_id.clone()),
        other => ProxyError::Registry(other.to_string()),
    }
}

pub struct ExAppClient {
    registry: Arc<AppRegistry>,
    proxy: Arc<dyn ExAppProxy>,
}

impl ExAppClient {
    pub fn new(registry: Arc<AppRegistry>, proxy: Arc<dyn ExAppProxy>) -> Self {
        Self { registry, proxy }
    }

    pub async fn app(&self, app_id: &AppId) -> Result<ExApp, ProxyError> {
        self.registry
            .require(app_id)
            .await
            .map_err(|e| registry_error(app_id, e))
    }

    /// Call in system context (empty user id).
    pub async fn request(&self, app_id: &AppId, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let app = self.app(app_id).await?;
        self.proxy.request(&app, request.as_user("")).await
    }

    /// Call on behalf of `user_id`, registering the user with the app first.
    pub async fn request_as_user(
        &self,
        app_id: &AppId,
        user_id: &str,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let app = self.app(app_id).await?;
        self.registry
            .ensure_user(app_id, user_id)
            .await
            .map_err(|e| registry_error(app_id, e))?;
        debug!(app_id = %app_id, user_id, route = %request.route, "Calling ExApp as user");
        self.proxy.request(&app, request.as_user(user_id)).await
    }
}
