// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::application::lifecycle::LifecycleError;
use crate::application::registry::RegistryError;
use crate::application::services::GatewayServices;
use crate::domain::providers::ProviderError;
use crate::domain::proxy::ProxyError;
use crate::domain::repository::RepositoryError;
use crate::presentation::{admin_api, exapp_api};

pub type SharedServices = Arc<GatewayServices>;

/// Full router: `/health`, the ExApp-facing routes and `/admin/v1`.
pub fn app(services: SharedServices) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(exapp_api::router(services.clone()))
        .nest("/admin/v1", admin_api::router(services))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) | RegistryError::DaemonNotFound(_) => ApiError::NotFound(err.to_string()),
            RegistryError::InvalidRegistration(_) => ApiError::BadRequest(err.to_string()),
            RegistryError::Repository(RepositoryError::Conflict(_)) => ApiError::Conflict(err.to_string()),
            RegistryError::Repository(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Registry(e) => e.into(),
            LifecycleError::InvalidProgress(e) => ApiError::BadRequest(e.to_string()),
            LifecycleError::Dispatch(e) => ApiError::Conflict(e.to_string()),
            e @ LifecycleError::EnableRejected { .. } => ApiError::BadGateway(e.to_string()),
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::UnknownApp(_) | ProxyError::DaemonNotFound(_) => ApiError::NotFound(err.to_string()),
            ProxyError::InvalidRequest(_) => ApiError::BadRequest(err.to_string()),
            ProxyError::Registry(_) => ApiError::Internal(err.to_string()),
            ProxyError::Timeout | ProxyError::Transport(_) | ProxyError::MalformedResponse(_) => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AppUnavailable(_) => ApiError::NotFound(err.to_string()),
            ProviderError::Failed(_) => ApiError::BadGateway(err.to_string()),
            ProviderError::Proxy(e) => e.into(),
        }
    }
}
