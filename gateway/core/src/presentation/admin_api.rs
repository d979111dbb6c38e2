// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Administrative routes, mounted under `/admin/v1`.
//!
//! Requests must carry `Authorization: Bearer <spec.admin.token>`; the token
//! is compared in constant time. Without a configured token every route
//! answers `403`.

use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::application::registry::RegistryError;
use crate::domain::daemon::DaemonConfig;
use crate::domain::exapp::{AppId, AppSecret, ExApp, ExAppRegistration, LifecycleState};
use crate::domain::providers::{ProviderKey, ProviderKind, ProviderRegistration};
use crate::domain::proxy::{FilePart, HttpMethod, ProxyRequest};
use crate::domain::scope::{ApiScope, ScopeGroup};
use crate::presentation::api::{ApiError, SharedServices};

pub fn router(services: SharedServices) -> Router {
    Router::new()
        .route("/apps", get(list_apps).post(register_app))
        .route("/apps/{app_id}", get(get_app).delete(unregister_app))
        .route("/apps/{app_id}/enable", post(enable_app))
        .route("/apps/{app_id}/disable", post(disable_app))
        .route("/apps/{app_id}/init", post(dispatch_init))
        .route("/apps/{app_id}/rotate-secret", post(rotate_secret))
        .route("/apps/{app_id}/scopes", get(app_scopes).post(grant_scope))
        .route("/apps/{app_id}/scopes/{scope_group}", delete(revoke_scope))
        .route("/apps/{app_id}/proxy", post(proxy_call))
        .route("/api-scopes", get(list_api_scopes).post(register_api_scope))
        .route("/daemons", get(list_daemons).post(register_daemon))
        .route("/providers", get(list_providers).post(register_provider))
        .route("/providers/{app_id}/{name}", delete(unregister_provider))
        .route_layer(middleware::from_fn_with_state(services.clone(), require_admin))
        .with_state(services)
}

async fn require_admin(State(services): State<SharedServices>, request: Request, next: Next) -> Response {
    let Some(expected) = services.admin_token.as_deref() else {
        return ApiError::Forbidden("admin API is disabled".into()).into_response();
    };
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        warn!(path = %request.uri().path(), "Rejected admin request with invalid token");
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

/// Admin view of an app. The secret is never included.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppView {
    pub app_id: AppId,
    pub name: String,
    pub version: String,
    pub port: u16,
    pub daemon_config_name: String,
    pub enabled: bool,
    pub state: serde_json::Value,
    pub last_check_time: Option<DateTime<Utc>>,
    pub created_time: DateTime<Utc>,
    pub revision: u64,
}

impl From<&ExApp> for AppView {
    fn from(app: &ExApp) -> Self {
        let state: LifecycleState = app.lifecycle_state();
        Self {
            app_id: app.app_id.clone(),
            name: app.name.clone(),
            version: app.version.clone(),
            port: app.port,
            daemon_config_name: app.daemon_config_name.clone(),
            enabled: app.enabled,
            state: serde_json::to_value(state).unwrap_or_default(),
            last_check_time: app.last_check_time,
            created_time: app.created_time,
            revision: app.revision,
        }
    }
}

/// Returned once, when a secret is set or generated.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppWithSecret {
    #[serde(flatten)]
    pub app: AppView,
    pub secret: String,
}

impl From<&ExApp> for AppWithSecret {
    fn from(app: &ExApp) -> Self {
        Self { app: app.into(), secret: app.secret.expose().to_string() }
    }
}

async fn list_apps(State(services): State<SharedServices>) -> Result<Json<Vec<AppView>>, ApiError> {
    let apps = services.registry.list().await?;
    Ok(Json(apps.iter().map(AppView::from).collect()))
}

async fn register_app(
    State(services): State<SharedServices>,
    Json(registration): Json<ExAppRegistration>,
) -> Result<(StatusCode, Json<AppWithSecret>), ApiError> {
    let app = services.lifecycle.register(registration).await?;
    Ok((StatusCode::CREATED, Json((&app).into())))
}

async fn get_app(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
) -> Result<Json<AppView>, ApiError> {
    let app = services.registry.require(&AppId::new(app_id)).await?;
    Ok(Json((&app).into()))
}

async fn unregister_app(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let app_id = AppId::new(app_id);
    if services.lifecycle.unregister(&app_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RegistryError::NotFound(app_id).into())
    }
}

async fn enable_app(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
) -> Result<Json<AppView>, ApiError> {
    let app = services.lifecycle.enable(&AppId::new(app_id)).await?;
    Ok(Json((&app).into()))
}

async fn disable_app(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
) -> Result<Json<AppView>, ApiError> {
    let app = services.lifecycle.disable(&AppId::new(app_id)).await?;
    Ok(Json((&app).into()))
}

#[derive(Debug, Default, Deserialize)]
pub struct InitBody {
    #[serde(default)]
    pub is_update: bool,
}

async fn dispatch_init(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
    body: Option<Json<InitBody>>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let is_update = body.map(|Json(b)| b.is_update).unwrap_or_default();
    let handle = services.lifecycle.dispatch_init(&AppId::new(app_id), is_update).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "app_id": handle.app_id(), "dispatched": true }))))
}

#[derive(Debug, Default, Deserialize)]
pub struct RotateBody {
    #[serde(default)]
    pub secret: Option<String>,
}

async fn rotate_secret(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
    body: Option<Json<RotateBody>>,
) -> Result<Json<AppWithSecret>, ApiError> {
    let secret = body.and_then(|Json(b)| b.secret).map(AppSecret::new);
    let app = services.lifecycle.rotate_secret(&AppId::new(app_id), secret).await?;
    Ok(Json((&app).into()))
}

async fn app_scopes(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let app_id = AppId::new(app_id);
    services.registry.require(&app_id).await?;
    let groups = services.registry.scopes_for(&app_id).await?;
    let names = services.scopes.scope_names(&app_id).await?;
    Ok(Json(json!({ "scope_groups": groups, "names": names })))
}

#[derive(Debug, Deserialize)]
pub struct GrantBody {
    pub scope_group: ScopeGroup,
}

async fn grant_scope(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
    Json(body): Json<GrantBody>,
) -> Result<StatusCode, ApiError> {
    services.registry.grant_scope(&AppId::new(app_id), body.scope_group).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_scope(
    State(services): State<SharedServices>,
    Path((app_id, scope_group)): Path<(String, u32)>,
) -> Result<StatusCode, ApiError> {
    services
        .registry
        .revoke_scope(&AppId::new(app_id), ScopeGroup(scope_group))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct FileParam {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Base64 file contents.
    pub contents: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ProxyBody {
    pub method: String,
    pub route: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub files: std::collections::BTreeMap<String, FileParam>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

async fn proxy_call(
    State(services): State<SharedServices>,
    Path(app_id): Path<String>,
    Json(body): Json<ProxyBody>,
) -> Result<Response, ApiError> {
    let app_id = AppId::new(app_id);
    let method: HttpMethod = body.method.parse()?;
    let mut request = ProxyRequest::new(method, body.route).json_params(body.params);
    for (key, file) in body.files {
        let contents = STANDARD
            .decode(file.contents.as_bytes())
            .map_err(|e| ApiError::BadRequest(format!("file {} is not valid base64: {}", key, e)))?;
        request = request.file(
            key,
            FilePart { filename: file.filename, content_type: file.content_type, contents: contents.into() },
        );
    }
    if let Some(timeout) = body.timeout {
        request = request.with_timeout(timeout);
    }

    let response = match body.user_id.as_deref().filter(|u| !u.is_empty()) {
        Some(user_id) => services.client.request_as_user(&app_id, user_id, request).await?,
        None => services.client.request(&app_id, request).await?,
    };

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok((status, [(header::CONTENT_TYPE, content_type)], response.body).into_response())
}

async fn list_api_scopes(State(services): State<SharedServices>) -> Result<Json<Vec<ApiScope>>, ApiError> {
    let table = services.scopes.table().await?;
    Ok(Json(table.entries().to_vec()))
}

async fn register_api_scope(
    State(services): State<SharedServices>,
    Json(scope): Json<ApiScope>,
) -> Result<StatusCode, ApiError> {
    if !scope.api_route.starts_with('/') {
        return Err(ApiError::BadRequest("api_route must start with '/'".into()));
    }
    services.scopes.register_api_scope(scope).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_daemons(State(services): State<SharedServices>) -> Result<Json<Vec<DaemonConfig>>, ApiError> {
    Ok(Json(services.registry.list_daemons().await?))
}

async fn register_daemon(
    State(services): State<SharedServices>,
    Json(daemon): Json<DaemonConfig>,
) -> Result<StatusCode, ApiError> {
    if daemon.name.is_empty() {
        return Err(ApiError::BadRequest("daemon name cannot be empty".into()));
    }
    if daemon.protocol != "http" && daemon.protocol != "https" {
        return Err(ApiError::BadRequest("daemon protocol must be http or https".into()));
    }
    services.registry.save_daemon(&daemon).await?;
    info!(daemon = %daemon.name, "Daemon config registered");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub kind: Option<ProviderKind>,
}

async fn list_providers(
    State(services): State<SharedServices>,
    axum::extract::Query(query): axum::extract::Query<ProviderQuery>,
) -> Json<Vec<ProviderRegistration>> {
    Json(services.providers.list(query.kind))
}

async fn register_provider(
    State(services): State<SharedServices>,
    Json(registration): Json<ProviderRegistration>,
) -> Result<StatusCode, ApiError> {
    services.providers.register(registration).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unregister_provider(
    State(services): State<SharedServices>,
    Path((app_id, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = ProviderKey { app_id: AppId::new(app_id), name };
    match services.providers.unregister(&key) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound(format!("provider {}/{} not found", key.app_id, key.name))),
    }
}
