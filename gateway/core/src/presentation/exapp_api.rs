// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! ExApp-facing routes.
//!
//! Every route sits behind [`require_exapp`], which runs the validation
//! pipeline and stores the resulting [`ExAppSession`] as a request
//! extension. Rejections are deliberately uniform: the reason is logged by
//! the validator, the caller only ever sees `401 Unauthorized` (or `500` for
//! internal failures). Routes are also reachable under the OCS prefixes.

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, error, info, trace, warn};

use crate::application::request_validation::{ExAppSession, ValidationError};
use crate::domain::auth::InboundRequest;
use crate::domain::exapp::InitOutcome;
use crate::presentation::api::{ApiError, SharedServices};

/// Largest request body the gateway buffers for hashing.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn router(services: SharedServices) -> Router {
    let routes = Router::new()
        .route("/apps/app_api/ex-app/status", put(set_init_status))
        .route("/apps/app_api/api/v1/log", post(ingest_log))
        .route("/cloud/capabilities", get(capabilities))
        .route("/cloud/apps", get(list_apps));

    Router::new()
        .merge(routes.clone())
        .nest("/ocs/v1.php", routes.clone())
        .nest("/ocs/v2.php", routes)
        .route_layer(middleware::from_fn_with_state(services.clone(), require_exapp))
        .with_state(services)
}

fn client_addr(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn rejection(err: &ValidationError) -> Response {
    match err {
        ValidationError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Internal error" }))).into_response()
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response(),
    }
}

/// Validate the caller and bind its session to the request.
pub async fn require_exapp(State(services): State<SharedServices>, request: Request, next: Next) -> Response {
    let addr = client_addr(&request);
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.clone())
        .unwrap_or_else(|| request.uri().clone());
    let (mut parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(client = %addr, error = %e, "Failed to read ExApp request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, Json(json!({ "error": "Request body too large" }))).into_response();
        }
    };

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let mut inbound = InboundRequest::new(parts.method.as_str(), path_and_query, addr).with_body(bytes.clone());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            inbound.insert_header(name.as_str(), value);
        }
    }

    match services.validator.validate(&inbound).await {
        Ok(session) => {
            parts.extensions.insert(session);
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Err(err) => rejection(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct InitStatusBody {
    pub progress: u16,
    #[serde(default)]
    pub error: Option<String>,
}

async fn set_init_status(
    State(services): State<SharedServices>,
    Extension(session): Extension<ExAppSession>,
    Json(body): Json<InitStatusBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = services
        .lifecycle
        .set_init_progress(&session.app_id, body.progress, body.error.as_deref())
        .await?;
    let outcome = match outcome {
        InitOutcome::Progressed(_) => "progressed",
        InitOutcome::Completed => "completed",
        InitOutcome::Failed => "failed",
        InitOutcome::Ignored => "ignored",
    };
    Ok(Json(json!({ "outcome": outcome })))
}

#[derive(Debug, Deserialize)]
pub struct LogBody {
    /// 0 debug, 1 info, 2 warning, 3 error, 4 fatal.
    pub level: u8,
    pub message: String,
}

async fn ingest_log(Extension(session): Extension<ExAppSession>, Json(body): Json<LogBody>) -> StatusCode {
    let app_id = session.app_id.as_str();
    let message = body.message.as_str();
    match body.level {
        0 => debug!(target: "exapp", app_id, message, "ExApp log"),
        1 => info!(target: "exapp", app_id, message, "ExApp log"),
        2 => warn!(target: "exapp", app_id, message, "ExApp log"),
        3 | 4 => error!(target: "exapp", app_id, message, "ExApp log"),
        level => trace!(target: "exapp", app_id, level, message, "ExApp log"),
    }
    StatusCode::OK
}

async fn capabilities(
    State(services): State<SharedServices>,
    Extension(session): Extension<ExAppSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scopes = services.scopes.scope_names(&session.app_id).await?;
    Ok(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "app_id": session.app_id,
        "scopes": scopes,
        "user_id": session.user_id,
    })))
}

async fn list_apps(State(services): State<SharedServices>) -> Result<Json<serde_json::Value>, ApiError> {
    let apps: Vec<serde_json::Value> = services
        .registry
        .list()
        .await?
        .into_iter()
        .map(|app| {
            json!({
                "app_id": app.app_id,
                "name": app.name,
                "version": app.version,
                "enabled": app.enabled,
            })
        })
        .collect();
    Ok(Json(json!({ "apps": apps })))
}
