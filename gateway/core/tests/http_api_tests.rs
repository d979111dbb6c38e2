// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;

use exapp_gateway_core::domain::exapp::AppId;
use exapp_gateway_core::presentation::app;

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", ADMIN_TOKEN));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn exapp(call: &Call<'_>, body: Option<&str>) -> Request<Body> {
    let inbound = call.hmac(client(1));
    let mut builder = Request::builder().method(call.method).uri(call.uri);
    for name in [
        "AE-VERSION",
        "EX-APP-ID",
        "EX-APP-VERSION",
        "EX-USER-ID",
        "AE-SIGN-TIME",
        "AE-DATA-HASH",
        "AE-SIGNATURE",
        "AE-REQUEST-ID",
    ] {
        if let Some(value) = inbound.header(name) {
            builder = builder.header(name, value);
        }
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_health() {
    let router = app(gateway(ScriptedProxy::new()).await);
    let (status, body) = send(&router, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_admin_requires_token() {
    let router = app(gateway(ScriptedProxy::new()).await);
    let (status, _) = send(&router, Request::get("/admin/v1/apps").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut spec = test_spec();
    spec.admin.token = None;
    let disabled = app(gateway_with(spec, ScriptedProxy::new()).await);
    let (status, _) = send(&disabled, admin("GET", "/admin/v1/apps", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_register_grant_and_inspect() {
    let router = app(gateway(ScriptedProxy::new()).await);
    let registration = json!({
        "app_id": APP,
        "version": VERSION,
        "name": "Mail Bridge",
        "port": 23000,
        "daemon_config_name": "manual",
        "accepts_deploy_id": "manual-install",
    });
    let (status, body) = send(&router, admin("POST", "/admin/v1/apps", Some(registration))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["app_id"], APP);
    assert_eq!(body["secret"].as_str().unwrap().len(), 128);
    assert_eq!(body["state"]["state"], "registered");

    let (status, _) = send(
        &router,
        admin("POST", "/admin/v1/apps/mail-bridge/scopes", Some(json!({ "scope_group": 2 }))),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, admin("GET", "/admin/v1/apps/mail-bridge/scopes", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope_groups"], json!([2]));
    assert_eq!(body["names"], json!(["BASIC", "SYSTEM"]));

    let (status, body) = send(&router, admin("GET", "/admin/v1/apps/mail-bridge", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("secret").is_none());

    let (status, _) = send(&router, admin("GET", "/admin/v1/apps/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, admin("DELETE", "/admin/v1/apps/mail-bridge", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&router, admin("GET", "/admin/v1/apps", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_exapp_routes_reject_generically() {
    let services = gateway(ScriptedProxy::new()).await;
    enabled_mail_bridge(&services).await;
    let router = app(services);

    let mut wrong = Call::get("/cloud/capabilities");
    wrong.secret = "nope";
    let (status, body) = send(&router, exapp(&wrong, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    // scope denial looks exactly the same
    let (status, body) = send(&router, exapp(&Call::get("/cloud/apps"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn test_exapp_capabilities_and_ocs_prefix() {
    let services = gateway(ScriptedProxy::new()).await;
    enabled_mail_bridge(&services).await;
    let router = app(services);

    let (status, body) = send(&router, exapp(&Call::get("/cloud/capabilities"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["app_id"], APP);
    assert_eq!(body["scopes"], json!(["BASIC"]));

    let (status, _) = send(&router, exapp(&Call::get("/ocs/v2.php/cloud/capabilities"), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_exapp_reports_init_progress_over_http() {
    let proxy = ScriptedProxy::new();
    proxy.healthy();
    let services = gateway(proxy).await;
    services.lifecycle.register(registration(APP, SECRET)).await.unwrap();
    services.lifecycle.set_init_progress(&AppId::new(APP), 0, None).await.unwrap();
    let router = app(services.clone());

    for (progress, expected) in [(40, "progressed"), (100, "completed")] {
        let payload = json!({ "progress": progress }).to_string();
        let mut call = Call::get("/apps/app_api/ex-app/status");
        call.method = "PUT";
        call.body = payload.as_bytes();
        let (status, body) = send(&router, exapp(&call, Some(&payload))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], expected);
    }
    assert!(services.registry.require(&AppId::new(APP)).await.unwrap().enabled);
}

#[tokio::test]
async fn test_admin_proxy_call_reaches_app() {
    let proxy = ScriptedProxy::new();
    proxy.respond("/api/summary", 200, r#"{"summary":"ok"}"#);
    let services = gateway(proxy.clone()).await;
    enabled_mail_bridge(&services).await;
    let router = app(services.clone());

    let (status, body) = send(
        &router,
        admin(
            "POST",
            "/admin/v1/apps/mail-bridge/proxy",
            Some(json!({ "method": "GET", "route": "/api/summary", "user_id": "bob" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "ok");
    assert_eq!(proxy.calls().last().unwrap().2, "bob");
    assert!(services.registry.user_exists(&AppId::new(APP), "bob").await.unwrap());
}
