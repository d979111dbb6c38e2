// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures: a scripted ExApp proxy and a fully wired in-memory gateway.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use exapp_gateway_core::application::repository_factory::RepositorySet;
use exapp_gateway_core::application::GatewayServices;
use exapp_gateway_core::domain::auth::{AuthProtocol, InboundRequest, SignInput};
use exapp_gateway_core::domain::daemon::{DaemonConfig, DeployConfig, MANUAL_DEPLOY_ID};
use exapp_gateway_core::domain::exapp::{AppId, AppSecret, ExApp, ExAppRegistration};
use exapp_gateway_core::domain::gateway_config::GatewayConfigSpec;
use exapp_gateway_core::domain::proxy::{ExAppProxy, HttpMethod, ProxyError, ProxyRequest, ProxyResponse};
use exapp_gateway_core::infrastructure::signing::{AuthVerifier, HmacProtocol, SimpleProtocol};

pub const APP: &str = "mail-bridge";
pub const SECRET: &str = "s3cr3t";
pub const VERSION: &str = "1.0.0";
pub const ADMIN_TOKEN: &str = "admin-token-0123456789";

pub type Scripted = Result<(u16, String), ProxyError>;

/// ExApp stand-in answering per route (query string ignored); unknown routes get 404.
#[derive(Default)]
pub struct ScriptedProxy {
    responses: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<(HttpMethod, String, String)>>,
}

impl ScriptedProxy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, route: &str, status: u16, body: &str) {
        self.responses.lock().insert(route.to_string(), Ok((status, body.to_string())));
    }

    pub fn fail(&self, route: &str, error: ProxyError) {
        self.responses.lock().insert(route.to_string(), Err(error));
    }

    /// Healthy app: heartbeat ok, enable accepted.
    pub fn healthy(&self) {
        self.respond("/heartbeat", 200, r#"{"status":"ok"}"#);
        self.respond("/enabled", 200, "{}");
    }

    /// `(method, route, user_id)` of every call so far.
    pub fn calls(&self) -> Vec<(HttpMethod, String, String)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.calls.lock().iter().filter(|(_, r, _)| r.split('?').next() == Some(route)).count()
    }
}

#[async_trait]
impl ExAppProxy for ScriptedProxy {
    async fn request(&self, _app: &ExApp, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        self.calls
            .lock()
            .push((request.method, request.route.clone(), request.user_id.clone()));
        let path = request.route.split('?').next().unwrap_or_default().to_string();
        let scripted = self.responses.lock().get(&path).cloned();
        match scripted {
            Some(Ok((status, body))) => Ok(ProxyResponse { status, headers: Vec::new(), body: Bytes::from(body) }),
            Some(Err(e)) => Err(e),
            None => Ok(ProxyResponse { status: 404, headers: Vec::new(), body: Bytes::new() }),
        }
    }
}

/// Fast timings so retries and throttling stay in the millisecond range.
pub fn test_spec() -> GatewayConfigSpec {
    let mut spec = GatewayConfigSpec::default();
    spec.throttle.base_delay = Duration::from_millis(1);
    spec.throttle.max_delay = Duration::from_millis(5);
    spec.throttle.max_attempts = 3;
    spec.lifecycle.heartbeat_interval = Duration::from_millis(5);
    spec.lifecycle.heartbeat_max_attempts = 5;
    spec.lifecycle.init_retry_attempts = 2;
    spec.lifecycle.init_retry_delay = Duration::from_millis(5);
    spec.lifecycle.init_workers = 2;
    spec.admin.token = Some(ADMIN_TOKEN.to_string());
    spec.daemons = vec![DaemonConfig {
        name: "manual".into(),
        display_name: "Manual install".into(),
        accepts_deploy_id: MANUAL_DEPLOY_ID.into(),
        protocol: "http".into(),
        host: "localhost".into(),
        deploy_config: DeployConfig::default(),
    }];
    spec
}

pub async fn gateway_with(spec: GatewayConfigSpec, proxy: Arc<ScriptedProxy>) -> Arc<GatewayServices> {
    let verifier = AuthVerifier::with_default_protocols(spec.auth.replay_window);
    GatewayServices::build_with_proxy(&spec, RepositorySet::in_memory(), verifier, proxy)
        .await
        .unwrap()
}

pub async fn gateway(proxy: Arc<ScriptedProxy>) -> Arc<GatewayServices> {
    gateway_with(test_spec(), proxy).await
}

pub fn registration(app_id: &str, secret: &str) -> ExAppRegistration {
    ExAppRegistration {
        app_id: AppId::new(app_id),
        version: VERSION.into(),
        name: app_id.to_string(),
        secret: Some(AppSecret::new(secret)),
        port: 23000,
        daemon_config_name: "manual".into(),
        accepts_deploy_id: MANUAL_DEPLOY_ID.into(),
    }
}

/// Registers `mail-bridge` and marks it enabled without calling the app.
pub async fn enabled_mail_bridge(services: &GatewayServices) -> ExApp {
    services.lifecycle.register(registration(APP, SECRET)).await.unwrap();
    let (app, _) = services
        .registry
        .update(&AppId::new(APP), |app| app.enabled = true)
        .await
        .unwrap();
    app
}

pub fn client(last_octet: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet))
}

pub struct Call<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    pub app_id: &'a str,
    pub version: &'a str,
    pub user_id: &'a str,
    pub secret: &'a str,
    pub body: &'a [u8],
    pub sign_time: i64,
}

impl<'a> Call<'a> {
    pub fn get(uri: &'a str) -> Self {
        Self {
            method: "GET",
            uri,
            app_id: APP,
            version: VERSION,
            user_id: "",
            secret: SECRET,
            body: b"",
            sign_time: Utc::now().timestamp(),
        }
    }

    fn headers(&self, protocol: &dyn AuthProtocol) -> Vec<(&'static str, String)> {
        let app_id = AppId::new(self.app_id);
        protocol.sign(
            &SignInput {
                method: self.method,
                uri: self.uri,
                app_id: &app_id,
                app_version: self.version,
                user_id: self.user_id,
                body: self.body,
                request_id: "req-1",
                sign_time: self.sign_time,
            },
            &AppSecret::new(self.secret),
        )
    }

    pub fn simple(&self, addr: IpAddr) -> InboundRequest {
        InboundRequest::new(self.method, self.uri, addr)
            .with_headers(self.headers(&SimpleProtocol::new()))
            .with_body(self.body.to_vec())
    }

    pub fn hmac(&self, addr: IpAddr) -> InboundRequest {
        InboundRequest::new(self.method, self.uri, addr)
            .with_headers(self.headers(&HmacProtocol::new(Duration::from_secs(300))))
            .with_body(self.body.to_vec())
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
