// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # HTTP Proxy Gateway
//!
//! [`ExAppProxy`] over `reqwest`. For every call it resolves the app's base
//! URL through its daemon descriptor, encodes parameters, signs the exact
//! bytes that go on the wire, and maps transport failures to [`ProxyError`].
//!
//! Encoding rules:
//! - `GET`: parameters go to the query string; list params become repeated
//!   `key[]=v` pairs ahead of the scalar ones.
//! - `POST`/`PUT`/`DELETE`: a JSON object body, unless any parameter is a
//!   file, in which case the whole request is `multipart/form-data`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::form_urlencoded::byte_serialize;
use uuid::Uuid;

use crate::domain::auth::{AuthProtocol, SignInput};
use crate::domain::daemon::AppEndpoint;
use crate::domain::exapp::ExApp;
use crate::domain::proxy::{ExAppProxy, HttpMethod, ParamValue, ProxyError, ProxyRequest, ProxyResponse};
use crate::domain::repository::DaemonConfigRepository;

/// Encoded request body plus its content type.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBody {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl EncodedBody {
    fn empty() -> Self {
        Self { content_type: None, bytes: Vec::new() }
    }
}

fn urlencode(s: &str) -> String {
    byte_serialize(s.as_bytes()).collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Query string for GET params. Null scalars are dropped.
pub fn encode_query(params: &[(String, ParamValue)]) -> Result<String, ProxyError> {
    let mut lists = Vec::new();
    let mut scalars = Vec::new();
    for (key, value) in params {
        match value {
            ParamValue::List(items) => {
                for item in items {
                    let v = scalar_to_string(item).unwrap_or_default();
                    lists.push(format!("{}[]={}", urlencode(key), urlencode(&v)));
                }
            }
            ParamValue::Scalar(v) => {
                if let Some(v) = scalar_to_string(v) {
                    scalars.push(format!("{}={}", urlencode(key), urlencode(&v)));
                }
            }
            ParamValue::File(_) => {
                return Err(ProxyError::InvalidRequest(format!(
                    "file parameter {} cannot be sent with GET",
                    key
                )))
            }
        }
    }
    lists.extend(scalars);
    Ok(lists.join("&"))
}

pub fn encode_json(params: &[(String, ParamValue)]) -> Result<Vec<u8>, ProxyError> {
    let mut map = Map::new();
    for (key, value) in params {
        let v = match value {
            ParamValue::Scalar(v) => v.clone(),
            ParamValue::List(items) => Value::Array(items.clone()),
            ParamValue::File(_) => {
                return Err(ProxyError::InvalidRequest("file parameters require multipart".into()))
            }
        };
        map.insert(key.clone(), v);
    }
    serde_json::to_vec(&Value::Object(map)).map_err(|e| ProxyError::InvalidRequest(e.to_string()))
}

/// Escape a Content-Disposition parameter value the way browsers do.
fn escape_disposition(value: &str) -> String {
    value.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

pub fn encode_multipart(params: &[(String, ParamValue)], boundary: &str) -> Result<Vec<u8>, ProxyError> {
    let mut out = Vec::new();
    let text_part = |out: &mut Vec<u8>, name: &str, value: &str| {
        out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        out.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape_disposition(name)).as_bytes(),
        );
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    };
    for (key, value) in params {
        match value {
            ParamValue::Scalar(v) => {
                if let Some(v) = scalar_to_string(v) {
                    text_part(&mut out, key, &v);
                }
            }
            ParamValue::List(items) => {
                let name = format!("{}[]", key);
                for item in items {
                    text_part(&mut out, &name, &scalar_to_string(item).unwrap_or_default());
                }
            }
            ParamValue::File(file) => {
                if file.content_type.contains(['\r', '\n']) {
                    return Err(ProxyError::InvalidRequest(format!(
                        "content type of file parameter {} contains a line break",
                        key
                    )));
                }
                out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        escape_disposition(key),
                        escape_disposition(&file.filename),
                        file.content_type
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(&file.contents);
                out.extend_from_slice(b"\r\n");
            }
        }
    }
    out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    Ok(out)
}

/// URI (route plus query) and body for one request.
pub fn encode_request(request: &ProxyRequest) -> Result<(String, EncodedBody), ProxyError> {
    if !request.route.starts_with('/') {
        return Err(ProxyError::InvalidRequest(format!("route {} must start with /", request.route)));
    }
    if request.params.is_empty() {
        return Ok((request.route.clone(), EncodedBody::empty()));
    }
    match request.method {
        HttpMethod::Get => {
            let query = encode_query(&request.params)?;
            let sep = if request.route.contains('?') { '&' } else { '?' };
            let uri = if query.is_empty() {
                request.route.clone()
            } else {
                format!("{}{}{}", request.route, sep, query)
            };
            Ok((uri, EncodedBody::empty()))
        }
        _ if request.has_files() => {
            let boundary = format!("exapp-gateway-{}", Uuid::new_v4().simple());
            let bytes = encode_multipart(&request.params, &boundary)?;
            Ok((
                request.route.clone(),
                EncodedBody {
                    content_type: Some(format!("multipart/form-data; boundary={}", boundary)),
                    bytes,
                },
            ))
        }
        _ => Ok((
            request.route.clone(),
            EncodedBody {
                content_type: Some("application/json".to_string()),
                bytes: encode_json(&request.params)?,
            },
        )),
    }
}

/// Which destinations the outbound client may reach.
#[derive(Debug, Clone, Copy)]
pub struct OutboundPolicy {
    /// Loopback, private and link-local targets; ExApps are often co-located.
    pub allow_local_addresses: bool,
}

impl Default for OutboundPolicy {
    fn default() -> Self {
        Self { allow_local_addresses: true }
    }
}

impl OutboundPolicy {
    pub fn check(&self, url: &str) -> Result<(), ProxyError> {
        if self.allow_local_addresses {
            return Ok(());
        }
        let parsed = url::Url::parse(url).map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
        let local = match parsed.host() {
            Some(url::Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
            Some(url::Host::Ipv4(ip)) => is_local(IpAddr::V4(ip)),
            Some(url::Host::Ipv6(ip)) => is_local(IpAddr::V6(ip)),
            None => false,
        };
        if local {
            return Err(ProxyError::InvalidRequest(format!("local address {} is not allowed", url)));
        }
        Ok(())
    }
}

fn is_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

pub struct HttpProxyGateway {
    client: reqwest::Client,
    daemons: Arc<dyn DaemonConfigRepository>,
    signer: Arc<dyn AuthProtocol>,
    default_timeout: Duration,
    policy: OutboundPolicy,
}

impl HttpProxyGateway {
    pub fn new(
        daemons: Arc<dyn DaemonConfigRepository>,
        signer: Arc<dyn AuthProtocol>,
        default_timeout: Duration,
    ) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProxyError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            daemons,
            signer,
            default_timeout,
            policy: OutboundPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: OutboundPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn endpoint(&self, app: &ExApp) -> Result<AppEndpoint, ProxyError> {
        let daemon = self
            .daemons
            .find_by_name(&app.daemon_config_name)
            .await
            .map_err(|e| ProxyError::Registry(e.to_string()))?
            .ok_or_else(|| ProxyError::DaemonNotFound(app.daemon_config_name.clone()))?;
        Ok(daemon.resolve_app_endpoint(&app.app_id, &app.accepts_deploy_id, app.port))
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl ExAppProxy for HttpProxyGateway {
    async fn request(&self, app: &ExApp, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let endpoint = self.endpoint(app).await?;
        let (uri, body) = encode_request(&request)?;
        let url = format!("{}{}", endpoint.base_url, uri);
        self.policy.check(&url)?;

        let request_id = request.request_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let auth_headers = self.signer.sign(
            &SignInput {
                method: request.method.as_str(),
                uri: &uri,
                app_id: &app.app_id,
                app_version: &app.version,
                user_id: &request.user_id,
                body: &body.bytes,
                request_id: &request_id,
                sign_time: Utc::now().timestamp(),
            },
            &app.secret,
        );

        let mut builder = self
            .client
            .request(reqwest_method(request.method), &url)
            .timeout(request.timeout.unwrap_or(self.default_timeout));
        for (name, value) in auth_headers {
            builder = builder.header(name, value);
        }
        if let Some(auth) = &endpoint.basic_auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(ct) = &body.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, ct);
        }
        if !body.bytes.is_empty() {
            builder = builder.body(body.bytes);
        }

        debug!(app_id = %app.app_id, method = %request.method, %uri, "Proxying request to ExApp");
        let response = builder.send().await.map_err(|e| {
            warn!(app_id = %app.app_id, %uri, error = %e, "Request to ExApp failed");
            if e.is_timeout() {
                ProxyError::Timeout
            } else {
                ProxyError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::MalformedResponse(e.to_string()))?;

        Ok(ProxyResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::daemon::{DaemonConfig, DeployConfig, MANUAL_DEPLOY_ID};
    use crate::domain::exapp::{AppId, AppSecret, ExAppRegistration};
    use crate::domain::proxy::FilePart;
    use crate::infrastructure::repositories::InMemoryDaemonConfigRepository;
    use crate::infrastructure::signing::{HmacProtocol, SimpleProtocol};
    use mockito::Matcher;
    use serde_json::json;

    fn params(req: ProxyRequest) -> Vec<(String, ParamValue)> {
        req.params
    }

    #[test]
    fn test_query_encodes_lists_as_repeated_keys() {
        let p = params(ProxyRequest::get("/search").list("tags", ["a", "b"]).param("q", "x"));
        assert_eq!(encode_query(&p).unwrap(), "tags[]=a&tags[]=b&q=x");
    }

    #[test]
    fn test_query_escapes_values() {
        let p = params(ProxyRequest::get("/s").param("q", "a b&c/d").param("flag", true).param("n", 3));
        assert_eq!(encode_query(&p).unwrap(), "q=a+b%26c%2Fd&flag=1&n=3");
    }

    #[test]
    fn test_get_with_file_is_rejected() {
        let req = ProxyRequest::get("/x").file(
            "f",
            FilePart { filename: "a".into(), content_type: "text/plain".into(), contents: "x".into() },
        );
        assert!(matches!(encode_request(&req), Err(ProxyError::InvalidRequest(_))));
    }

    #[test]
    fn test_post_with_file_uses_multipart_only() {
        let req = ProxyRequest::post("/upload").param("note", "hi").file(
            "doc",
            FilePart {
                filename: "a.txt".into(),
                content_type: "text/plain".into(),
                contents: "hello".into(),
            },
        );
        let (uri, body) = encode_request(&req).unwrap();
        assert_eq!(uri, "/upload");
        let ct = body.content_type.unwrap();
        assert!(ct.starts_with("multipart/form-data; boundary="));
        let text = String::from_utf8(body.bytes).unwrap();
        assert!(text.contains("name=\"note\"\r\n\r\nhi\r\n"));
        assert!(text.contains("name=\"doc\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n"));
        assert!(!text.contains("{\"note\""));
    }

    #[test]
    fn test_multipart_header_values_cannot_break_out() {
        let req = ProxyRequest::post("/upload").file(
            "doc\"x",
            FilePart {
                filename: "a.txt\"\r\nX-Injected: 1\r\n\r\nevil".into(),
                content_type: "text/plain".into(),
                contents: "hello".into(),
            },
        );
        let (_, body) = encode_request(&req).unwrap();
        let text = String::from_utf8(body.bytes).unwrap();
        assert!(text.contains(
            "name=\"doc%22x\"; filename=\"a.txt%22%0D%0AX-Injected: 1%0D%0A%0D%0Aevil\"\r\nContent-Type: text/plain\r\n"
        ));
        assert!(!text.contains("\r\nX-Injected"));

        let req = ProxyRequest::post("/upload").file(
            "doc",
            FilePart {
                filename: "a.txt".into(),
                content_type: "text/plain\r\nX-Injected: 1".into(),
                contents: "hello".into(),
            },
        );
        assert!(matches!(encode_request(&req), Err(ProxyError::InvalidRequest(_))));
    }

    #[test]
    fn test_post_without_files_is_json() {
        let req = ProxyRequest::post("/init").param("a", 1).list("b", ["x"]);
        let (_, body) = encode_request(&req).unwrap();
        assert_eq!(body.content_type.as_deref(), Some("application/json"));
        let v: Value = serde_json::from_slice(&body.bytes).unwrap();
        assert_eq!(v, json!({"a": 1, "b": ["x"]}));
    }

    #[test]
    fn test_get_appends_to_existing_query() {
        let req = ProxyRequest::get("/enabled?enabled=1").param("x", "y");
        assert_eq!(encode_request(&req).unwrap().0, "/enabled?enabled=1&x=y");
    }

    #[test]
    fn test_policy_blocks_local_when_disallowed() {
        let strict = OutboundPolicy { allow_local_addresses: false };
        assert!(strict.check("http://127.0.0.1:9000/x").is_err());
        assert!(strict.check("http://localhost:9000/x").is_err());
        assert!(strict.check("http://10.1.2.3/x").is_err());
        assert!(strict.check("https://apps.example.org/x").is_ok());
        assert!(OutboundPolicy::default().check("http://127.0.0.1:9000/x").is_ok());
    }

    async fn gateway_for(server: &mockito::ServerGuard, signer: Arc<dyn AuthProtocol>) -> (HttpProxyGateway, ExApp) {
        let addr = server.host_with_port();
        let (host, port) = addr.rsplit_once(':').unwrap();
        let daemons = Arc::new(InMemoryDaemonConfigRepository::new());
        daemons
            .save(&DaemonConfig {
                name: "manual".into(),
                display_name: String::new(),
                accepts_deploy_id: MANUAL_DEPLOY_ID.into(),
                protocol: "http".into(),
                host: host.into(),
                deploy_config: DeployConfig::default(),
            })
            .await
            .unwrap();
        let app = ExApp::register(ExAppRegistration {
            app_id: AppId::new("mail-bridge"),
            version: "1.0.0".into(),
            name: "Mail Bridge".into(),
            secret: Some(AppSecret::new("s3cr3t")),
            port: port.parse().unwrap(),
            daemon_config_name: "manual".into(),
            accepts_deploy_id: MANUAL_DEPLOY_ID.into(),
        });
        let gw = HttpProxyGateway::new(daemons, signer, Duration::from_secs(3)).unwrap();
        (gw, app)
    }

    #[tokio::test]
    async fn test_get_is_signed_and_query_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("tags[]".into(), "a".into()),
                Matcher::UrlEncoded("q".into(), "x".into()),
            ]))
            .match_header("ex-app-id", "mail-bridge")
            .match_header("ex-user-id", "alice")
            .match_header("ae-data-hash", "")
            .match_header("ae-signature", Matcher::Regex("^[0-9a-f]{64}$".into()))
            .with_status(200)
            .with_body(r#"{"hits":1}"#)
            .create_async()
            .await;

        let (gw, app) = gateway_for(&server, Arc::new(HmacProtocol::new(Duration::from_secs(300)))).await;
        let resp = gw
            .request(&app, ProxyRequest::get("/search").list("tags", ["a", "b"]).param("q", "x").as_user("alice"))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.json::<Value>().unwrap(), json!({"hits": 1}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_json_with_simple_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/init")
            .match_header("authorization-app-api", "OnMzY3IzdA==")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"force": true})))
            .with_status(501)
            .create_async()
            .await;

        let (gw, app) = gateway_for(&server, Arc::new(SimpleProtocol::new())).await;
        let resp = gw.request(&app, ProxyRequest::post("/init").param("force", true)).await.unwrap();
        assert_eq!(resp.status, 501);
        assert!(!resp.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_app_is_a_value() {
        let server = mockito::Server::new_async().await;
        let (gw, app) = gateway_for(&server, Arc::new(SimpleProtocol::new())).await;
        drop(server);
        let err = gw.request(&app, ProxyRequest::get("/heartbeat")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Transport(_) | ProxyError::Timeout));
    }

    #[tokio::test]
    async fn test_unknown_daemon() {
        let server = mockito::Server::new_async().await;
        let (gw, mut app) = gateway_for(&server, Arc::new(SimpleProtocol::new())).await;
        app.daemon_config_name = "gone".into();
        let err = gw.request(&app, ProxyRequest::get("/heartbeat")).await.unwrap_err();
        assert_eq!(err, ProxyError::DaemonNotFound("gone".into()));
    }
}
