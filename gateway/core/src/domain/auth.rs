// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Authentication Contract
//!
//! Two protocol generations authenticate traffic between host and ExApps:
//!
//! | Scheme | Credential | Integrity | Replay bound |
//! |--------|------------|-----------|--------------|
//! | [`AuthScheme::Simple`] | `base64(user:secret)` header | none | none |
//! | [`AuthScheme::Hmac`] | HMAC-SHA256 over method, URI and headers | xxh64 body hash | sign-time window |
//!
//! Both implement [`AuthProtocol`]; inbound requests are dispatched to the
//! protocol whose header set is present.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

use crate::domain::exapp::{AppId, AppSecret};
use crate::domain::scope::ScopeGroup;

/// Wire header names. Lookups are case-insensitive.
pub mod headers {
    pub const EX_APP_ID: &str = "EX-APP-ID";
    pub const EX_APP_VERSION: &str = "EX-APP-VERSION";

    pub const AA_VERSION: &str = "AA-VERSION";
    pub const AUTHORIZATION_APP_API: &str = "AUTHORIZATION-APP-API";
    pub const AA_REQUEST_ID: &str = "AA-REQUEST-ID";

    pub const AE_VERSION: &str = "AE-VERSION";
    pub const EX_USER_ID: &str = "EX-USER-ID";
    pub const AE_SIGN_TIME: &str = "AE-SIGN-TIME";
    pub const AE_DATA_HASH: &str = "AE-DATA-HASH";
    pub const AE_SIGNATURE: &str = "AE-SIGNATURE";
    pub const AE_REQUEST_ID: &str = "AE-REQUEST-ID";
}

/// Version string the gateway stamps on outbound requests.
pub const PROTOCOL_VERSION: &str = "2.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    Simple,
    Hmac,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Simple => f.write_str("simple"),
            AuthScheme::Hmac => f.write_str("hmac"),
        }
    }
}

/// Transport-independent view of an inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    /// Path plus query string exactly as received.
    pub uri: String,
    pub path: String,
    headers: HashMap<String, String>,
    pub body: Bytes,
    pub client_addr: IpAddr,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>, client_addr: IpAddr) -> Self {
        let uri = uri.into();
        let path = uri.split('?').next().unwrap_or_default().to_string();
        Self {
            method: method.into().to_uppercase(),
            uri,
            path,
            headers: HashMap::new(),
            body: Bytes::new(),
            client_addr,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        for (name, value) in headers {
            self.insert_header(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Header value, or an empty string when absent.
    pub fn header_or_empty(&self, name: &str) -> &str {
        self.header(name).unwrap_or_default()
    }
}

/// Who the request claims to come from, before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedIdentity {
    pub app_id: AppId,
    pub app_version: String,
    /// Empty for system/background context.
    pub user_id: String,
    pub scheme: AuthScheme,
}

/// Everything needed to sign one outbound request.
#[derive(Debug, Clone)]
pub struct SignInput<'a> {
    pub method: &'a str,
    /// Route plus query string, relative to the app's base URL.
    pub uri: &'a str,
    pub app_id: &'a AppId,
    pub app_version: &'a str,
    pub user_id: &'a str,
    pub body: &'a [u8],
    pub request_id: &'a str,
    pub sign_time: i64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("no recognised authentication headers")]
    MissingCredentials,
    #[error("malformed header {0}")]
    MalformedHeader(&'static str),
    #[error("unknown app {0}")]
    UnknownApp(AppId),
    #[error("secret mismatch")]
    BadSecret,
    #[error("signature mismatch")]
    BadSignature,
    #[error("data hash mismatch")]
    DataHashMismatch,
    #[error("sign time is {age_secs}s old")]
    StaleSignTime { age_secs: i64 },
    #[error("sign time is {skew_secs}s in the future")]
    FutureSignTime { skew_secs: i64 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizationFailure {
    #[error("app {app_id} lacks scope group {scope_group}")]
    ScopeNotGranted { app_id: AppId, scope_group: ScopeGroup },
    #[error("route {path} is not mapped to any scope")]
    UnmappedRoute { path: String },
    #[error("user {user_id:?} is not known to app {app_id}")]
    UnknownUser { app_id: AppId, user_id: String },
}

/// One authentication protocol generation.
pub trait AuthProtocol: Send + Sync {
    fn scheme(&self) -> AuthScheme;

    /// True when the request carries this protocol's credential header.
    fn matches(&self, request: &InboundRequest) -> bool;

    fn claimed_identity(&self, request: &InboundRequest) -> Result<ClaimedIdentity, AuthFailure>;

    /// Check the credential against the stored secret.
    fn verify(
        &self,
        request: &InboundRequest,
        identity: &ClaimedIdentity,
        secret: &AppSecret,
        now: DateTime<Utc>,
    ) -> Result<(), AuthFailure>;

    /// Headers to attach to an outbound request.
    fn sign(&self, input: &SignInput<'_>, secret: &AppSecret) -> Vec<(&'static str, String)>;
}
