// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Proxy Port
//!
//! Outbound calls from the host to an ExApp. Transport problems come back as
//! [`ProxyError`] values so callers can treat "app unreachable" uniformly;
//! non-2xx answers are ordinary [`ProxyResponse`]s.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::exapp::{AppId, ExApp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ProxyError::InvalidRequest(format!("unsupported method {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    pub contents: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(Value),
    List(Vec<Value>),
    File(FilePart),
}

#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: HttpMethod,
    /// Path on the app, starting with `/`.
    pub route: String,
    pub params: Vec<(String, ParamValue)>,
    /// Empty for system context.
    pub user_id: String,
    pub timeout: Option<Duration>,
    pub request_id: Option<String>,
}

impl ProxyRequest {
    pub fn new(method: HttpMethod, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
            params: Vec::new(),
            user_id: String::new(),
            timeout: None,
            request_id: None,
        }
    }

    pub fn get(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, route)
    }

    pub fn post(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, route)
    }

    pub fn put(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, route)
    }

    pub fn delete(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, route)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((key.into(), ParamValue::Scalar(value.into())));
        self
    }

    pub fn list<V: Into<Value>>(mut self, key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.params.push((key.into(), ParamValue::List(values)));
        self
    }

    pub fn file(mut self, key: impl Into<String>, file: FilePart) -> Self {
        self.params.push((key.into(), ParamValue::File(file)));
        self
    }

    /// Params from a JSON object; arrays become list params.
    pub fn json_params(mut self, params: serde_json::Map<String, Value>) -> Self {
        for (key, value) in params {
            let value = match value {
                Value::Array(items) => ParamValue::List(items),
                other => ParamValue::Scalar(other),
            };
            self.params.push((key, value));
        }
        self
    }

    pub fn as_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn has_files(&self) -> bool {
        self.params.iter().any(|(_, v)| matches!(v, ParamValue::File(_)))
    }
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProxyError> {
        serde_json::from_slice(&self.body).map_err(|e| ProxyError::MalformedResponse(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("daemon config {0} not found")]
    DaemonNotFound(String),
    #[error("app {0} is not registered")]
    UnknownApp(AppId),
    #[error("registry lookup failed: {0}")]
    Registry(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Signed, address-resolved calls into an app.
#[async_trait]
pub trait ExAppProxy: Send + Sync {
    async fn request(&self, app: &ExApp, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}
