// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;

use crate::domain::auth::{
    headers, AuthFailure, AuthProtocol, AuthScheme, ClaimedIdentity, InboundRequest, SignInput,
    PROTOCOL_VERSION,
};
use crate::domain::exapp::{AppId, AppSecret};

/// Secret-equality protocol: `AUTHORIZATION-APP-API = base64(user_id:secret)`.
///
/// No body integrity and no replay bound; kept for apps built against the
/// older SDKs.
#[derive(Debug, Clone, Default)]
pub struct SimpleProtocol;

impl SimpleProtocol {
    pub fn new() -> Self {
        Self
    }

    fn decode_authorization(request: &InboundRequest) -> Result<(String, String), AuthFailure> {
        let raw = request
            .header(headers::AUTHORIZATION_APP_API)
            .ok_or(AuthFailure::MissingCredentials)?;
        let decoded = STANDARD
            .decode(raw.trim())
            .map_err(|_| AuthFailure::MalformedHeader(headers::AUTHORIZATION_APP_API))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AuthFailure::MalformedHeader(headers::AUTHORIZATION_APP_API))?;
        let (user, secret) = decoded
            .split_once(':')
            .ok_or(AuthFailure::MalformedHeader(headers::AUTHORIZATION_APP_API))?;
        Ok((user.to_string(), secret.to_string()))
    }
}

pub(crate) fn required_header<'a>(request: &'a InboundRequest, name: &'static str) -> Result<&'a str, AuthFailure> {
    match request.header(name) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthFailure::MalformedHeader(name)),
    }
}

impl AuthProtocol for SimpleProtocol {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Simple
    }

    fn matches(&self, request: &InboundRequest) -> bool {
        request.header(headers::AUTHORIZATION_APP_API).is_some()
    }

    fn claimed_identity(&self, request: &InboundRequest) -> Result<ClaimedIdentity, AuthFailure> {
        let app_id = required_header(request, headers::EX_APP_ID)?;
        let app_version = required_header(request, headers::EX_APP_VERSION)?;
        let (user_id, _) = Self::decode_authorization(request)?;
        Ok(ClaimedIdentity {
            app_id: AppId::new(app_id),
            app_version: app_version.to_string(),
            user_id,
            scheme: AuthScheme::Simple,
        })
    }

    fn verify(
        &self,
        request: &InboundRequest,
        _identity: &ClaimedIdentity,
        secret: &AppSecret,
        _now: DateTime<Utc>,
    ) -> Result<(), AuthFailure> {
        let (_, presented) = Self::decode_authorization(request)?;
        if bool::from(presented.as_bytes().ct_eq(secret.expose().as_bytes())) {
            Ok(())
        } else {
            Err(AuthFailure::BadSecret)
        }
    }

    fn sign(&self, input: &SignInput<'_>, secret: &AppSecret) -> Vec<(&'static str, String)> {
        let credential = STANDARD.encode(format!("{}:{}", input.user_id, secret.expose()));
        vec![
            (headers::AA_VERSION, PROTOCOL_VERSION.to_string()),
            (headers::EX_APP_ID, input.app_id.to_string()),
            (headers::EX_APP_VERSION, input.app_version.to_string()),
            (headers::AUTHORIZATION_APP_API, credential),
            (headers::AA_REQUEST_ID, input.request_id.to_string()),
        ]
    }
}
