// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HMAC-SHA256 request signatures.
//!
//! Canonical string: `METHOD + URI + json(headers)`, where the JSON object
//! holds, in this order, `AE-VERSION`, `EX-APP-ID`, `EX-APP-VERSION`,
//! `EX-USER-ID` (only when non-empty), `AE-DATA-HASH` and `AE-SIGN-TIME`,
//! compact and with slashes unescaped. The body is covered indirectly through
//! `AE-DATA-HASH`, an xxh64 digest recomputed on receipt.
//!
//! There is no nonce store: a byte-identical request replayed inside the
//! sign-time window verifies again.

use ::hmac::{Hmac, Mac};
use chrono::{DateTime, Utc};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use xxhash_rust::xxh64::xxh64;

use super::simple::required_header;
use crate::domain::auth::{
    headers, AuthFailure, AuthProtocol, AuthScheme, ClaimedIdentity, InboundRequest, SignInput,
    PROTOCOL_VERSION,
};
use crate::domain::exapp::{AppId, AppSecret};

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex xxh64 of the body; empty for an empty body.
pub fn data_hash(body: &[u8]) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("{:016x}", xxh64(body, 0))
    }
}

/// Fields covered by the signature.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalFields<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    pub version: &'a str,
    pub app_id: &'a str,
    pub app_version: &'a str,
    pub user_id: &'a str,
    pub data_hash: &'a str,
    pub sign_time: &'a str,
}

pub fn canonical_string(f: &CanonicalFields<'_>) -> String {
    let mut pairs: Vec<(&str, &str)> = vec![
        (headers::AE_VERSION, f.version),
        (headers::EX_APP_ID, f.app_id),
        (headers::EX_APP_VERSION, f.app_version),
    ];
    if !f.user_id.is_empty() {
        pairs.push((headers::EX_USER_ID, f.user_id));
    }
    pairs.push((headers::AE_DATA_HASH, f.data_hash));
    pairs.push((headers::AE_SIGN_TIME, f.sign_time));

    let json = pairs
        .iter()
        .map(|(k, v)| format!("{}:{}", json_string(k), json_string(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{}{{{}}}", f.method, f.uri, json)
}

fn json_string(s: &str) -> String {
    // serde_json leaves '/' unescaped
    serde_json::Value::String(s.to_string()).to_string()
}

fn mac_for(secret: &AppSecret) -> Option<HmacSha256> {
    match HmacSha256::new_from_slice(secret.expose().as_bytes()) {
        Ok(mac) => Some(mac),
        Err(e) => {
            tracing::error!(error = %e, "HMAC key rejected");
            None
        }
    }
}

pub fn sign_canonical(canonical: &str, secret: &AppSecret) -> String {
    match mac_for(secret) {
        Some(mut mac) => {
            mac.update(canonical.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        None => String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct HmacProtocol {
    replay_window: Duration,
}

impl HmacProtocol {
    pub fn new(replay_window: Duration) -> Self {
        Self { replay_window }
    }

    pub fn replay_window(&self) -> Duration {
        self.replay_window
    }

    fn check_sign_time(&self, sign_time: i64, now: DateTime<Utc>) -> Result<(), AuthFailure> {
        let diff = now.timestamp() - sign_time;
        if diff > self.replay_window.as_secs() as i64 {
            return Err(AuthFailure::StaleSignTime { age_secs: diff });
        }
        if diff < 0 {
            return Err(AuthFailure::FutureSignTime { skew_secs: -diff });
        }
        Ok(())
    }
}

impl AuthProtocol for HmacProtocol {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Hmac
    }

    fn matches(&self, request: &InboundRequest) -> bool {
        request.header(headers::AE_SIGNATURE).is_some()
    }

    fn claimed_identity(&self, request: &InboundRequest) -> Result<ClaimedIdentity, AuthFailure> {
        let app_id = required_header(request, headers::EX_APP_ID)?;
        let app_version = required_header(request, headers::EX_APP_VERSION)?;
        Ok(ClaimedIdentity {
            app_id: AppId::new(app_id),
            app_version: app_version.to_string(),
            user_id: request.header_or_empty(headers::EX_USER_ID).to_string(),
            scheme: AuthScheme::Hmac,
        })
    }

    fn verify(
        &self,
        request: &InboundRequest,
        identity: &ClaimedIdentity,
        secret: &AppSecret,
        now: DateTime<Utc>,
    ) -> Result<(), AuthFailure> {
        let sign_time_raw = required_header(request, headers::AE_SIGN_TIME)?;
        let sign_time: i64 = sign_time_raw
            .trim()
            .parse()
            .map_err(|_| AuthFailure::MalformedHeader(headers::AE_SIGN_TIME))?;
        let claimed_hash = request.header_or_empty(headers::AE_DATA_HASH);

        let canonical = canonical_string(&CanonicalFields {
            method: &request.method,
            uri: &request.uri,
            version: request.header_or_empty(headers::AE_VERSION),
            app_id: identity.app_id.as_str(),
            app_version: &identity.app_version,
            user_id: &identity.user_id,
            data_hash: claimed_hash,
            sign_time: sign_time_raw,
        });
        let expected = sign_canonical(&canonical, secret);
        let presented = request.header_or_empty(headers::AE_SIGNATURE).to_ascii_lowercase();
        if expected.is_empty() || !bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
            return Err(AuthFailure::BadSignature);
        }

        let actual_hash = data_hash(&request.body);
        if !bool::from(actual_hash.as_bytes().ct_eq(claimed_hash.as_bytes())) {
            return Err(AuthFailure::DataHashMismatch);
        }

        self.check_sign_time(sign_time, now)
    }

    fn sign(&self, input: &SignInput<'_>, secret: &AppSecret) -> Vec<(&'static str, String)> {
        let hash = data_hash(input.body);
        let sign_time = input.sign_time.to_string();
        let app_id = input.app_id.to_string();
        let canonical = canonical_string(&CanonicalFields {
            method: input.method,
            uri: input.uri,
            version: PROTOCOL_VERSION,
            app_id: &app_id,
            app_version: input.app_version,
            user_id: input.user_id,
            data_hash: &hash,
            sign_time: &sign_time,
        });
        let signature = sign_canonical(&canonical, secret);

        let mut out = vec![
            (headers::AE_VERSION, PROTOCOL_VERSION.to_string()),
            (headers::EX_APP_ID, app_id),
            (headers::EX_APP_VERSION, input.app_version.to_string()),
        ];
        if !input.user_id.is_empty() {
            out.push((headers::EX_USER_ID, input.user_id.to_string()));
        }
        out.push((headers::AE_DATA_HASH, hash));
        out.push((headers::AE_SIGN_TIME, sign_time));
        out.push((headers::AE_SIGNATURE, signature));
        out.push((headers::AE_REQUEST_ID, input.request_id.to_string()));
        out
    }
}
