// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Signing
//!
//! Implementations of [`AuthProtocol`] and the composite [`AuthVerifier`]
//! that dispatches inbound requests on the header set they carry.
//!
//! | Module | Scheme |
//! |--------|--------|
//! | [`simple`] | shared secret in `AUTHORIZATION-APP-API` |
//! | [`hmac`] | HMAC-SHA256 signature, xxh64 data hash, sign-time window |

pub mod hmac;
pub mod simple;

use std::sync::Arc;
use std::time::Duration;

use crate::domain::auth::{AuthFailure, AuthProtocol, AuthScheme, InboundRequest};

pub use self::hmac::HmacProtocol;
pub use self::simple::SimpleProtocol;

/// Holds every supported protocol generation.
#[derive(Clone)]
pub struct AuthVerifier {
    protocols: Vec<Arc<dyn AuthProtocol>>,
}

impl AuthVerifier {
    pub fn new(protocols: Vec<Arc<dyn AuthProtocol>>) -> Self {
        Self { protocols }
    }

    /// Both generations; HMAC wins when a request carries both header sets.
    pub fn with_default_protocols(replay_window: Duration) -> Self {
        Self::new(vec![
            Arc::new(HmacProtocol::new(replay_window)),
            Arc::new(SimpleProtocol::new()),
        ])
    }

    pub fn select(&self, request: &InboundRequest) -> Result<Arc<dyn AuthProtocol>, AuthFailure> {
        self.protocols
            .iter()
            .find(|p| p.matches(request))
            .cloned()
            .ok_or(AuthFailure::MissingCredentials)
    }

    pub fn protocol(&self, scheme: AuthScheme) -> Option<Arc<dyn AuthProtocol>> {
        self.protocols.iter().find(|p| p.scheme() == scheme).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::headers;
    use std::net::{IpAddr, Ipv4Addr};

    fn request() -> InboundRequest {
        InboundRequest::new("GET", "/cloud/capabilities", IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[test]
    fn test_select_dispatches_on_headers() {
        let verifier = AuthVerifier::with_default_protocols(Duration::from_secs(300));

        let simple = request().with_header(headers::AUTHORIZATION_APP_API, "Ojo=");
        assert_eq!(verifier.select(&simple).unwrap().scheme(), AuthScheme::Simple);

        let hmac = request().with_header(headers::AE_SIGNATURE, "00");
        assert_eq!(verifier.select(&hmac).unwrap().scheme(), AuthScheme::Hmac);

        let both = simple.with_header(headers::AE_SIGNATURE, "00");
        assert_eq!(verifier.select(&both).unwrap().scheme(), AuthScheme::Hmac);
    }

    #[test]
    fn test_select_rejects_bare_request() {
        let verifier = AuthVerifier::with_default_protocols(Duration::from_secs(300));
        assert_eq!(verifier.select(&request()).err(), Some(AuthFailure::MissingCredentials));
    }
}
