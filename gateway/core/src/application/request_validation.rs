// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Inbound Request Validation
//!
//! Ordered, short-circuiting pipeline deciding whether a request that claims
//! to come from an ExApp is trusted:
//!
//! 1. throttle check for the client address
//! 2. resolve the claimed app (unknown ids count as failed attempts)
//! 3. verify the credential (secret or signature plus data hash)
//! 4. sign-time window (HMAC only, inside the protocol)
//! 5. enabled check; initializing apps are let through
//! 6. version drift: adopt, force-disable, notify admins, reject
//! 7. scope authorization
//! 8. user context when the matched scope asks for it
//! 9. bind the session and reset the throttle for this client+app
//!
//! Every failure is logged with its reason and published as a
//! [`SecurityEvent`]; callers must turn any [`ValidationError`] into the
//! same generic rejection.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::application::registry::{AppRegistry, RegistryError};
use crate::application::scope_authority::{ScopeAuthority, ScopeError};
use crate::domain::auth::{headers, AuthFailure, AuthScheme, AuthorizationFailure, InboundRequest};
use crate::domain::events::{AdminNotification, AdminNotifier, ExAppLifecycleEvent, SecurityEvent};
use crate::domain::exapp::AppId;
use crate::domain::throttle::{Throttled, Throttler};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::signing::AuthVerifier;

/// Identity bound to a validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExAppSession {
    pub app_id: AppId,
    pub app_version: String,
    /// `None` for anonymous/system context.
    pub user_id: Option<String>,
    pub scheme: AuthScheme,
}

impl ExAppSession {
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("client throttled: {0}")]
    Throttled(#[from] Throttled),

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthFailure),

    #[error("app {0} is disabled")]
    Disabled(AppId),

    #[error("app {app_id} claimed version {claimed} but {stored} is registered")]
    VersionDrift {
        app_id: AppId,
        stored: String,
        claimed: String,
    },

    #[error("authorization failed: {0}")]
    Authorization(#[from] AuthorizationFailure),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for ValidationError {
    fn from(err: RegistryError) -> Self {
        ValidationError::Internal(err.to_string())
    }
}

impl From<ScopeError> for ValidationError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::Denied(failure) => ValidationError::Authorization(failure),
            ScopeError::Registry(e) => e.into(),
        }
    }
}

impl ValidationError {
    /// Whether the failure counts towards the client's throttle budget.
    fn counts_as_attempt(&self) -> bool {
        !matches!(self, ValidationError::Throttled(_) | ValidationError::Internal(_))
    }
}

pub struct RequestValidator {
    verifier: AuthVerifier,
    registry: Arc<AppRegistry>,
    scopes: Arc<ScopeAuthority>,
    throttler: Arc<dyn Throttler>,
    notifier: Arc<dyn AdminNotifier>,
    event_bus: EventBus,
}

impl RequestValidator {
    pub fn new(
        verifier: AuthVerifier,
        registry: Arc<AppRegistry>,
        scopes: Arc<ScopeAuthority>,
        throttler: Arc<dyn Throttler>,
        notifier: Arc<dyn AdminNotifier>,
        event_bus: EventBus,
    ) -> Self {
        Self { verifier, registry, scopes, throttler, notifier, event_bus }
    }

    pub async fn validate(&self, request: &InboundRequest) -> Result<ExAppSession, ValidationError> {
        match self.run_pipeline(request).await {
            Ok(session) => {
                self.throttler.reset(request.client_addr, session.app_id.as_str());
                debug!(
                    app_id = %session.app_id,
                    user_id = session.user_id.as_deref().unwrap_or(""),
                    scheme = %session.scheme,
                    path = %request.path,
                    "ExApp request validated"
                );
                Ok(session)
            }
            Err(err) => {
                self.reject(request, &err);
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, request: &InboundRequest) -> Result<ExAppSession, ValidationError> {
        let delay = self.throttler.delay_for(request.client_addr)?;
        if !delay.is_zero() {
            debug!(client = %request.client_addr, delay_ms = delay.as_millis() as u64, "Delaying throttled client");
            tokio::time::sleep(delay).await;
        }

        let protocol = self.verifier.select(request)?;
        let identity = protocol.claimed_identity(request)?;
        let app = self
            .registry
            .get(&identity.app_id)
            .await?
            .ok_or_else(|| AuthFailure::UnknownApp(identity.app_id.clone()))?;

        protocol.verify(request, &identity, &app.secret, Utc::now())?;

        if !app.accepts_requests() {
            return Err(ValidationError::Disabled(app.app_id));
        }

        if identity.app_version != app.version {
            return Err(self.handle_version_drift(&app.app_id, &app.version, &identity.app_version).await);
        }

        let decision = self.scopes.authorize(&app.app_id, &request.path).await?;

        if decision.user_check && !self.registry.user_exists(&app.app_id, &identity.user_id).await? {
            return Err(AuthorizationFailure::UnknownUser {
                app_id: app.app_id.clone(),
                user_id: identity.user_id.clone(),
            }
            .into());
        }

        let user_id = Some(identity.user_id).filter(|u| !u.is_empty());
        Ok(ExAppSession {
            app_id: app.app_id,
            app_version: identity.app_version,
            user_id,
            scheme: identity.scheme,
        })
    }

    /// Fail closed: record the claimed version, disable, and tell the admins.
    async fn handle_version_drift(&self, app_id: &AppId, stored: &str, claimed: &str) -> ValidationError {
        let claimed_version = claimed.to_string();
        match self
            .registry
            .update(app_id, move |app| app.force_disable_for_version(&claimed_version))
            .await
        {
            Ok(_) => {
                self.event_bus.publish_lifecycle_event(ExAppLifecycleEvent::Disabled {
                    app_id: app_id.clone(),
                    disabled_at: Utc::now(),
                });
            }
            Err(e) => error!(app_id = %app_id, error = %e, "Failed to disable app after version drift"),
        }
        self.event_bus.publish_security_event(SecurityEvent::VersionDrift {
            app_id: app_id.clone(),
            stored_version: stored.to_string(),
            claimed_version: claimed.to_string(),
            detected_at: Utc::now(),
        });
        self.notifier
            .notify_admins(AdminNotification::version_drift(app_id, stored, claimed))
            .await;
        ValidationError::VersionDrift {
            app_id: app_id.clone(),
            stored: stored.to_string(),
            claimed: claimed.to_string(),
        }
    }

    fn reject(&self, request: &InboundRequest, err: &ValidationError) {
        let claimed_app_id = request.header(headers::EX_APP_ID).map(str::to_string);
        let client = request.client_addr;
        match err {
            ValidationError::Throttled(t) => {
                warn!(client = %client, attempts = t.attempts, "Rejected throttled client");
                self.event_bus.publish_security_event(SecurityEvent::ClientThrottled {
                    client: client.to_string(),
                    attempts: t.attempts,
                    throttled_at: Utc::now(),
                });
                return;
            }
            ValidationError::Internal(reason) => {
                error!(client = %client, app_id = claimed_app_id.as_deref().unwrap_or(""), reason = %reason, "Request validation failed internally");
            }
            other => {
                warn!(
                    client = %client,
                    app_id = claimed_app_id.as_deref().unwrap_or(""),
                    method = %request.method,
                    path = %request.path,
                    reason = %other,
                    "Rejected ExApp request"
                );
            }
        }
        if err.counts_as_attempt() {
            self.throttler
                .register_attempt(client, claimed_app_id.as_deref().unwrap_or(""));
        }
        self.event_bus.publish_security_event(SecurityEvent::RequestRejected {
            claimed_app_id,
            client: client.to_string(),
            reason: err.to_string(),
            rejected_at: Utc::now(),
        });
    }
}
