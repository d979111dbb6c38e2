// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # ExApp Aggregate
//!
//! A registered external application, its shared secret and its lifecycle
//! status. Status transitions are expressed as methods on [`ExApp`] so the
//! registry's single mutator can apply them under a per-app lock.
//!
//! ```text
//! Registered ──begin_init──▶ Initializing(0..99) ──100──▶ Ready (+enable)
//!                                  │
//!                                  └──error──▶ Failed
//! ```

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of generated app secrets.
pub const SECRET_LENGTH: usize = 128;

const SECRET_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Shared credential between host and app. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppSecret(String);

impl AppSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Random alphanumeric secret of [`SECRET_LENGTH`] characters.
    pub fn generate() -> Self {
        let mut out = String::with_capacity(SECRET_LENGTH);
        let mut buf = [0u8; 64];
        // 248 = 4 * 62, rejecting the tail keeps the distribution uniform
        while out.len() < SECRET_LENGTH {
            OsRng.fill_bytes(&mut buf);
            for b in buf {
                if b < 248 && out.len() < SECRET_LENGTH {
                    out.push(SECRET_ALPHABET[(b % 62) as usize] as char);
                }
            }
        }
        Self(out)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppSecret(***)")
    }
}

/// Initialization phase of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum InitPhase {
    Registered,
    Initializing { progress: u8 },
    Ready,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExAppStatus {
    pub phase: InitPhase,
    pub init_started_at: Option<DateTime<Utc>>,
    /// Cumulative failed heartbeat probes of the last poll.
    #[serde(default)]
    pub heartbeat_failures: u32,
}

impl Default for ExAppStatus {
    fn default() -> Self {
        Self {
            phase: InitPhase::Registered,
            init_started_at: None,
            heartbeat_failures: 0,
        }
    }
}

impl ExAppStatus {
    pub fn active(&self) -> bool {
        matches!(self.phase, InitPhase::Ready)
    }

    pub fn progress(&self) -> Option<u8> {
        match self.phase {
            InitPhase::Initializing { progress } => Some(progress),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            InitPhase::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Externally visible lifecycle state, derived from `enabled` and the phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Registered,
    Initializing { progress: u8 },
    Active,
    Error { message: String },
    Disabled,
}

/// Result of applying an init progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Progressed(u8),
    /// Progress reached 100; the caller must enable the app.
    Completed,
    Failed,
    /// Report arrived after initialization already finished.
    Ignored,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("init progress {0} is outside 0..=100")]
pub struct InvalidProgress(pub u16);

/// Registration payload supplied by the administrative flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExAppRegistration {
    pub app_id: AppId,
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub secret: Option<AppSecret>,
    pub port: u16,
    pub daemon_config_name: String,
    #[serde(default)]
    pub accepts_deploy_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExApp {
    pub app_id: AppId,
    pub version: String,
    pub name: String,
    pub secret: AppSecret,
    pub port: u16,
    pub daemon_config_name: String,
    pub accepts_deploy_id: String,
    pub enabled: bool,
    pub status: ExAppStatus,
    pub last_check_time: Option<DateTime<Utc>>,
    pub created_time: DateTime<Utc>,
    /// Bumped by every persisted mutation.
    #[serde(default)]
    pub revision: u64,
}

impl ExApp {
    /// New app in the `Registered` phase; generates a secret when none is given.
    pub fn register(reg: ExAppRegistration) -> Self {
        let secret = match reg.secret {
            Some(s) if !s.is_empty() => s,
            _ => AppSecret::generate(),
        };
        Self {
            app_id: reg.app_id,
            version: reg.version,
            name: reg.name,
            secret,
            port: reg.port,
            daemon_config_name: reg.daemon_config_name,
            accepts_deploy_id: reg.accepts_deploy_id,
            enabled: false,
            status: ExAppStatus::default(),
            last_check_time: None,
            created_time: Utc::now(),
            revision: 0,
        }
    }

    /// Re-registration keeps identity, state and secret unless a new secret is supplied.
    pub fn apply_registration(&mut self, reg: ExAppRegistration) {
        self.version = reg.version;
        self.name = reg.name;
        self.port = reg.port;
        self.daemon_config_name = reg.daemon_config_name;
        self.accepts_deploy_id = reg.accepts_deploy_id;
        if let Some(secret) = reg.secret.filter(|s| !s.is_empty()) {
            self.secret = secret;
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        match &self.status.phase {
            InitPhase::Registered => LifecycleState::Registered,
            InitPhase::Initializing { progress } => LifecycleState::Initializing { progress: *progress },
            InitPhase::Failed { error } => LifecycleState::Error { message: error.clone() },
            InitPhase::Ready if self.enabled => LifecycleState::Active,
            InitPhase::Ready => LifecycleState::Disabled,
        }
    }

    /// Requests from a disabled app are only admitted while it is initializing.
    pub fn accepts_requests(&self) -> bool {
        self.enabled || self.status.progress().is_some()
    }

    /// Enter `Initializing(0)` and stamp the start time.
    pub fn begin_init(&mut self, now: DateTime<Utc>) {
        self.status.phase = InitPhase::Initializing { progress: 0 };
        self.status.init_started_at = Some(now);
        self.status.heartbeat_failures = 0;
    }

    pub fn apply_init_progress(
        &mut self,
        progress: u16,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<InitOutcome, InvalidProgress> {
        if progress > 100 {
            return Err(InvalidProgress(progress));
        }
        if let Some(err) = error.filter(|e| !e.is_empty()) {
            self.status.phase = InitPhase::Failed { error: err.to_string() };
            return Ok(InitOutcome::Failed);
        }
        if self.status.active() && progress != 0 {
            return Ok(InitOutcome::Ignored);
        }
        match progress {
            0 => {
                self.begin_init(now);
                Ok(InitOutcome::Progressed(0))
            }
            100 => {
                self.status.phase = InitPhase::Ready;
                Ok(InitOutcome::Completed)
            }
            p => {
                let p = p as u8;
                self.status.phase = InitPhase::Initializing { progress: p };
                Ok(InitOutcome::Progressed(p))
            }
        }
    }

    /// Mark enabled; a successful enable also clears any recorded error.
    pub fn mark_enabled(&mut self, now: DateTime<Utc>) {
        self.enabled = true;
        if matches!(self.status.phase, InitPhase::Failed { .. }) {
            self.status.phase = InitPhase::Ready;
        }
        self.last_check_time = Some(now);
    }

    pub fn mark_disabled(&mut self) {
        self.enabled = false;
    }

    /// Undo [`mark_enabled`](Self::mark_enabled) after the app refused.
    /// `previous` is restored only if nothing moved the phase since.
    pub fn revert_enable(&mut self, previous: InitPhase) {
        self.enabled = false;
        if self.status.phase == InitPhase::Ready {
            self.status.phase = previous;
        }
    }

    /// Version drift: adopt the claimed version and fail closed.
    pub fn force_disable_for_version(&mut self, claimed_version: &str) {
        self.version = claimed_version.to_string();
        self.enabled = false;
        if self.status.progress().is_some() {
            self.status.phase = InitPhase::Failed {
                error: format!("version changed to {} during initialization", claimed_version),
            };
        }
    }

    /// True when initialization started before `deadline` and never finished.
    pub fn init_stalled_since(&self, deadline: DateTime<Utc>) -> bool {
        self.status.progress().is_some()
            && self.status.init_started_at.is_some_and(|t| t < deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(secret: Option<&str>) -> ExAppRegistration {
        ExAppRegistration {
            app_id: AppId::new("mail-bridge"),
            version: "1.0.0".into(),
            name: "Mail Bridge".into(),
            secret: secret.map(AppSecret::new),
            port: 23000,
            daemon_config_name: "docker_local".into(),
            accepts_deploy_id: "docker-install".into(),
        }
    }

    #[test]
    fn register_generates_secret_when_absent() {
        let app = ExApp::register(registration(None));
        assert_eq!(app.secret.expose().len(), SECRET_LENGTH);
        assert!(app.secret.expose().bytes().all(|b| b.is_ascii_alphanumeric()));
        assert_eq!(app.lifecycle_state(), LifecycleState::Registered);
        assert!(!app.enabled);
        assert!(!app.status.active());
    }

    #[test]
    fn register_keeps_supplied_secret() {
        let app = ExApp::register(registration(Some("s3cr3t")));
        assert_eq!(app.secret.expose(), "s3cr3t");
    }

    #[test]
    fn secret_is_not_printed() {
        let app = ExApp::register(registration(Some("s3cr3t")));
        assert!(!format!("{:?}", app).contains("s3cr3t"));
    }

    #[test]
    fn progress_sequence_completes() {
        let mut app = ExApp::register(registration(Some("x")));
        let now = Utc::now();
        assert_eq!(app.apply_init_progress(0, None, now), Ok(InitOutcome::Progressed(0)));
        assert_eq!(app.status.init_started_at, Some(now));
        assert_eq!(app.apply_init_progress(50, None, now), Ok(InitOutcome::Progressed(50)));
        assert_eq!(app.lifecycle_state(), LifecycleState::Initializing { progress: 50 });
        assert_eq!(app.apply_init_progress(100, None, now), Ok(InitOutcome::Completed));
        assert!(app.status.active());
        assert_eq!(app.status.progress(), None);
    }

    #[test]
    fn error_clears_progress() {
        let mut app = ExApp::register(registration(Some("x")));
        let now = Utc::now();
        app.apply_init_progress(0, None, now).unwrap();
        assert_eq!(app.apply_init_progress(0, Some("boom"), now), Ok(InitOutcome::Failed));
        assert_eq!(app.status.error(), Some("boom"));
        assert_eq!(app.status.progress(), None);
        assert!(!app.enabled);
    }

    #[test]
    fn late_reports_are_ignored_after_completion() {
        let mut app = ExApp::register(registration(Some("x")));
        let now = Utc::now();
        app.apply_init_progress(100, None, now).unwrap();
        assert_eq!(app.apply_init_progress(40, None, now), Ok(InitOutcome::Ignored));
        assert!(app.status.active());
        // restarting from zero is always allowed
        assert_eq!(app.apply_init_progress(0, None, now), Ok(InitOutcome::Progressed(0)));
    }

    #[test]
    fn out_of_range_progress_is_rejected() {
        let mut app = ExApp::register(registration(Some("x")));
        assert_eq!(app.apply_init_progress(101, None, Utc::now()), Err(InvalidProgress(101)));
    }

    #[test]
    fn initializing_app_accepts_requests_while_disabled() {
        let mut app = ExApp::register(registration(Some("x")));
        assert!(!app.accepts_requests());
        app.begin_init(Utc::now());
        assert!(app.accepts_requests());
    }

    #[test]
    fn version_drift_disables_and_records_version() {
        let mut app = ExApp::register(registration(Some("x")));
        app.apply_init_progress(100, None, Utc::now()).unwrap();
        app.mark_enabled(Utc::now());
        assert_eq!(app.lifecycle_state(), LifecycleState::Active);
        app.force_disable_for_version("2.0.0");
        assert_eq!(app.version, "2.0.0");
        assert_eq!(app.lifecycle_state(), LifecycleState::Disabled);
    }

    #[test]
    fn enabling_clears_error() {
        let mut app = ExApp::register(registration(Some("x")));
        app.apply_init_progress(0, Some("bad"), Utc::now()).unwrap();
        app.mark_enabled(Utc::now());
        assert_eq!(app.status.error(), None);
        assert_eq!(app.lifecycle_state(), LifecycleState::Active);
    }

    #[test]
    fn reverted_enable_restores_error() {
        let mut app = ExApp::register(registration(Some("x")));
        app.apply_init_progress(0, Some("bad"), Utc::now()).unwrap();
        let previous = app.status.phase.clone();
        app.mark_enabled(Utc::now());
        app.revert_enable(previous);
        assert!(!app.enabled);
        assert_eq!(app.status.error(), Some("bad"));
    }
}
