// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Host Capability Providers
//!
//! ExApps can back host capabilities (speech-to-text, translation, text
//! processing). Each kind is an explicit trait; registrations are keyed by
//! `(app_id, name)` and turned into adapters by the application layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::exapp::AppId;
use crate::domain::proxy::ProxyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    SpeechToText,
    Translation,
    TextProcessing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderKey {
    pub app_id: AppId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRegistration {
    pub app_id: AppId,
    pub name: String,
    pub display_name: String,
    pub kind: ProviderKind,
    /// Route on the app that performs the work.
    pub action_handler: String,
    /// Text-processing task type, e.g. `summary`.
    #[serde(default)]
    pub task_type: Option<String>,
}

impl ProviderRegistration {
    pub fn key(&self) -> ProviderKey {
        ProviderKey { app_id: self.app_id.clone(), name: self.name.clone() }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider app {0} is not available")]
    AppUnavailable(AppId),
    #[error("provider answered with status {0}")]
    Failed(u16),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

#[async_trait]
pub trait SpeechToTextProvider: Send + Sync {
    fn display_name(&self) -> &str;

    async fn transcribe_file(&self, file_id: i64) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn display_name(&self) -> &str;

    async fn translate(
        &self,
        user_id: &str,
        from_language: Option<&str>,
        to_language: &str,
        text: &str,
    ) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait TextProcessingProvider: Send + Sync {
    fn display_name(&self) -> &str;

    fn task_type(&self) -> &str;

    async fn process(&self, user_id: &str, prompt: &str) -> Result<String, ProviderError>;
}
