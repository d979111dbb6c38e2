// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Registry
//!
//! Registrations of ExApp-backed host capabilities, keyed by
//! `(app_id, name)`. [`ProviderRegistry::adapter`] turns a registration into
//! a [`ProviderAdapter`], a tagged variant whose inner value implements the
//! capability trait for its kind and calls the app's action handler.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::exapp_client::ExAppClient;
use crate::domain::exapp::{AppId, ExApp};
use crate::domain::providers::{
    ProviderError, ProviderKey, ProviderKind, ProviderRegistration, SpeechToTextProvider, TextProcessingProvider,
    TranslationProvider,
};
use crate::domain::proxy::{ProxyError, ProxyRequest, ProxyResponse};

pub struct ProviderRegistry {
    client: Arc<ExAppClient>,
    registrations: DashMap<ProviderKey, ProviderRegistration>,
}

impl ProviderRegistry {
    pub fn new(client: Arc<ExAppClient>) -> Self {
        Self { client, registrations: DashMap::new() }
    }

    /// Add or replace a registration. The owning app must be registered.
    pub async fn register(&self, registration: ProviderRegistration) -> Result<(), ProviderError> {
        self.client.app(&registration.app_id).await.map_err(|e| match e {
            ProxyError::UnknownApp(id) => ProviderError::AppUnavailable(id),
            other => ProviderError::Proxy(other),
        })?;
        info!(
            app_id = %registration.app_id,
            name = %registration.name,
            kind = ?registration.kind,
            "Provider registered"
        );
        self.registrations.insert(registration.key(), registration);
        Ok(())
    }

    pub fn unregister(&self, key: &ProviderKey) -> Option<ProviderRegistration> {
        self.registrations.remove(key).map(|(_, r)| r)
    }

    /// Drop every registration owned by `app_id`; returns how many were removed.
    pub fn remove_app(&self, app_id: &AppId) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|key, _| &key.app_id != app_id);
        before.saturating_sub(self.registrations.len())
    }

    pub fn get(&self, key: &ProviderKey) -> Option<ProviderRegistration> {
        self.registrations.get(key).map(|r| r.value().clone())
    }

    /// Registrations sorted by key, optionally restricted to one kind.
    pub fn list(&self, kind: Option<ProviderKind>) -> Vec<ProviderRegistration> {
        let mut out: Vec<ProviderRegistration> = self
            .registrations
            .iter()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by_key(|r| r.key());
        out
    }

    pub fn adapter(&self, key: &ProviderKey) -> Option<ProviderAdapter> {
        self.get(key).map(|registration| ProviderAdapter::new(self.client.clone(), registration))
    }

    pub fn speech_to_text_providers(&self) -> Vec<Arc<dyn SpeechToTextProvider>> {
        self.list(Some(ProviderKind::SpeechToText))
            .into_iter()
            .map(|r| Arc::new(RemoteSpeechToText(RemoteProvider::new(self.client.clone(), r))) as Arc<dyn SpeechToTextProvider>)
            .collect()
    }

    pub fn translation_providers(&self) -> Vec<Arc<dyn TranslationProvider>> {
        self.list(Some(ProviderKind::Translation))
            .into_iter()
            .map(|r| Arc::new(RemoteTranslation(RemoteProvider::new(self.client.clone(), r))) as Arc<dyn TranslationProvider>)
            .collect()
    }

    pub fn text_processing_providers(&self) -> Vec<Arc<dyn TextProcessingProvider>> {
        self.list(Some(ProviderKind::TextProcessing))
            .into_iter()
            .map(|r| {
                Arc::new(RemoteTextProcessing(RemoteProvider::new(self.client.clone(), r)))
                    as Arc<dyn TextProcessingProvider>
            })
            .collect()
    }
}

/// One adapter per provider kind.
pub enum ProviderAdapter {
    SpeechToText(RemoteSpeechToText),
    Translation(RemoteTranslation),
    TextProcessing(RemoteTextProcessing),
}

impl ProviderAdapter {
    fn new(client: Arc<ExAppClient>, registration: ProviderRegistration) -> Self {
        let kind = registration.kind;
        let remote = RemoteProvider::new(client, registration);
        match kind {
            ProviderKind::SpeechToText => ProviderAdapter::SpeechToText(RemoteSpeechToText(remote)),
            ProviderKind::Translation => ProviderAdapter::Translation(RemoteTranslation(remote)),
            ProviderKind::TextProcessing => ProviderAdapter::TextProcessing(RemoteTextProcessing(remote)),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderAdapter::SpeechToText(_) => ProviderKind::SpeechToText,
            ProviderAdapter::Translation(_) => ProviderKind::Translation,
            ProviderAdapter::TextProcessing(_) => ProviderKind::TextProcessing,
        }
    }

    pub fn registration(&self) -> &ProviderRegistration {
        match self {
            ProviderAdapter::SpeechToText(p) => &p.0.registration,
            ProviderAdapter::Translation(p) => &p.0.registration,
            ProviderAdapter::TextProcessing(p) => &p.0.registration,
        }
    }
}

struct RemoteProvider {
    client: Arc<ExAppClient>,
    registration: ProviderRegistration,
}

impl RemoteProvider {
    fn new(client: Arc<ExAppClient>, registration: ProviderRegistration) -> Self {
        Self { client, registration }
    }

    async fn available_app(&self) -> Result<ExApp, ProviderError> {
        let app_id = &self.registration.app_id;
        match self.client.app(app_id).await {
            Ok(app) if app.enabled => Ok(app),
            Ok(_) | Err(ProxyError::UnknownApp(_)) => Err(ProviderError::AppUnavailable(app_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn call(&self, user_id: &str, params: Value) -> Result<String, ProviderError> {
        self.available_app().await?;
        let Value::Object(params) = params else {
            return Err(ProxyError::InvalidRequest("provider params must be an object".into()).into());
        };
        let request = ProxyRequest::post(self.registration.action_handler.clone()).json_params(params);
        let response = if user_id.is_empty() {
            self.client.request(&self.registration.app_id, request).await?
        } else {
            self.client.request_as_user(&self.registration.app_id, user_id, request).await?
        };
        if !response.is_success() {
            warn!(
                app_id = %self.registration.app_id,
                provider = %self.registration.name,
                status = response.status,
                "Provider call failed"
            );
            return Err(ProviderError::Failed(response.status));
        }
        debug!(app_id = %self.registration.app_id, provider = %self.registration.name, "Provider call succeeded");
        Ok(provider_result(&response))
    }
}

/// The `result` field of a JSON answer, or the raw body text.
fn provider_result(response: &ProxyResponse) -> String {
    match response.json::<Value>() {
        Ok(Value::Object(body)) => match body.get("result") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => response.text(),
        },
        _ => response.text(),
    }
}

pub struct RemoteSpeechToText(RemoteProvider);

#[async_trait]
impl SpeechToTextProvider for RemoteSpeechToText {
    fn display_name(&self) -> &str {
        &self.0.registration.display_name
    }

    async fn transcribe_file(&self, file_id: i64) -> Result<String, ProviderError> {
        self.0.call("", json!({ "fileid": file_id })).await
    }
}

pub struct RemoteTranslation(RemoteProvider);

#[async_trait]
impl TranslationProvider for RemoteTranslation {
    fn display_name(&self) -> &str {
        &self.0.registration.display_name
    }

    async fn translate(
        &self,
        user_id: &str,
        from_language: Option<&str>,
        to_language: &str,
        text: &str,
    ) -> Result<String, ProviderError> {
        let params = json!({
            "from_language": from_language,
            "to_language": to_language,
            "text": text,
        });
        self.0.call(user_id, params).await
    }
}

pub struct RemoteTextProcessing(RemoteProvider);

#[async_trait]
impl TextProcessingProvider for RemoteTextProcessing {
    fn display_name(&self) -> &str {
        &self.0.registration.display_name
    }

    fn task_type(&self) -> &str {
        self.0.registration.task_type.as_deref().unwrap_or("")
    }

    async fn process(&self, user_id: &str, prompt: &str) -> Result<String, ProviderError> {
        let params = json!({ "prompt": prompt, "task_type": self.task_type() });
        self.0.call(user_id, params).await
    }
}
