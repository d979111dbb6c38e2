// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts, one per aggregate or grant table, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Rows | Implementations |
//! |-------|------|----------------|
//! | `ExAppRepository` | `ExApp` | `InMemoryExAppRepository`, `PostgresExAppRepository` |
//! | `ApiScopeRepository` | `ApiScope` | `InMemoryApiScopeRepository`, `PostgresApiScopeRepository` |
//! | `ExAppScopeRepository` | `ExAppScope` | `InMemoryExAppScopeRepository`, `PostgresExAppScopeRepository` |
//! | `ExAppUserRepository` | `ExAppUser` | `InMemoryExAppUserRepository`, `PostgresExAppUserRepository` |
//! | `DaemonConfigRepository` | `DaemonConfig` | `InMemoryDaemonConfigRepository`, `PostgresDaemonConfigRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! The backend is selected at startup from `spec.storage` in the gateway
//! configuration. In-memory stores serve development and tests; PostgreSQL
//! serves production.

use async_trait::async_trait;

use crate::domain::daemon::DaemonConfig;
use crate::domain::exapp::{AppId, ExApp};
use crate::domain::scope::{ApiScope, ExAppScope, ScopeGroup};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait ExAppRepository: Send + Sync {
    /// Save app (create or update). Fails with `Conflict` unless `app`
    /// carries a higher `revision` than the stored row.
    async fn save(&self, app: &ExApp) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, app_id: &AppId) -> Result<Option<ExApp>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<ExApp>, RepositoryError>;

    async fn delete(&self, app_id: &AppId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApiScopeRepository: Send + Sync {
    /// Insert or replace the row for `scope.api_route`.
    async fn upsert(&self, scope: &ApiScope) -> Result<(), RepositoryError>;

    async fn list_all(&self) -> Result<Vec<ApiScope>, RepositoryError>;
}

#[async_trait]
pub trait ExAppScopeRepository: Send + Sync {
    async fn grant(&self, grant: &ExAppScope) -> Result<(), RepositoryError>;

    async fn revoke(&self, app_id: &AppId, group: ScopeGroup) -> Result<(), RepositoryError>;

    async fn find_by_app(&self, app_id: &AppId) -> Result<Vec<ScopeGroup>, RepositoryError>;

    async fn delete_by_app(&self, app_id: &AppId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ExAppUserRepository: Send + Sync {
    async fn exists(&self, app_id: &AppId, user_id: &str) -> Result<bool, RepositoryError>;

    /// Idempotent insert.
    async fn insert(&self, app_id: &AppId, user_id: &str) -> Result<(), RepositoryError>;

    async fn delete_by_app(&self, app_id: &AppId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DaemonConfigRepository: Send + Sync {
    async fn save(&self, config: &DaemonConfig) -> Result<(), RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<DaemonConfig>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<DaemonConfig>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Stale write: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
