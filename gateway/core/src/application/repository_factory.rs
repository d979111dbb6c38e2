// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations for the configured storage
//! backend, keeping the domain layer free of infrastructure types.

use std::sync::Arc;
use sqlx::PgPool;

use crate::domain::repository::{
    ApiScopeRepository, DaemonConfigRepository, ExAppRepository, ExAppScopeRepository,
    ExAppUserRepository, StorageBackend,
};
use crate::infrastructure::repositories::{
    InMemoryApiScopeRepository, InMemoryDaemonConfigRepository, InMemoryExAppRepository,
    InMemoryExAppScopeRepository, InMemoryExAppUserRepository, PostgresApiScopeRepository,
    PostgresDaemonConfigRepository, PostgresExAppRepository, PostgresExAppScopeRepository,
    PostgresExAppUserRepository,
};

/// One repository per table, all on the same backend.
#[derive(Clone)]
pub struct RepositorySet {
    pub apps: Arc<dyn ExAppRepository>,
    pub api_scopes: Arc<dyn ApiScopeRepository>,
    pub grants: Arc<dyn ExAppScopeRepository>,
    pub users: Arc<dyn ExAppUserRepository>,
    pub daemons: Arc<dyn DaemonConfigRepository>,
}

impl RepositorySet {
    pub fn in_memory() -> Self {
        Self {
            apps: Arc::new(InMemoryExAppRepository::new()),
            api_scopes: Arc::new(InMemoryApiScopeRepository::new()),
            grants: Arc::new(InMemoryExAppScopeRepository::new()),
            users: Arc::new(InMemoryExAppUserRepository::new()),
            daemons: Arc::new(InMemoryDaemonConfigRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            apps: Arc::new(PostgresExAppRepository::new(pool.clone())),
            api_scopes: Arc::new(PostgresApiScopeRepository::new(pool.clone())),
            grants: Arc::new(PostgresExAppScopeRepository::new(pool.clone())),
            users: Arc::new(PostgresExAppUserRepository::new(pool.clone())),
            daemons: Arc::new(PostgresDaemonConfigRepository::new(pool)),
        }
    }

    /// `pool` is only consulted for the PostgreSQL backend.
    pub fn for_backend(backend: &StorageBackend, pool: Option<PgPool>) -> anyhow::Result<Self> {
        match (backend, pool) {
            (StorageBackend::InMemory, _) => Ok(Self::in_memory()),
            (StorageBackend::PostgreSQL(_), Some(pool)) => Ok(Self::postgres(pool)),
            (StorageBackend::PostgreSQL(_), None) => {
                anyhow::bail!("PostgreSQL backend selected but no connection pool was provided")
            }
        }
    }
}
