// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits declared in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve apps, scopes, users and daemon configs
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresExAppRepository** - `ex_apps` table
//! - **PostgresApiScopeRepository** / **PostgresExAppScopeRepository** /
//!   **PostgresExAppUserRepository** - route table and grants
//! - **PostgresDaemonConfigRepository** - `daemon_configs` table
//!
//! ## In-Memory Repositories
//!
//! Lock-guarded `HashMap`/`HashSet` storage for tests and development.

pub mod postgres_daemon;
pub mod postgres_exapp;
pub mod postgres_scopes;

pub use postgres_daemon::PostgresDaemonConfigRepository;
pub use postgres_exapp::PostgresExAppRepository;
pub use postgres_scopes::{PostgresApiScopeRepository, PostgresExAppScopeRepository, PostgresExAppUserRepository};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::domain::daemon::DaemonConfig;
use crate::domain::exapp::{AppId, ExApp};
use crate::domain::repository::{
    ApiScopeRepository, DaemonConfigRepository, ExAppRepository, ExAppScopeRepository,
    ExAppUserRepository, RepositoryError,
};
use crate::domain::scope::{ApiScope, ExAppScope, ScopeGroup};

#[derive(Clone, Default)]
pub struct InMemoryExAppRepository {
    apps: Arc<RwLock<BTreeMap<AppId, ExApp>>>,
}

impl InMemoryExAppRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExAppRepository for InMemoryExAppRepository {
    async fn save(&self, app: &ExApp) -> Result<(), RepositoryError> {
        let mut apps = self.apps.write();
        if let Some(stored) = apps.get(&app.app_id) {
            if stored.revision >= app.revision {
                return Err(RepositoryError::Conflict(format!(
                    "{} is at revision {}, write carries {}",
                    app.app_id, stored.revision, app.revision
                )));
            }
        }
        apps.insert(app.app_id.clone(), app.clone());
        Ok(())
    }

    async fn find_by_id(&self, app_id: &AppId) -> Result<Option<ExApp>, RepositoryError> {
        Ok(self.apps.read().get(app_id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<ExApp>, RepositoryError> {
        Ok(self.apps.read().values().cloned().collect())
    }

    async fn delete(&self, app_id: &AppId) -> Result<(), RepositoryError> {
        self.apps.write().remove(app_id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryApiScopeRepository {
    scopes: Arc<RwLock<BTreeMap<String, ApiScope>>>,
}

impl InMemoryApiScopeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiScopeRepository for InMemoryApiScopeRepository {
    async fn upsert(&self, scope: &ApiScope) -> Result<(), RepositoryError> {
        self.scopes.write().insert(scope.api_route.clone(), scope.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ApiScope>, RepositoryError> {
        Ok(self.scopes.read().values().cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryExAppScopeRepository {
    grants: Arc<RwLock<HashSet<ExAppScope>>>,
}

impl InMemoryExAppScopeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExAppScopeRepository for InMemoryExAppScopeRepository {
    async fn grant(&self, grant: &ExAppScope) -> Result<(), RepositoryError> {
        self.grants.write().insert(grant.clone());
        Ok(())
    }

    async fn revoke(&self, app_id: &AppId, group: ScopeGroup) -> Result<(), RepositoryError> {
        self.grants.write().remove(&ExAppScope { app_id: app_id.clone(), scope_group: group });
        Ok(())
    }

    async fn find_by_app(&self, app_id: &AppId) -> Result<Vec<ScopeGroup>, RepositoryError> {
        let mut groups: Vec<ScopeGroup> = self
            .grants
            .read()
            .iter()
            .filter(|g| &g.app_id == app_id)
            .map(|g| g.scope_group)
            .collect();
        groups.sort();
        Ok(groups)
    }

    async fn delete_by_app(&self, app_id: &AppId) -> Result<(), RepositoryError> {
        self.grants.write().retain(|g| &g.app_id != app_id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryExAppUserRepository {
    users: Arc<RwLock<HashMap<AppId, HashSet<String>>>>,
}

impl InMemoryExAppUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExAppUserRepository for InMemoryExAppUserRepository {
    async fn exists(&self, app_id: &AppId, user_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.users.read().get(app_id).is_some_and(|u| u.contains(user_id)))
    }

    async fn insert(&self, app_id: &AppId, user_id: &str) -> Result<(), RepositoryError> {
        self.users
            .write()
            .entry(app_id.clone())
            .or_default()
            .insert(user_id.to_string());
        Ok(())
    }

    async fn delete_by_app(&self, app_id: &AppId) -> Result<(), RepositoryError> {
        self.users.write().remove(app_id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDaemonConfigRepository {
    daemons: Arc<RwLock<BTreeMap<String, DaemonConfig>>>,
}

impl InMemoryDaemonConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DaemonConfigRepository for InMemoryDaemonConfigRepository {
    async fn save(&self, config: &DaemonConfig) -> Result<(), RepositoryError> {
        self.daemons.write().insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<DaemonConfig>, RepositoryError> {
        Ok(self.daemons.read().get(name).cloned())
    }

    async fn list_all(&self) -> Result<Vec<DaemonConfig>, RepositoryError> {
        Ok(self.daemons.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exapp::{AppSecret, ExAppRegistration};

    fn app(id: &str) -> ExApp {
        ExApp::register(ExAppRegistration {
            app_id: AppId::new(id),
            version: "1.0.0".into(),
            name: id.into(),
            secret: Some(AppSecret::new("s")),
            port: 1,
            daemon_config_name: "d".into(),
            accepts_deploy_id: String::new(),
        })
    }

    #[tokio::test]
    async fn test_exapp_save_find_delete() {
        let repo = InMemoryExAppRepository::new();
        repo.save(&app("b")).await.unwrap();
        repo.save(&app("a")).await.unwrap();
        let ids: Vec<String> = repo.list_all().await.unwrap().into_iter().map(|a| a.app_id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        repo.delete(&AppId::new("a")).await.unwrap();
        assert!(repo.find_by_id(&AppId::new("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected() {
        let repo = InMemoryExAppRepository::new();
        let mut current = app("a");
        current.revision = 3;
        repo.save(&current).await.unwrap();
        let mut stale = current.clone();
        stale.revision = 2;
        assert!(matches!(repo.save(&stale).await, Err(RepositoryError::Conflict(_))));
        assert!(matches!(repo.save(&current).await, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_second_writer_from_same_revision_conflicts() {
        let repo = InMemoryExAppRepository::new();
        let mut seeded = app("a");
        seeded.revision = 1;
        repo.save(&seeded).await.unwrap();

        let mut first = repo.find_by_id(&AppId::new("a")).await.unwrap().unwrap();
        let mut second = first.clone();

        first.enabled = true;
        first.revision += 1;
        second.version = "2.0.0".into();
        second.revision += 1;

        repo.save(&first).await.unwrap();
        assert!(matches!(repo.save(&second).await, Err(RepositoryError::Conflict(_))));

        let stored = repo.find_by_id(&AppId::new("a")).await.unwrap().unwrap();
        assert!(stored.enabled);
        assert_eq!(stored.version, "1.0.0");
        assert_eq!(stored.revision, 2);
    }

    #[tokio::test]
    async fn test_scope_grants_per_app() {
        let repo = InMemoryExAppScopeRepository::new();
        let a = AppId::new("a");
        repo.grant(&ExAppScope { app_id: a.clone(), scope_group: ScopeGroup::DAV }).await.unwrap();
        repo.grant(&ExAppScope { app_id: a.clone(), scope_group: ScopeGroup::SYSTEM }).await.unwrap();
        repo.grant(&ExAppScope { app_id: AppId::new("b"), scope_group: ScopeGroup::ALL }).await.unwrap();
        assert_eq!(repo.find_by_app(&a).await.unwrap(), vec![ScopeGroup::SYSTEM, ScopeGroup::DAV]);
        repo.revoke(&a, ScopeGroup::DAV).await.unwrap();
        assert_eq!(repo.find_by_app(&a).await.unwrap(), vec![ScopeGroup::SYSTEM]);
        repo.delete_by_app(&a).await.unwrap();
        assert!(repo.find_by_app(&a).await.unwrap().is_empty());
        assert_eq!(repo.find_by_app(&AppId::new("b")).await.unwrap(), vec![ScopeGroup::ALL]);
    }

    #[tokio::test]
    async fn test_users_include_system_sentinel() {
        let repo = InMemoryExAppUserRepository::new();
        let a = AppId::new("a");
        assert!(!repo.exists(&a, "").await.unwrap());
        repo.insert(&a, "").await.unwrap();
        repo.insert(&a, "alice").await.unwrap();
        repo.insert(&a, "alice").await.unwrap();
        assert!(repo.exists(&a, "").await.unwrap());
        assert!(repo.exists(&a, "alice").await.unwrap());
        repo.delete_by_app(&a).await.unwrap();
        assert!(!repo.exists(&a, "alice").await.unwrap());
    }
}
