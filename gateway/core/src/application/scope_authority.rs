// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Scope Authority
//!
//! Answers "does route R require scope G, and does app A hold G?".
//!
//! - `ALL` grants bypass the route table (an unmapped route then requires a
//!   known user).
//! - `BASIC` is implicitly held by every app.
//! - An unmapped route is denied to apps without `ALL`.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::registry::{AppRegistry, RegistryError};
use crate::domain::auth::AuthorizationFailure;
use crate::domain::cache::{get_typed, keys, set_typed, Cache};
use crate::domain::exapp::AppId;
use crate::domain::repository::ApiScopeRepository;
use crate::domain::scope::{default_api_scopes, ApiScope, ScopeGroup, ScopeTable};

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error(transparent)]
    Denied(#[from] AuthorizationFailure),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Outcome of a successful scope check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Matched route entry; `None` for unmapped routes reached through `ALL`.
    pub scope: Option<ApiScope>,
    /// The request must carry a user known to the app.
    pub user_check: bool,
}

pub struct ScopeAuthority {
    api_scopes: Arc<dyn ApiScopeRepository>,
    registry: Arc<AppRegistry>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl ScopeAuthority {
    pub fn new(
        api_scopes: Arc<dyn ApiScopeRepository>,
        registry: Arc<AppRegistry>,
        cache: Arc<dyn Cache>,
        ttl: Duration,
    ) -> Self {
        Self { api_scopes, registry, cache, ttl }
    }

    /// Insert every default route that is not stored yet. Existing rows win.
    pub async fn seed_defaults(&self) -> Result<usize, RegistryError> {
        let existing = self.api_scopes.list_all().await?;
        let mut seeded = 0;
        for scope in default_api_scopes() {
            if existing.iter().any(|s| s.api_route == scope.api_route) {
                continue;
            }
            self.api_scopes.upsert(&scope).await?;
            seeded += 1;
        }
        self.cache.invalidate(keys::API_SCOPES).await;
        if seeded > 0 {
            info!(seeded, "Seeded default API scopes");
        }
        Ok(seeded)
    }

    pub async fn register_api_scope(&self, scope: ApiScope) -> Result<(), RegistryError> {
        self.api_scopes.upsert(&scope).await?;
        self.cache.invalidate(keys::API_SCOPES).await;
        info!(route = %scope.api_route, scope_group = %scope.scope_group, "API scope registered");
        Ok(())
    }

    pub async fn table(&self) -> Result<ScopeTable, RegistryError> {
        if let Some(entries) = get_typed::<Vec<ApiScope>>(self.cache.as_ref(), keys::API_SCOPES).await {
            return Ok(ScopeTable::new(entries));
        }
        let entries = self.api_scopes.list_all().await?;
        set_typed(self.cache.as_ref(), keys::API_SCOPES, &entries, self.ttl).await;
        Ok(ScopeTable::new(entries))
    }

    pub async fn authorize(&self, app_id: &AppId, path: &str) -> Result<AccessDecision, ScopeError> {
        let table = self.table().await?;
        let matched = table.resolve(path).cloned();
        let granted = self.registry.scopes_for(app_id).await?;

        if granted.contains(&ScopeGroup::ALL) {
            let user_check = matched.as_ref().map_or(true, |s| s.user_check);
            debug!(app_id = %app_id, path, "ALL scope bypasses route check");
            return Ok(AccessDecision { scope: matched, user_check });
        }

        let scope = matched.ok_or_else(|| AuthorizationFailure::UnmappedRoute { path: path.to_string() })?;
        if scope.scope_group.is_basic() || granted.contains(&scope.scope_group) {
            let user_check = scope.user_check;
            return Ok(AccessDecision { scope: Some(scope), user_check });
        }
        Err(AuthorizationFailure::ScopeNotGranted {
            app_id: app_id.clone(),
            scope_group: scope.scope_group,
        }
        .into())
    }

    /// Display names of the groups granted to an app, BASIC included.
    pub async fn scope_names(&self, app_id: &AppId) -> Result<Vec<String>, RegistryError> {
        let mut groups = self.registry.scopes_for(app_id).await?;
        if !groups.contains(&ScopeGroup::BASIC) {
            groups.push(ScopeGroup::BASIC);
        }
        let mut names = self.table().await?.names_for(&groups);
        if groups.contains(&ScopeGroup::ALL) {
            names.push("ALL".to_string());
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repository_factory::RepositorySet;
    use crate::domain::daemon::{DaemonConfig, DeployConfig, MANUAL_DEPLOY_ID};
    use crate::domain::exapp::{AppSecret, ExAppRegistration};
    use crate::infrastructure::cache::InMemoryTtlCache;

    async fn authority() -> (ScopeAuthority, Arc<AppRegistry>, AppId) {
        let repos = RepositorySet::in_memory();
        let cache: Arc<dyn Cache> = Arc::new(InMemoryTtlCache::new(64));
        let ttl = Duration::from_secs(3600);
        let registry = Arc::new(AppRegistry::new(&repos, cache.clone(), ttl));
        registry
            .save_daemon(&DaemonConfig {
                name: "manual".into(),
                display_name: String::new(),
                accepts_deploy_id: MANUAL_DEPLOY_ID.into(),
                protocol: "http".into(),
                host: "localhost".into(),
                deploy_config: DeployConfig::default(),
            })
            .await
            .unwrap();
        let app = registry
            .register(ExAppRegistration {
                app_id: AppId::new("mail-bridge"),
                version: "1.0.0".into(),
                name: "Mail Bridge".into(),
                secret: Some(AppSecret::new("s3cr3t")),
                port: 1,
                daemon_config_name: "manual".into(),
                accepts_deploy_id: MANUAL_DEPLOY_ID.into(),
            })
            .await
            .unwrap();
        let authority = ScopeAuthority::new(repos.api_scopes.clone(), registry.clone(), cache, ttl);
        authority.seed_defaults().await.unwrap();
        (authority, registry, app.app_id)
    }

    #[tokio::test]
    async fn test_basic_is_implicit() {
        let (authority, _, app) = authority().await;
        let decision = authority.authorize(&app, "/cloud/capabilities").await.unwrap();
        assert_eq!(decision.scope.unwrap().scope_group, ScopeGroup::BASIC);
        assert!(!decision.user_check);
    }

    #[tokio::test]
    async fn test_missing_grant_then_granted() {
        let (authority, registry, app) = authority().await;
        let err = authority.authorize(&app, "/ocs/v2.php/cloud/apps").await.unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Denied(AuthorizationFailure::ScopeNotGranted { scope_group: ScopeGroup::SYSTEM, .. })
        ));
        registry.grant_scope(&app, ScopeGroup::SYSTEM).await.unwrap();
        let decision = authority.authorize(&app, "/ocs/v2.php/cloud/apps").await.unwrap();
        assert!(decision.user_check);
    }

    #[tokio::test]
    async fn test_unmapped_route() {
        let (authority, registry, app) = authority().await;
        let err = authority.authorize(&app, "/apps/unknown/thing").await.unwrap_err();
        assert!(matches!(err, ScopeError::Denied(AuthorizationFailure::UnmappedRoute { .. })));

        registry.grant_scope(&app, ScopeGroup::ALL).await.unwrap();
        let decision = authority.authorize(&app, "/apps/unknown/thing").await.unwrap();
        assert!(decision.scope.is_none());
        assert!(decision.user_check);
    }

    #[tokio::test]
    async fn test_seed_is_idempotent_and_keeps_overrides() {
        let (authority, _, _) = authority().await;
        authority
            .register_api_scope(ApiScope::new("/dav/", ScopeGroup::SYSTEM, "SYSTEM", false))
            .await
            .unwrap();
        assert_eq!(authority.seed_defaults().await.unwrap(), 0);
        let table = authority.table().await.unwrap();
        assert_eq!(table.resolve("/dav/files").unwrap().scope_group, ScopeGroup::SYSTEM);
    }

    #[tokio::test]
    async fn test_scope_names() {
        let (authority, registry, app) = authority().await;
        registry.grant_scope(&app, ScopeGroup::DAV).await.unwrap();
        assert_eq!(authority.scope_names(&app).await.unwrap(), vec!["BASIC", "DAV"]);
    }
}
