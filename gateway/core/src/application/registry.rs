// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # App Registry
//!
//! Durable store of registered ExApps, their scope grants, known users and
//! daemon descriptors, fronted by the read-through [`Cache`] port.
//!
//! Every change to an [`ExApp`] goes through [`AppRegistry::update`], which
//! holds a per-app async lock for the read-modify-write, bumps the app's
//! `revision` and invalidates the cached copy. Reads never take the lock.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::repository_factory::RepositorySet;
use crate::domain::cache::{get_typed, keys, set_typed, Cache};
use crate::domain::daemon::DaemonConfig;
use crate::domain::exapp::{AppId, AppSecret, ExApp, ExAppRegistration};
use crate::domain::repository::{
    DaemonConfigRepository, ExAppRepository, ExAppScopeRepository, ExAppUserRepository,
    RepositoryError,
};
use crate::domain::scope::{ExAppScope, ScopeGroup};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("app {0} is not registered")]
    NotFound(AppId),

    #[error("daemon config {0} not found")]
    DaemonNotFound(String),

    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct AppRegistry {
    apps: Arc<dyn ExAppRepository>,
    grants: Arc<dyn ExAppScopeRepository>,
    users: Arc<dyn ExAppUserRepository>,
    daemons: Arc<dyn DaemonConfigRepository>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
    locks: DashMap<AppId, Arc<Mutex<()>>>,
    /// Cached user keys per app, so unregistering can drop them all.
    user_keys: DashMap<AppId, HashSet<String>>,
}

impl AppRegistry {
    pub fn new(repositories: &RepositorySet, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self {
            apps: repositories.apps.clone(),
            grants: repositories.grants.clone(),
            users: repositories.users.clone(),
            daemons: repositories.daemons.clone(),
            cache,
            ttl,
            locks: DashMap::new(),
            user_keys: DashMap::new(),
        }
    }

    fn lock_for(&self, app_id: &AppId) -> Arc<Mutex<()>> {
        self.locks.entry(app_id.clone()).or_default().clone()
    }

    pub async fn get(&self, app_id: &AppId) -> Result<Option<ExApp>, RegistryError> {
        let key = keys::exapp(app_id);
        if let Some(app) = get_typed::<ExApp>(self.cache.as_ref(), &key).await {
            return Ok(Some(app));
        }
        let app = self.apps.find_by_id(app_id).await?;
        if let Some(app) = &app {
            set_typed(self.cache.as_ref(), &key, app, self.ttl).await;
        }
        Ok(app)
    }

    pub async fn require(&self, app_id: &AppId) -> Result<ExApp, RegistryError> {
        self.get(app_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(app_id.clone()))
    }

    pub async fn list(&self) -> Result<Vec<ExApp>, RegistryError> {
        Ok(self.apps.list_all().await?)
    }

    /// Create the app, or update the descriptor of an existing one.
    pub async fn register(&self, registration: ExAppRegistration) -> Result<ExApp, RegistryError> {
        if registration.app_id.as_str().is_empty() {
            return Err(RegistryError::InvalidRegistration("app id must not be empty".into()));
        }
        if self.daemon_config(&registration.daemon_config_name).await?.is_none() {
            return Err(RegistryError::DaemonNotFound(registration.daemon_config_name));
        }

        let app_id = registration.app_id.clone();
        let lock = self.lock_for(&app_id);
        let _guard = lock.lock().await;

        let mut app = match self.apps.find_by_id(&app_id).await? {
            Some(mut existing) => {
                debug!(app_id = %app_id, "Updating existing registration");
                existing.apply_registration(registration);
                existing
            }
            None => ExApp::register(registration),
        };
        app.revision += 1;
        self.apps.save(&app).await?;
        self.cache.invalidate(&keys::exapp(&app_id)).await;
        info!(app_id = %app_id, version = %app.version, "ExApp registered");
        Ok(app)
    }

    /// Apply `mutate` to the stored app under its lock and persist the result.
    pub async fn update<R, F>(&self, app_id: &AppId, mutate: F) -> Result<(ExApp, R), RegistryError>
    where
        F: FnOnce(&mut ExApp) -> R + Send,
        R: Send,
    {
        let lock = self.lock_for(app_id);
        let _guard = lock.lock().await;

        let mut app = self
            .apps
            .find_by_id(app_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(app_id.clone()))?;
        let outcome = mutate(&mut app);
        app.revision += 1;
        self.apps.save(&app).await?;
        self.cache.invalidate(&keys::exapp(app_id)).await;
        Ok((app, outcome))
    }

    /// Remove the app with its grants and users. Returns false when it was unknown.
    pub async fn unregister(&self, app_id: &AppId) -> Result<bool, RegistryError> {
        let lock = self.lock_for(app_id);
        let existed = {
            let _guard = lock.lock().await;
            let existed = self.apps.find_by_id(app_id).await?.is_some();
            self.grants.delete_by_app(app_id).await?;
            self.users.delete_by_app(app_id).await?;
            self.apps.delete(app_id).await?;

            self.cache.invalidate(&keys::exapp(app_id)).await;
            self.cache.invalidate(&keys::exapp_scopes(app_id)).await;
            if let Some((_, user_keys)) = self.user_keys.remove(app_id) {
                for key in user_keys {
                    self.cache.invalidate(&key).await;
                }
            }
            existed
        };
        self.locks.remove(app_id);
        if existed {
            info!(app_id = %app_id, "ExApp unregistered");
        }
        Ok(existed)
    }

    /// Replace the shared secret; a fresh one is generated when none is given.
    pub async fn rotate_secret(
        &self,
        app_id: &AppId,
        secret: Option<AppSecret>,
    ) -> Result<ExApp, RegistryError> {
        let secret = secret.filter(|s| !s.is_empty()).unwrap_or_else(AppSecret::generate);
        let (app, _) = self.update(app_id, move |app| app.secret = secret).await?;
        info!(app_id = %app_id, "ExApp secret rotated");
        Ok(app)
    }

    /// Grant a scope group. Any grant beyond BASIC also creates the system user.
    pub async fn grant_scope(&self, app_id: &AppId, group: ScopeGroup) -> Result<(), RegistryError> {
        self.require(app_id).await?;
        self.grants
            .grant(&ExAppScope { app_id: app_id.clone(), scope_group: group })
            .await?;
        self.cache.invalidate(&keys::exapp_scopes(app_id)).await;
        if !group.is_basic() {
            self.ensure_system_user(app_id).await?;
        }
        info!(app_id = %app_id, scope_group = %group, "Scope granted");
        Ok(())
    }

    pub async fn revoke_scope(&self, app_id: &AppId, group: ScopeGroup) -> Result<(), RegistryError> {
        self.grants.revoke(app_id, group).await?;
        self.cache.invalidate(&keys::exapp_scopes(app_id)).await;
        info!(app_id = %app_id, scope_group = %group, "Scope revoked");
        Ok(())
    }

    pub async fn scopes_for(&self, app_id: &AppId) -> Result<Vec<ScopeGroup>, RegistryError> {
        let key = keys::exapp_scopes(app_id);
        if let Some(groups) = get_typed::<Vec<ScopeGroup>>(self.cache.as_ref(), &key).await {
            return Ok(groups);
        }
        let groups = self.grants.find_by_app(app_id).await?;
        set_typed(self.cache.as_ref(), &key, &groups, self.ttl).await;
        Ok(groups)
    }

    /// Only positive answers are cached; a user added later is seen at once.
    pub async fn user_exists(&self, app_id: &AppId, user_id: &str) -> Result<bool, RegistryError> {
        let key = keys::exapp_user(app_id, user_id);
        if get_typed::<bool>(self.cache.as_ref(), &key).await == Some(true) {
            return Ok(true);
        }
        let exists = self.users.exists(app_id, user_id).await?;
        if exists {
            self.remember_user(app_id, key).await;
        }
        Ok(exists)
    }

    pub async fn ensure_user(&self, app_id: &AppId, user_id: &str) -> Result<(), RegistryError> {
        if self.user_exists(app_id, user_id).await? {
            return Ok(());
        }
        self.require(app_id).await?;
        self.users.insert(app_id, user_id).await?;
        debug!(app_id = %app_id, user_id, "ExApp user created");
        self.remember_user(app_id, keys::exapp_user(app_id, user_id)).await;
        Ok(())
    }

    pub async fn ensure_system_user(&self, app_id: &AppId) -> Result<(), RegistryError> {
        self.ensure_user(app_id, "").await
    }

    async fn remember_user(&self, app_id: &AppId, key: String) {
        set_typed(self.cache.as_ref(), &key, &true, self.ttl).await;
        self.user_keys.entry(app_id.clone()).or_default().insert(key);
    }

    pub async fn daemon_config(&self, name: &str) -> Result<Option<DaemonConfig>, RegistryError> {
        let key = keys::daemon(name);
        if let Some(config) = get_typed::<DaemonConfig>(self.cache.as_ref(), &key).await {
            return Ok(Some(config));
        }
        let config = self.daemons.find_by_name(name).await?;
        if let Some(config) = &config {
            set_typed(self.cache.as_ref(), &key, config, self.ttl).await;
        }
        Ok(config)
    }

    pub async fn save_daemon(&self, config: &DaemonConfig) -> Result<(), RegistryError> {
        if config.name.is_empty() {
            return Err(RegistryError::InvalidRegistration("daemon name must not be empty".into()));
        }
        self.daemons.save(config).await?;
        self.cache.invalidate(&keys::daemon(&config.name)).await;
        info!(daemon = %config.name, host = %config.host, "Daemon config saved");
        Ok(())
    }

    pub async fn list_daemons(&self) -> Result<Vec<DaemonConfig>, RegistryError> {
        Ok(self.daemons.list_all().await?)
    }

    /// Stamp `last_check_time` without touching anything else.
    pub async fn touch(&self, app_id: &AppId) -> Result<ExApp, RegistryError> {
        let now = Utc::now();
        let (app, _) = self.update(app_id, |app| app.last_check_time = Some(now)).await?;
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::daemon::{DeployConfig, MANUAL_DEPLOY_ID};
    use crate::infrastructure::cache::InMemoryTtlCache;

    async fn registry() -> (AppRegistry, RepositorySet) {
        let repos = RepositorySet::in_memory();
        let registry = AppRegistry::new(&repos, Arc::new(InMemoryTtlCache::new(64)), Duration::from_secs(3600));
        registry
            .save_daemon(&DaemonConfig {
                name: "manual".into(),
                display_name: "Manual".into(),
                accepts_deploy_id: MANUAL_DEPLOY_ID.into(),
                protocol: "http".into(),
                host: "127.0.0.1".into(),
                deploy_config: DeployConfig::default(),
            })
            .await
            .unwrap();
        (registry, repos)
    }

    fn registration(secret: Option<&str>) -> ExAppRegistration {
        ExAppRegistration {
            app_id: AppId::new("mail-bridge"),
            version: "1.0.0".into(),
            name: "Mail Bridge".into(),
            secret: secret.map(AppSecret::new),
            port: 23000,
            daemon_config_name: "manual".into(),
            accepts_deploy_id: MANUAL_DEPLOY_ID.into(),
        }
    }

    #[tokio::test]
    async fn test_register_requires_daemon() {
        let (registry, _) = registry().await;
        let mut reg = registration(None);
        reg.daemon_config_name = "missing".into();
        assert!(matches!(registry.register(reg).await, Err(RegistryError::DaemonNotFound(_))));
    }

    #[tokio::test]
    async fn test_reregistration_keeps_secret_and_state() {
        let (registry, _) = registry().await;
        let app = registry.register(registration(Some("s3cr3t"))).await.unwrap();
        assert_eq!(app.revision, 1);
        registry.update(&app.app_id, |a| a.enabled = true).await.unwrap();

        let mut again = registration(None);
        again.version = "1.1.0".into();
        let updated = registry.register(again).await.unwrap();
        assert_eq!(updated.secret.expose(), "s3cr3t");
        assert_eq!(updated.version, "1.1.0");
        assert!(updated.enabled);
        assert_eq!(updated.revision, 3);
    }

    #[tokio::test]
    async fn test_update_invalidates_cached_copy() {
        let (registry, _) = registry().await;
        let app = registry.register(registration(Some("x"))).await.unwrap();
        assert!(!registry.require(&app.app_id).await.unwrap().enabled);
        registry.update(&app.app_id, |a| a.enabled = true).await.unwrap();
        assert!(registry.require(&app.app_id).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialised() {
        let (registry, _) = registry().await;
        let registry = Arc::new(registry);
        let app = registry.register(registration(Some("x"))).await.unwrap();
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let registry = registry.clone();
                let id = app.app_id.clone();
                tokio::spawn(async move {
                    registry
                        .update(&id, |a| a.status.heartbeat_failures += 1)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        let stored = registry.require(&app.app_id).await.unwrap();
        assert_eq!(stored.status.heartbeat_failures, 20);
        assert_eq!(stored.revision, 21);
    }

    #[tokio::test]
    async fn test_rotate_secret_changes_secret() {
        let (registry, _) = registry().await;
        let app = registry.register(registration(Some("old"))).await.unwrap();
        let rotated = registry.rotate_secret(&app.app_id, None).await.unwrap();
        assert_ne!(rotated.secret.expose(), "old");
        let explicit = registry
            .rotate_secret(&app.app_id, Some(AppSecret::new("new")))
            .await
            .unwrap();
        assert_eq!(explicit.secret.expose(), "new");
    }

    #[tokio::test]
    async fn test_grant_creates_system_user_and_unregister_cascades() {
        let (registry, repos) = registry().await;
        let app = registry.register(registration(Some("x"))).await.unwrap();
        registry.grant_scope(&app.app_id, ScopeGroup::BASIC).await.unwrap();
        assert!(!registry.user_exists(&app.app_id, "").await.unwrap());

        registry.grant_scope(&app.app_id, ScopeGroup::SYSTEM).await.unwrap();
        assert!(registry.user_exists(&app.app_id, "").await.unwrap());
        registry.ensure_user(&app.app_id, "alice").await.unwrap();
        assert_eq!(
            registry.scopes_for(&app.app_id).await.unwrap(),
            vec![ScopeGroup::BASIC, ScopeGroup::SYSTEM]
        );

        assert!(registry.unregister(&app.app_id).await.unwrap());
        assert!(registry.get(&app.app_id).await.unwrap().is_none());
        assert!(registry.scopes_for(&app.app_id).await.unwrap().is_empty());
        assert!(!registry.user_exists(&app.app_id, "alice").await.unwrap());
        assert!(!repos.users.exists(&app.app_id, "").await.unwrap());
        assert!(!registry.unregister(&app.app_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_for_unknown_app_fails() {
        let (registry, _) = registry().await;
        let err = registry.grant_scope(&AppId::new("ghost"), ScopeGroup::DAV).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
