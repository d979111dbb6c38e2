// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Scope and User Repositories
//!
//! Route table (`api_scopes`), per-app grants (`ex_app_scopes`) and the
//! users an app may act for (`ex_app_users`).

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::exapp::AppId;
use crate::domain::repository::{
    ApiScopeRepository, ExAppScopeRepository, ExAppUserRepository, RepositoryError,
};
use crate::domain::scope::{ApiScope, ExAppScope, ScopeGroup};

fn group_to_db(group: ScopeGroup) -> i32 {
    group.0 as i32
}

fn group_from_db(value: i32) -> Result<ScopeGroup, RepositoryError> {
    u32::try_from(value)
        .map(ScopeGroup)
        .map_err(|_| RepositoryError::Serialization(format!("invalid scope group {}", value)))
}

pub struct PostgresApiScopeRepository {
    pool: PgPool,
}

impl PostgresApiScopeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiScopeRepository for PostgresApiScopeRepository {
    async fn upsert(&self, scope: &ApiScope) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO api_scopes (api_route, scope_group, name, user_check)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (api_route) DO UPDATE SET
                scope_group = EXCLUDED.scope_group,
                name = EXCLUDED.name,
                user_check = EXCLUDED.user_check
            "#,
        )
        .bind(&scope.api_route)
        .bind(group_to_db(scope.scope_group))
        .bind(&scope.name)
        .bind(scope.user_check)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to upsert api scope: {}", e)))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ApiScope>, RepositoryError> {
        let rows = sqlx::query("SELECT api_route, scope_group, name, user_check FROM api_scopes")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to list api scopes: {}", e)))?;

        rows.iter()
            .map(|row| {
                Ok(ApiScope {
                    api_route: row.get("api_route"),
                    scope_group: group_from_db(row.get("scope_group"))?,
                    name: row.get("name"),
                    user_check: row.get("user_check"),
                })
            })
            .collect()
    }
}

pub struct PostgresExAppScopeRepository {
    pool: PgPool,
}

impl PostgresExAppScopeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExAppScopeRepository for PostgresExAppScopeRepository {
    async fn grant(&self, grant: &ExAppScope) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO ex_app_scopes (app_id, scope_group)
            VALUES ($1, $2)
            ON CONFLICT (app_id, scope_group) DO NOTHING
            "#,
        )
        .bind(grant.app_id.as_str())
        .bind(group_to_db(grant.scope_group))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to grant scope: {}", e)))?;
        Ok(())
    }

    async fn revoke(&self, app_id: &AppId, group: ScopeGroup) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM ex_app_scopes WHERE app_id = $1 AND scope_group = $2")
            .bind(app_id.as_str())
            .bind(group_to_db(group))
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to revoke scope: {}", e)))?;
        Ok(())
    }

    async fn find_by_app(&self, app_id: &AppId) -> Result<Vec<ScopeGroup>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT scope_group FROM ex_app_scopes WHERE app_id = $1 ORDER BY scope_group",
        )
        .bind(app_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to fetch scopes: {}", e)))?;

        rows.iter().map(|row| group_from_db(row.get("scope_group"))).collect()
    }

    async fn delete_by_app(&self, app_id: &AppId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM ex_app_scopes WHERE app_id = $1")
            .bind(app_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to delete scopes: {}", e)))?;
        Ok(())
    }
}

pub struct PostgresExAppUserRepository {
    pool: PgPool,
}

impl PostgresExAppUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExAppUserRepository for PostgresExAppUserRepository {
    async fn exists(&self, app_id: &AppId, user_id: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM ex_app_users WHERE app_id = $1 AND user_id = $2) AS present",
        )
        .bind(app_id.as_str())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to check user: {}", e)))?;
        Ok(row.get("present"))
    }

    async fn insert(&self, app_id: &AppId, user_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO ex_app_users (app_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (app_id, user_id) DO NOTHING
            "#,
        )
        .bind(app_id.as_str())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert user: {}", e)))?;
        Ok(())
    }

    async fn delete_by_app(&self, app_id: &AppId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM ex_app_users WHERE app_id = $1")
            .bind(app_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to delete users: {}", e)))?;
        Ok(())
    }
}
