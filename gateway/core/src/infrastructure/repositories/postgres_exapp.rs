// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL ExApp Repository
//!
//! `ExAppRepository` backed by the `ex_apps` table. The status record is
//! stored as JSONB; `revision` guards against stale writes from another
//! gateway instance sharing the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::exapp::{AppId, AppSecret, ExApp, ExAppStatus};
use crate::domain::repository::{ExAppRepository, RepositoryError};

pub struct PostgresExAppRepository {
    pool: PgPool,
}

impl PostgresExAppRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_app(row: &PgRow) -> Result<ExApp, RepositoryError> {
        let status_json: serde_json::Value = row.get("status");
        let status: ExAppStatus = serde_json::from_value(status_json)?;
        let port: i32 = row.get("port");
        let revision: i64 = row.get("revision");

        Ok(ExApp {
            app_id: AppId::new(row.get::<String, _>("app_id")),
            version: row.get("version"),
            name: row.get("name"),
            secret: AppSecret::new(row.get::<String, _>("secret")),
            port: u16::try_from(port)
                .map_err(|_| RepositoryError::Serialization(format!("port {} out of range", port)))?,
            daemon_config_name: row.get("daemon_config_name"),
            accepts_deploy_id: row.get("accepts_deploy_id"),
            enabled: row.get("enabled"),
            status,
            last_check_time: row.get::<Option<DateTime<Utc>>, _>("last_check_time"),
            created_time: row.get("created_time"),
            revision: revision.max(0) as u64,
        })
    }
}

#[async_trait]
impl ExAppRepository for PostgresExAppRepository {
    async fn save(&self, app: &ExApp) -> Result<(), RepositoryError> {
        let status_json = serde_json::to_value(&app.status)?;

        let result = sqlx::query(
            r#"
            INSERT INTO ex_apps (
                app_id, version, name, secret, port, daemon_config_name,
                accepts_deploy_id, enabled, status, last_check_time,
                created_time, revision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (app_id) DO UPDATE SET
                version = EXCLUDED.version,
                name = EXCLUDED.name,
                secret = EXCLUDED.secret,
                port = EXCLUDED.port,
                daemon_config_name = EXCLUDED.daemon_config_name,
                accepts_deploy_id = EXCLUDED.accepts_deploy_id,
                enabled = EXCLUDED.enabled,
                status = EXCLUDED.status,
                last_check_time = EXCLUDED.last_check_time,
                revision = EXCLUDED.revision
            WHERE ex_apps.revision < EXCLUDED.revision
            "#,
        )
        .bind(app.app_id.as_str())
        .bind(&app.version)
        .bind(&app.name)
        .bind(app.secret.expose())
        .bind(i32::from(app.port))
        .bind(&app.daemon_config_name)
        .bind(&app.accepts_deploy_id)
        .bind(app.enabled)
        .bind(status_json)
        .bind(app.last_check_time)
        .bind(app.created_time)
        .bind(app.revision as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save app: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "{} is already at revision {} or newer",
                app.app_id, app.revision
            )));
        }
        Ok(())
    }

    async fn find_by_id(&self, app_id: &AppId) -> Result<Option<ExApp>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT app_id, version, name, secret, port, daemon_config_name,
                   accepts_deploy_id, enabled, status, last_check_time,
                   created_time, revision
            FROM ex_apps
            WHERE app_id = $1
            "#,
        )
        .bind(app_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to fetch app: {}", e)))?;

        row.as_ref().map(Self::row_to_app).transpose()
    }

    async fn list_all(&self) -> Result<Vec<ExApp>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT app_id, version, name, secret, port, daemon_config_name,
                   accepts_deploy_id, enabled, status, last_check_time,
                   created_time, revision
            FROM ex_apps
            ORDER BY app_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to list apps: {}", e)))?;

        rows.iter().map(Self::row_to_app).collect()
    }

    async fn delete(&self, app_id: &AppId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM ex_apps WHERE app_id = $1")
            .bind(app_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to delete app: {}", e)))?;
        Ok(())
    }
}
