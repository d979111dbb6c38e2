// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL `DaemonConfigRepository`; `deploy_config` is stored as JSONB.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::daemon::{DaemonConfig, DeployConfig};
use crate::domain::repository::{DaemonConfigRepository, RepositoryError};

pub struct PostgresDaemonConfigRepository {
    pool: PgPool,
}

impl PostgresDaemonConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_config(row: &PgRow) -> Result<DaemonConfig, RepositoryError> {
        let deploy_json: serde_json::Value = row.get("deploy_config");
        let deploy_config: DeployConfig = serde_json::from_value(deploy_json)?;
        Ok(DaemonConfig {
            name: row.get("name"),
            display_name: row.get("display_name"),
            accepts_deploy_id: row.get("accepts_deploy_id"),
            protocol: row.get("protocol"),
            host: row.get("host"),
            deploy_config,
        })
    }
}

#[async_trait]
impl DaemonConfigRepository for PostgresDaemonConfigRepository {
    async fn save(&self, config: &DaemonConfig) -> Result<(), RepositoryError> {
        let deploy_json = serde_json::to_value(&config.deploy_config)?;
        sqlx::query(
            r#"
            INSERT INTO daemon_configs (name, display_name, accepts_deploy_id, protocol, host, deploy_config)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                accepts_deploy_id = EXCLUDED.accepts_deploy_id,
                protocol = EXCLUDED.protocol,
                host = EXCLUDED.host,
                deploy_config = EXCLUDED.deploy_config
            "#,
        )
        .bind(&config.name)
        .bind(&config.display_name)
        .bind(&config.accepts_deploy_id)
        .bind(&config.protocol)
        .bind(&config.host)
        .bind(deploy_json)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save daemon config: {}", e)))?;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<DaemonConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT name, display_name, accepts_deploy_id, protocol, host, deploy_config FROM daemon_configs WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to fetch daemon config: {}", e)))?;

        row.as_ref().map(Self::row_to_config).transpose()
    }

    async fn list_all(&self) -> Result<Vec<DaemonConfig>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, display_name, accepts_deploy_id, protocol, host, deploy_config FROM daemon_configs ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to list daemon configs: {}", e)))?;

        rows.iter().map(Self::row_to_config).collect()
    }
}
