// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::business::BusinessId;
use crate::domain::repository::{RepositoryError, WorkerRepository};
use crate::domain::worker::{Worker, WorkerId, WorkerState};
use crate::domain::worker_type::WorkerTypeId;

pub struct PostgresWorkerRepository {
    pool: PgPool,
}

impl PostgresWorkerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn state_from_str(s: &str) -> Result<WorkerState, RepositoryError> {
    match s {
        "provisioned" => Ok(WorkerState::Provisioned),
        "active" => Ok(WorkerState::Active),
        "paused" => Ok(WorkerState::Paused),
        "retired" => Ok(WorkerState::Retired),
        "failed" => Ok(WorkerState::Failed),
        other => Err(RepositoryError::Serialization(format!(
            "invalid worker state: {other}"
        ))),
    }
}

fn row_to_worker(row: &PgRow) -> Result<Worker, RepositoryError> {
    let state: String = row.get("state");
    Ok(Worker {
        id: WorkerId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        worker_type_id: WorkerTypeId(row.get("worker_type_id")),
        version: row.get("version"),
        config: row.get("config"),
        state: state_from_str(&state)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl WorkerRepository for PostgresWorkerRepository {
    async fn save(&self, worker: &Worker) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO workers (
                id, business_id, worker_type_id, version, config, state,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                config = EXCLUDED.config,
                state = EXCLUDED.state,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(worker.id.0)
        .bind(worker.business_id.0)
        .bind(worker.worker_type_id.0)
        .bind(&worker.version)
        .bind(&worker.config)
        .bind(worker.state.as_str())
        .bind(worker.created_at)
        .bind(worker.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: WorkerId) -> Result<Option<Worker>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, business_id, worker_type_id, version, config, state,
                   created_at, updated_at
            FROM workers
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_worker).transpose()
    }

    async fn list_by_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Vec<Worker>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, business_id, worker_type_id, version, config, state,
                   created_at, updated_at
            FROM workers
            WHERE business_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(business_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_worker).collect()
    }
}
