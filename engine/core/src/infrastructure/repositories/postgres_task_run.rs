// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL task run repository.
//!
//! The `task_runs` table carries a
//! `UNIQUE (business_id, worker_id, task_kind, idempotency_key)` index;
//! `create_if_absent` leans on `ON CONFLICT DO NOTHING` so concurrent
//! submissions with the same key race safely inside the database.
//! `finalize` writes the terminal row and the usage counters in one
//! transaction.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::business::BusinessId;
use crate::domain::repository::{
    AdmissionOutcome, RepositoryError, TaskRunRepository,
};
use crate::domain::task_run::{TaskRun, TaskRunId, TaskRunStatus};
use crate::domain::usage::{UsageDelta, UsagePeriod};
use crate::domain::worker::WorkerId;

pub struct PostgresTaskRunRepository {
    pool: PgPool,
}

impl PostgresTaskRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_from_str(s: &str) -> Result<TaskRunStatus, RepositoryError> {
    match s {
        "pending" => Ok(TaskRunStatus::Pending),
        "approved" => Ok(TaskRunStatus::Approved),
        "rejected" => Ok(TaskRunStatus::Rejected),
        "running" => Ok(TaskRunStatus::Running),
        "succeeded" => Ok(TaskRunStatus::Succeeded),
        "failed" => Ok(TaskRunStatus::Failed),
        other => Err(RepositoryError::Serialization(format!(
            "invalid task run status: {other}"
        ))),
    }
}

fn row_to_run(row: &PgRow) -> Result<TaskRun, RepositoryError> {
    let status: String = row.get("status");
    let approval: Option<serde_json::Value> = row.get("approval");
    let approval = approval.map(serde_json::from_value).transpose()?;
    let attempts: i32 = row.get("attempts");

    Ok(TaskRun {
        id: TaskRunId(row.get("id")),
        business_id: BusinessId(row.get("business_id")),
        worker_id: WorkerId(row.get("worker_id")),
        task_kind: row.get("task_kind"),
        idempotency_key: row.get("idempotency_key"),
        input: row.get("input"),
        status: status_from_str(&status)?,
        requires_approval: row.get("requires_approval"),
        approval,
        estimated_impact: row.get("estimated_impact"),
        attempts: attempts as u32,
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        cost: row.get("cost"),
        result: row.get("result"),
        error: row.get("error"),
        created_at: row.get("created_at"),
    })
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, business_id, worker_id, task_kind, idempotency_key, input,
           status, requires_approval, approval, estimated_impact, attempts,
           started_at, finished_at, cost, result, error, created_at
    FROM task_runs
"#;

#[async_trait]
impl TaskRunRepository for PostgresTaskRunRepository {
    async fn create_if_absent(&self, run: &TaskRun) -> Result<AdmissionOutcome, RepositoryError> {
        let approval_json = run.approval.as_ref().map(serde_json::to_value).transpose()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO task_runs (
                id, business_id, worker_id, task_kind, idempotency_key, input,
                status, requires_approval, approval, estimated_impact, attempts,
                started_at, finished_at, cost, result, error, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17)
            ON CONFLICT (business_id, worker_id, task_kind, idempotency_key)
            DO NOTHING
            "#,
        )
        .bind(run.id.0)
        .bind(run.business_id.0)
        .bind(run.worker_id.0)
        .bind(&run.task_kind)
        .bind(&run.idempotency_key)
        .bind(&run.input)
        .bind(run.status.as_str())
        .bind(run.requires_approval)
        .bind(approval_json)
        .bind(run.estimated_impact)
        .bind(run.attempts as i32)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.cost)
        .bind(&run.result)
        .bind(&run.error)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(AdmissionOutcome::Created(run.clone()));
        }

        // Lost the race (or the key was reused); the stored run wins.
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE business_id = $1 AND worker_id = $2 AND task_kind = $3 AND idempotency_key = $4"
        ))
        .bind(run.business_id.0)
        .bind(run.worker_id.0)
        .bind(&run.task_kind)
        .bind(&run.idempotency_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(AdmissionOutcome::Existing(row_to_run(&row)?))
    }

    async fn update(&self, run: &TaskRun) -> Result<(), RepositoryError> {
        let approval_json = run.approval.as_ref().map(serde_json::to_value).transpose()?;

        let updated = sqlx::query(
            r#"
            UPDATE task_runs SET
                status = $2,
                requires_approval = $3,
                approval = $4,
                attempts = $5,
                started_at = $6,
                finished_at = $7,
                cost = $8,
                result = $9,
                error = $10
            WHERE id = $1
              AND status NOT IN ('rejected', 'succeeded', 'failed')
            "#,
        )
        .bind(run.id.0)
        .bind(run.status.as_str())
        .bind(run.requires_approval)
        .bind(approval_json)
        .bind(run.attempts as i32)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.cost)
        .bind(&run.result)
        .bind(&run.error)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::Conflict(format!(
                "task run {} is terminal or not persisted",
                run.id
            )));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: TaskRunId) -> Result<Option<TaskRun>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_run).transpose()
    }

    async fn list_by_business(
        &self,
        business_id: BusinessId,
        status: Option<TaskRunStatus>,
    ) -> Result<Vec<TaskRun>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE business_id = $1 AND status = $2 ORDER BY created_at"
                ))
                .bind(business_id.0)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE business_id = $1 ORDER BY created_at"
                ))
                .bind(business_id.0)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_run).collect()
    }

    async fn finalize(
        &self,
        run: &TaskRun,
        deltas: &[UsageDelta],
    ) -> Result<bool, RepositoryError> {
        if !run.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "finalize called with non-terminal status {}",
                run.status
            )));
        }

        let approval_json = run.approval.as_ref().map(serde_json::to_value).transpose()?;
        let period = UsagePeriod::from_datetime(run.finished_at.unwrap_or_else(Utc::now));

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE task_runs SET
                status = $2,
                approval = $3,
                attempts = $4,
                started_at = $5,
                finished_at = $6,
                cost = $7,
                result = $8,
                error = $9
            WHERE id = $1
              AND status NOT IN ('rejected', 'succeeded', 'failed')
            "#,
        )
        .bind(run.id.0)
        .bind(run.status.as_str())
        .bind(approval_json)
        .bind(run.attempts as i32)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.cost)
        .bind(&run.result)
        .bind(&run.error)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            // Already terminal; deltas were applied by whoever won.
            tx.rollback().await?;
            return Ok(false);
        }

        for delta in deltas {
            sqlx::query(
                r#"
                INSERT INTO usage_records (business_id, period, metric, value)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (business_id, period, metric)
                DO UPDATE SET value = usage_records.value + EXCLUDED.value
                "#,
            )
            .bind(run.business_id.0)
            .bind(period.to_string())
            .bind(delta.metric.as_str())
            .bind(delta.value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}
