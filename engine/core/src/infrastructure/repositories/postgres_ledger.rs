// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::str::FromStr;

use crate::domain::business::BusinessId;
use crate::domain::ledger::ExecutionLogEntry;
use crate::domain::repository::{ExecutionLedger, RepositoryError, UsageRepository};
use crate::domain::task_run::TaskRunId;
use crate::domain::usage::{UsageMetric, UsagePeriod, UsageRecord};

/// Append-only audit trail, one row per attempt.
pub struct PostgresExecutionLedger {
    pool: PgPool,
}

impl PostgresExecutionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionLedger for PostgresExecutionLedger {
    async fn append(&self, entry: ExecutionLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO execution_log (
                task_run_id, business_id, attempt, action, input, output,
                error, duration_ms, cost_delta, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.task_run_id.0)
        .bind(entry.business_id.0)
        .bind(entry.attempt as i32)
        .bind(&entry.action)
        .bind(&entry.input)
        .bind(&entry.output)
        .bind(&entry.error)
        .bind(entry.duration_ms as i64)
        .bind(entry.cost_delta)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_task_run(
        &self,
        task_run_id: TaskRunId,
    ) -> Result<Vec<ExecutionLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT task_run_id, business_id, attempt, action, input, output,
                   error, duration_ms, cost_delta, recorded_at
            FROM execution_log
            WHERE task_run_id = $1
            ORDER BY attempt
            "#,
        )
        .bind(task_run_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let attempt: i32 = row.get("attempt");
                let duration_ms: i64 = row.get("duration_ms");
                Ok(ExecutionLogEntry {
                    task_run_id: TaskRunId(row.get("task_run_id")),
                    business_id: BusinessId(row.get("business_id")),
                    attempt: attempt as u32,
                    action: row.get("action"),
                    input: row.get("input"),
                    output: row.get("output"),
                    error: row.get("error"),
                    duration_ms: duration_ms as u64,
                    cost_delta: row.get("cost_delta"),
                    recorded_at: row.get("recorded_at"),
                })
            })
            .collect()
    }
}

/// Read side of the usage counters; writes go through
/// [`PostgresTaskRunRepository::finalize`](super::postgres_task_run::PostgresTaskRunRepository).
pub struct PostgresUsageRepository {
    pool: PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn query(
        &self,
        business_id: BusinessId,
        period: UsagePeriod,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT metric, value
            FROM usage_records
            WHERE business_id = $1 AND period = $2
            ORDER BY metric
            "#,
        )
        .bind(business_id.0)
        .bind(period.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let metric: String = row.get("metric");
                let metric = UsageMetric::from_str(&metric)
                    .map_err(RepositoryError::Serialization)?;
                Ok(UsageRecord {
                    business_id,
                    period,
                    metric,
                    value: row.get("value"),
                })
            })
            .collect()
    }
}
