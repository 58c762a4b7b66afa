// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root, following the DDD
//! Repository pattern: one repository per aggregate, interface defined in
//! the domain layer, implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `BusinessRepository` | `Business` | `InMemoryEngineStore`, `PostgresBusinessRepository` |
//! | `WorkerRepository` | `Worker` | `InMemoryEngineStore`, `PostgresWorkerRepository` |
//! | `TaskRunRepository` | `TaskRun` | `InMemoryEngineStore`, `PostgresTaskRunRepository` |
//! | `ExecutionLedger` | `ExecutionLogEntry` | `InMemoryEngineStore`, `PostgresExecutionLedger` |
//! | `UsageRepository` | `UsageRecord` | `InMemoryEngineStore`, `PostgresUsageRepository` |
//!
//! Two contracts here are correctness-critical and deliberately coarse:
//! `create_if_absent` (idempotent admission must be a single compare-and-create)
//! and `finalize` (the terminal status write and the usage deltas commit or
//! roll back together).

use async_trait::async_trait;

use crate::domain::business::{Business, BusinessId};
use crate::domain::ledger::ExecutionLogEntry;
use crate::domain::task_run::{TaskRun, TaskRunId, TaskRunStatus};
use crate::domain::usage::{UsageDelta, UsagePeriod, UsageRecord};
use crate::domain::worker::{Worker, WorkerId};

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait BusinessRepository: Send + Sync {
    async fn save(&self, business: &Business) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: BusinessId) -> Result<Option<Business>, RepositoryError>;
}

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// Save worker (create or update).
    async fn save(&self, worker: &Worker) -> Result<(), RepositoryError>;

    /// Find worker by ID, regardless of owner. Callers go through the
    /// tenant gate before acting on the result.
    async fn find_by_id(&self, id: WorkerId) -> Result<Option<Worker>, RepositoryError>;

    /// List all workers owned by a business.
    async fn list_by_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Vec<Worker>, RepositoryError>;
}

/// Result of the idempotent compare-and-create at admission.
#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    /// No run existed for the scoped idempotency key; this one was created.
    Created(TaskRun),
    /// A run already existed; it is returned unchanged.
    Existing(TaskRun),
}

#[async_trait]
pub trait TaskRunRepository: Send + Sync {
    /// Atomically create `run` unless a run for
    /// `(business, worker, task_kind, idempotency_key)` already exists, in
    /// which case the stored run is returned untouched.
    async fn create_if_absent(&self, run: &TaskRun) -> Result<AdmissionOutcome, RepositoryError>;

    /// Persist a non-terminal state change. Fails with `Conflict` if the
    /// stored run is already terminal.
    async fn update(&self, run: &TaskRun) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: TaskRunId) -> Result<Option<TaskRun>, RepositoryError>;

    async fn list_by_business(
        &self,
        business_id: BusinessId,
        status: Option<TaskRunStatus>,
    ) -> Result<Vec<TaskRun>, RepositoryError>;

    /// Commit a terminal transition together with its usage deltas.
    ///
    /// Returns `true` if the transition was applied, `false` if the stored
    /// run was already terminal, in which case no delta is applied either:
    /// a retried finalize is a no-op, never a double count.
    async fn finalize(
        &self,
        run: &TaskRun,
        deltas: &[UsageDelta],
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ExecutionLedger: Send + Sync {
    /// Append one attempt record. Entries are never updated.
    async fn append(&self, entry: ExecutionLogEntry) -> Result<(), RepositoryError>;

    /// All entries for a run, ordered by attempt number.
    async fn list_by_task_run(
        &self,
        task_run_id: TaskRunId,
    ) -> Result<Vec<ExecutionLogEntry>, RepositoryError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Counters for one business and period.
    async fn query(
        &self,
        business_id: BusinessId,
        period: UsagePeriod,
    ) -> Result<Vec<UsageRecord>, RepositoryError>;
}
