// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! the domain layer.
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! Production-ready implementations backed by PostgreSQL:
//! - **PostgresBusinessRepository** - Tenant roots and autonomy policies
//! - **PostgresWorkerRepository** - Worker instances
//! - **PostgresTaskRunRepository** - Task runs, idempotency index, finalize
//! - **PostgresExecutionLedger** / **PostgresUsageRepository** - Audit + usage
//!
//! ## In-Memory Store
//!
//! **InMemoryEngineStore** implements every repository trait behind one set
//! of locks, used for development and testing. Keeping task runs, the
//! ledger and the usage counters in a single store is what lets `finalize`
//! apply the terminal transition and the usage deltas atomically without a
//! database transaction.

pub mod postgres_business;
pub mod postgres_ledger;
pub mod postgres_task_run;
pub mod postgres_worker;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::domain::business::{Business, BusinessId};
use crate::domain::ledger::ExecutionLogEntry;
use crate::domain::repository::{
    AdmissionOutcome, BusinessRepository, ExecutionLedger, RepositoryError, TaskRunRepository,
    UsageRepository, WorkerRepository,
};
use crate::domain::task_run::{TaskRun, TaskRunId, TaskRunStatus};
use crate::domain::usage::{UsageDelta, UsageMetric, UsagePeriod, UsageRecord};
use crate::domain::worker::{Worker, WorkerId};

/// Scoped uniqueness tuple for idempotent admission.
type IdempotencyScope = (BusinessId, WorkerId, String, String);

type UsageKey = (BusinessId, UsagePeriod, UsageMetric);

#[derive(Default)]
struct RunTable {
    by_id: HashMap<TaskRunId, TaskRun>,
    by_scope: HashMap<IdempotencyScope, TaskRunId>,
}

/// Thread-safe in-memory backing store for the whole engine.
#[derive(Default)]
pub struct InMemoryEngineStore {
    businesses: RwLock<HashMap<BusinessId, Business>>,
    workers: RwLock<HashMap<WorkerId, Worker>>,
    runs: RwLock<RunTable>,
    ledger: RwLock<HashMap<TaskRunId, Vec<ExecutionLogEntry>>>,
    usage: DashMap<UsageKey, f64>,
}

impl InMemoryEngineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn scope_of(run: &TaskRun) -> IdempotencyScope {
    (
        run.business_id,
        run.worker_id,
        run.task_kind.clone(),
        run.idempotency_key.clone(),
    )
}

#[async_trait]
impl BusinessRepository for InMemoryEngineStore {
    async fn save(&self, business: &Business) -> Result<(), RepositoryError> {
        let mut businesses = self.businesses.write().unwrap();
        businesses.insert(business.id, business.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: BusinessId) -> Result<Option<Business>, RepositoryError> {
        let businesses = self.businesses.read().unwrap();
        Ok(businesses.get(&id).cloned())
    }
}

#[async_trait]
impl WorkerRepository for InMemoryEngineStore {
    async fn save(&self, worker: &Worker) -> Result<(), RepositoryError> {
        let mut workers = self.workers.write().unwrap();
        workers.insert(worker.id, worker.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: WorkerId) -> Result<Option<Worker>, RepositoryError> {
        let workers = self.workers.read().unwrap();
        Ok(workers.get(&id).cloned())
    }

    async fn list_by_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Vec<Worker>, RepositoryError> {
        let workers = self.workers.read().unwrap();
        Ok(workers
            .values()
            .filter(|w| w.business_id == business_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TaskRunRepository for InMemoryEngineStore {
    async fn create_if_absent(&self, run: &TaskRun) -> Result<AdmissionOutcome, RepositoryError> {
        let mut runs = self.runs.write().unwrap();
        let scope = scope_of(run);

        if let Some(existing_id) = runs.by_scope.get(&scope) {
            let existing = runs
                .by_id
                .get(existing_id)
                .cloned()
                .ok_or_else(|| RepositoryError::Database("dangling idempotency index".into()))?;
            return Ok(AdmissionOutcome::Existing(existing));
        }

        runs.by_scope.insert(scope, run.id);
        runs.by_id.insert(run.id, run.clone());
        Ok(AdmissionOutcome::Created(run.clone()))
    }

    async fn update(&self, run: &TaskRun) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().unwrap();
        let stored = runs
            .by_id
            .get_mut(&run.id)
            .ok_or_else(|| RepositoryError::Database(format!("task run {} not persisted", run.id)))?;
        if stored.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "task run {} is terminal",
                run.id
            )));
        }
        *stored = run.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: TaskRunId) -> Result<Option<TaskRun>, RepositoryError> {
        let runs = self.runs.read().unwrap();
        Ok(runs.by_id.get(&id).cloned())
    }

    async fn list_by_business(
        &self,
        business_id: BusinessId,
        status: Option<TaskRunStatus>,
    ) -> Result<Vec<TaskRun>, RepositoryError> {
        let runs = self.runs.read().unwrap();
        let mut matching: Vec<TaskRun> = runs
            .by_id
            .values()
            .filter(|r| r.business_id == business_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
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

        // The runs write lock is held across both writes, so a concurrent
        // finalize of the same run either sees the terminal row and backs
        // off, or loses the lock race entirely.
        let mut runs = self.runs.write().unwrap();
        let stored = runs
            .by_id
            .get_mut(&run.id)
            .ok_or_else(|| RepositoryError::Database(format!("task run {} not persisted", run.id)))?;
        if stored.is_terminal() {
            return Ok(false);
        }
        *stored = run.clone();

        let period = UsagePeriod::from_datetime(run.finished_at.unwrap_or_else(Utc::now));
        for delta in deltas {
            *self
                .usage
                .entry((run.business_id, period, delta.metric))
                .or_insert(0.0) += delta.value;
        }
        Ok(true)
    }
}

#[async_trait]
impl ExecutionLedger for InMemoryEngineStore {
    async fn append(&self, entry: ExecutionLogEntry) -> Result<(), RepositoryError> {
        let mut ledger = self.ledger.write().unwrap();
        ledger.entry(entry.task_run_id).or_default().push(entry);
        Ok(())
    }

    async fn list_by_task_run(
        &self,
        task_run_id: TaskRunId,
    ) -> Result<Vec<ExecutionLogEntry>, RepositoryError> {
        let ledger = self.ledger.read().unwrap();
        let mut entries = ledger.get(&task_run_id).cloned().unwrap_or_default();
        entries.sort_by_key(|e| e.attempt);
        Ok(entries)
    }
}

#[async_trait]
impl UsageRepository for InMemoryEngineStore {
    async fn query(
        &self,
        business_id: BusinessId,
        period: UsagePeriod,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let mut records: Vec<UsageRecord> = self
            .usage
            .iter()
            .filter(|item| {
                let (owner, item_period, _) = *item.key();
                owner == business_id && item_period == period
            })
            .map(|item| {
                let (owner, item_period, metric) = *item.key();
                UsageRecord {
                    business_id: owner,
                    period: item_period,
                    metric,
                    value: *item.value(),
                }
            })
            .collect();
        records.sort_by_key(|r| r.metric.as_str());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_run() -> TaskRun {
        TaskRun::new(
            BusinessId::new(),
            WorkerId::new(),
            "send_reminder",
            "key-1",
            json!({"lease_id": "L-1"}),
            0.1,
        )
    }

    #[tokio::test]
    async fn test_create_if_absent_is_idempotent() {
        let store = InMemoryEngineStore::new();
        let run = sample_run();

        let first = store.create_if_absent(&run).await.unwrap();
        assert!(matches!(first, AdmissionOutcome::Created(_)));

        // Same scope, different run id and payload.
        let mut duplicate = TaskRun::new(
            run.business_id,
            run.worker_id,
            run.task_kind.clone(),
            run.idempotency_key.clone(),
            json!({"lease_id": "L-2"}),
            0.9,
        );
        duplicate.route_to_approval();

        match store.create_if_absent(&duplicate).await.unwrap() {
            AdmissionOutcome::Existing(existing) => {
                assert_eq!(existing.id, run.id);
                assert_eq!(existing.input, run.input);
            }
            AdmissionOutcome::Created(_) => panic!("expected existing run"),
        }
    }

    #[tokio::test]
    async fn test_same_key_different_worker_is_distinct() {
        let store = InMemoryEngineStore::new();
        let run = sample_run();
        store.create_if_absent(&run).await.unwrap();

        let other = TaskRun::new(
            run.business_id,
            WorkerId::new(),
            run.task_kind.clone(),
            run.idempotency_key.clone(),
            json!({}),
            0.0,
        );
        assert!(matches!(
            store.create_if_absent(&other).await.unwrap(),
            AdmissionOutcome::Created(_)
        ));
    }

    #[tokio::test]
    async fn test_finalize_applies_deltas_once() {
        let store = InMemoryEngineStore::new();
        let mut run = sample_run();
        store.create_if_absent(&run).await.unwrap();

        run.admit().unwrap();
        run.begin_attempt().unwrap();
        run.complete(json!({"sent": true}), 0.05).unwrap();

        let deltas = [
            UsageDelta::new(UsageMetric::RunsStarted, 1.0),
            UsageDelta::new(UsageMetric::RunsSucceeded, 1.0),
            UsageDelta::new(UsageMetric::Cost, 0.05),
        ];

        assert!(store.finalize(&run, &deltas).await.unwrap());
        // Retried terminal transition is a no-op.
        assert!(!store.finalize(&run, &deltas).await.unwrap());

        let period = UsagePeriod::from_datetime(run.finished_at.unwrap());
        let records = store.query(run.business_id, period).await.unwrap();
        let succeeded = records
            .iter()
            .find(|r| r.metric == UsageMetric::RunsSucceeded)
            .unwrap();
        assert_eq!(succeeded.value, 1.0);
    }

    #[tokio::test]
    async fn test_update_refuses_terminal_run() {
        let store = InMemoryEngineStore::new();
        let mut run = sample_run();
        store.create_if_absent(&run).await.unwrap();

        run.admit().unwrap();
        run.begin_attempt().unwrap();
        run.complete(json!({}), 0.0).unwrap();
        store.finalize(&run, &[]).await.unwrap();

        let err = store.update(&run).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_ledger_ordering() {
        let store = InMemoryEngineStore::new();
        let run = sample_run();

        for attempt in [2u32, 1, 3] {
            store
                .append(ExecutionLogEntry::failed(
                    run.id,
                    run.business_id,
                    attempt,
                    "send_reminder",
                    json!({}),
                    "timeout",
                    10,
                ))
                .await
                .unwrap();
        }

        let entries = store.list_by_task_run(run.id).await.unwrap();
        let attempts: Vec<u32> = entries.iter().map(|e| e.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }
}
