// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Execution-path tests: retry budget, backoff re-enqueue, attempt
//! timeouts, ledger completeness and usage/terminal-state atomicity.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use workforce_core::application::TaskSubmission;
use workforce_core::config::EngineConfig;
use workforce_core::domain::business::Business;
use workforce_core::domain::collaborator::{
    CollaboratorError, ExecutionContext, TaskOutcome, WorkerCollaborator,
};
use workforce_core::domain::context::TenantContext;
use workforce_core::domain::policy::{AutonomyMode, AutonomyPolicy};
use workforce_core::domain::repository::BusinessRepository;
use workforce_core::domain::task_run::{TaskRun, TaskRunStatus};
use workforce_core::domain::usage::{UsageMetric, UsagePeriod};
use workforce_core::domain::worker::{Worker, WorkerState};
use workforce_core::domain::worker_type::WorkerTypeId;
use workforce_core::infrastructure::catalog::{builtin_worker_types, WorkerTypeCatalog};
use workforce_core::infrastructure::repositories::InMemoryEngineStore;
use workforce_core::runtime::{EngineRepositories, EngineRuntime};

/// Collaborator whose behavior is scripted per test.
enum Script {
    Succeed,
    /// Fail with a transient error on the first `n` attempts, then succeed.
    TransientThenSucceed(u32),
    AlwaysTransient,
    AlwaysPermanent,
    /// Sleep this long before succeeding.
    Slow(Duration),
}

struct ScriptedCollaborator {
    script: Script,
    calls: AtomicU32,
}

impl ScriptedCollaborator {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl WorkerCollaborator for ScriptedCollaborator {
    async fn check_readiness(&self, _worker: &Worker) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn execute(&self, _ctx: ExecutionContext) -> Result<TaskOutcome, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.script {
            Script::Succeed => Ok(TaskOutcome::new(json!({"sent": true})).with_cost(0.02)),
            Script::TransientThenSucceed(n) => {
                if call <= *n {
                    Err(CollaboratorError::Transient("upstream 503".to_string()))
                } else {
                    Ok(TaskOutcome::new(json!({"sent": true, "attempt": call})))
                }
            }
            Script::AlwaysTransient => {
                Err(CollaboratorError::Transient("connection reset".to_string()))
            }
            Script::AlwaysPermanent => {
                Err(CollaboratorError::Permanent("lease does not exist".to_string()))
            }
            Script::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(TaskOutcome::new(json!({"sent": true})))
            }
        }
    }
}

struct Harness {
    engine: EngineRuntime,
    ctx: TenantContext,
    worker: Worker,
    collaborator: Arc<ScriptedCollaborator>,
}

async fn harness_with(script: Script, config: EngineConfig) -> Harness {
    let collaborator = ScriptedCollaborator::new(script);

    let mut catalog = WorkerTypeCatalog::new();
    for worker_type in builtin_worker_types() {
        catalog.register(worker_type, collaborator.clone()).unwrap();
    }

    let store = Arc::new(InMemoryEngineStore::new());
    let repos = EngineRepositories {
        businesses: store.clone(),
        workers: store.clone(),
        runs: store.clone(),
        ledger: store.clone(),
        usage: store.clone(),
    };
    let engine = EngineRuntime::start(config, Arc::new(catalog), repos);

    let policy = AutonomyPolicy::new(0.5)
        .unwrap()
        .with_rule("send_reminder", AutonomyMode::Autonomous);
    let business = Business::new("Acme Property Group", policy);
    store.save(&business).await.unwrap();
    let ctx = TenantContext::new(business.id, "acme-admin");

    let worker = engine
        .registry
        .provision(&ctx, WorkerTypeId::from_name("rent-collector"), json!({}))
        .await
        .unwrap();

    Harness {
        engine,
        ctx,
        worker,
        collaborator,
    }
}

fn fast_config(max_retries: u32) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.max_retries = max_retries;
    config.base_retry_delay = Duration::from_millis(5);
    config.max_retry_delay = Duration::from_millis(20);
    config
}

fn reminder(worker: &Worker, key: &str) -> TaskSubmission {
    TaskSubmission {
        worker_id: worker.id,
        task_kind: "send_reminder".to_string(),
        payload: json!({"lease_id": "L-1", "amount_due": 900.0}),
        idempotency_key: key.to_string(),
        estimated_impact: 0.1,
    }
}

async fn wait_terminal(h: &Harness, run: &TaskRun) -> TaskRun {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let current = h.engine.scheduler.get_run(&h.ctx, run.id).await.unwrap();
        if current.is_terminal() {
            return current;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "run {} never reached a terminal state ({})",
            run.id,
            current.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_retry_budget_is_exact() {
    let h = harness_with(Script::AlwaysTransient, fast_config(3)).await;

    let run = h.engine.scheduler.submit(&h.ctx, reminder(&h.worker, "k1")).await.unwrap();
    let done = wait_terminal(&h, &run).await;

    assert_eq!(done.status, TaskRunStatus::Failed);
    assert_eq!(done.attempts, 3);
    assert!(done.error.as_ref().unwrap().contains("Retries exhausted"));

    // Exactly one ledger entry per attempt.
    let log = h.engine.scheduler.run_log(&h.ctx, run.id).await.unwrap();
    assert_eq!(log.len(), 3);
    let attempts: Vec<u32> = log.iter().map(|e| e.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(log.iter().all(|e| e.error.is_some()));

    // The collaborator was really called three times.
    assert_eq!(h.collaborator.calls.load(Ordering::SeqCst), 3);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_transient_failures_recover() {
    let h = harness_with(Script::TransientThenSucceed(2), fast_config(3)).await;

    let run = h.engine.scheduler.submit(&h.ctx, reminder(&h.worker, "k1")).await.unwrap();
    let done = wait_terminal(&h, &run).await;

    assert_eq!(done.status, TaskRunStatus::Succeeded);
    assert_eq!(done.attempts, 3);

    // History shows two failures then the success.
    let log = h.engine.scheduler.run_log(&h.ctx, run.id).await.unwrap();
    assert_eq!(log.len(), 3);
    assert!(log[0].error.is_some());
    assert!(log[1].error.is_some());
    assert!(log[2].error.is_none());

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_permanent_failure_stops_immediately() {
    let h = harness_with(Script::AlwaysPermanent, fast_config(5)).await;

    let run = h.engine.scheduler.submit(&h.ctx, reminder(&h.worker, "k1")).await.unwrap();
    let done = wait_terminal(&h, &run).await;

    assert_eq!(done.status, TaskRunStatus::Failed);
    assert_eq!(done.attempts, 1);
    assert!(done.error.as_ref().unwrap().contains("lease does not exist"));
    assert_eq!(h.engine.scheduler.run_log(&h.ctx, run.id).await.unwrap().len(), 1);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_attempt_timeout_is_recoverable() {
    let mut config = fast_config(2);
    config.attempt_timeout = Duration::from_millis(30);
    let h = harness_with(Script::Slow(Duration::from_secs(10)), config).await;

    let run = h.engine.scheduler.submit(&h.ctx, reminder(&h.worker, "k1")).await.unwrap();
    let done = wait_terminal(&h, &run).await;

    assert_eq!(done.status, TaskRunStatus::Failed);
    assert_eq!(done.attempts, 2);

    let log = h.engine.scheduler.run_log(&h.ctx, run.id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(log[0].error.as_ref().unwrap().contains("wall-clock"));

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_usage_reflects_failures() {
    let h = harness_with(Script::AlwaysTransient, fast_config(2)).await;

    let run = h.engine.scheduler.submit(&h.ctx, reminder(&h.worker, "k1")).await.unwrap();
    wait_terminal(&h, &run).await;

    let usage = h
        .engine
        .meter
        .usage(&h.ctx, UsagePeriod::current())
        .await
        .unwrap();
    let value_of = |metric: UsageMetric| {
        usage
            .iter()
            .find(|r| r.metric == metric)
            .map(|r| r.value)
            .unwrap_or(0.0)
    };
    assert_eq!(value_of(UsageMetric::RunsStarted), 1.0);
    assert_eq!(value_of(UsageMetric::RunsFailed), 1.0);
    assert_eq!(value_of(UsageMetric::RunsSucceeded), 0.0);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_usage_cost_recorded_on_success() {
    let h = harness_with(Script::Succeed, fast_config(3)).await;

    let run = h.engine.scheduler.submit(&h.ctx, reminder(&h.worker, "k1")).await.unwrap();
    let done = wait_terminal(&h, &run).await;
    assert_eq!(done.status, TaskRunStatus::Succeeded);
    assert_eq!(done.cost, 0.02);

    let usage = h
        .engine
        .meter
        .usage(&h.ctx, UsagePeriod::current())
        .await
        .unwrap();
    let cost = usage.iter().find(|r| r.metric == UsageMetric::Cost).unwrap();
    assert!((cost.value - 0.02).abs() < f64::EPSILON);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_in_flight_run_drains_after_retirement() {
    let mut config = fast_config(1);
    config.attempt_timeout = Duration::from_secs(5);
    let h = harness_with(Script::Slow(Duration::from_millis(100)), config).await;

    let run = h.engine.scheduler.submit(&h.ctx, reminder(&h.worker, "k1")).await.unwrap();

    // Retire the worker while the attempt is (or is about to be) in flight.
    h.engine
        .registry
        .transition(&h.ctx, h.worker.id, WorkerState::Retired)
        .await
        .unwrap();

    // The already-admitted run still completes its attempt.
    let done = wait_terminal(&h, &run).await;
    assert_eq!(done.status, TaskRunStatus::Succeeded);

    // But no new work is admitted for the retired worker.
    let err = h
        .engine
        .scheduler
        .submit(&h.ctx, reminder(&h.worker, "k2"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        workforce_core::domain::errors::EngineError::WorkerNotActive
    ));

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_attempt() {
    let mut config = fast_config(1);
    config.attempt_timeout = Duration::from_secs(5);
    let h = harness_with(Script::Slow(Duration::from_millis(100)), config).await;

    let run = h.engine.scheduler.submit(&h.ctx, reminder(&h.worker, "k1")).await.unwrap();

    // Give the pool a moment to pick the run up, then shut down.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let scheduler = h.engine.scheduler.clone();
    h.engine.shutdown().await;

    // The in-flight attempt was allowed to finish; nothing is left
    // half-done.
    let done = scheduler.get_run(&h.ctx, run.id).await.unwrap();
    assert_eq!(done.status, TaskRunStatus::Succeeded);
    assert_eq!(done.attempts, 1);
}
