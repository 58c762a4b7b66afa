// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Executor
//!
//! A pool of execution workers pulls admitted task runs from a
//! per-business fair queue and drives them through their attempts.
//!
//! - Fairness: businesses take turns round-robin, so one tenant's backlog
//!   never starves another's.
//! - Retries: a recoverable attempt failure re-enqueues the run after an
//!   exponential backoff, via a spawned delay task; pool workers are never
//!   parked on a sleep.
//! - Timeouts: every attempt runs under the configured wall-clock ceiling;
//!   exceeding it counts as a recoverable failure.
//! - Draining: shutdown cancels the pull loops; an attempt already in
//!   flight finishes and records its outcome before the worker exits.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::usage::UsageMeter;
use crate::config::EngineConfig;
use crate::domain::business::BusinessId;
use crate::domain::collaborator::{CollaboratorError, ExecutionContext, TaskOutcome};
use crate::domain::errors::EngineError;
use crate::domain::events::TaskRunEvent;
use crate::domain::ledger::ExecutionLogEntry;
use crate::domain::repository::{ExecutionLedger, TaskRunRepository, WorkerRepository};
use crate::domain::task_run::{TaskRun, TaskRunId, TaskRunStatus};
use crate::infrastructure::catalog::WorkerTypeCatalog;
use crate::infrastructure::event_bus::EventBus;

// ============================================================================
// Retry policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed per run, first attempt included.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_retry_delay,
            max_delay: config.max_retry_delay,
        }
    }

    /// Backoff before the attempt following `failed_attempt` (1-based):
    /// `base × 2^(attempt−1)`, capped at `max_delay`.
    pub fn delay_after_attempt(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(20);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

// ============================================================================
// Per-business fair queue
// ============================================================================

#[derive(Default)]
struct QueueState {
    queues: HashMap<BusinessId, VecDeque<TaskRunId>>,
    /// Businesses with a non-empty queue, in round-robin order.
    ring: VecDeque<BusinessId>,
}

/// Ready-to-execute runs, drained round-robin across businesses.
#[derive(Default)]
pub struct ExecutionQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl ExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, business_id: BusinessId, run_id: TaskRunId) {
        {
            let mut state = self.state.lock().unwrap();
            if !state.queues.contains_key(&business_id) {
                state.ring.push_back(business_id);
            }
            state.queues.entry(business_id).or_default().push_back(run_id);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<TaskRunId> {
        let mut state = self.state.lock().unwrap();
        while let Some(business_id) = state.ring.pop_front() {
            let Some(queue) = state.queues.get_mut(&business_id) else {
                continue;
            };
            let run_id = queue.pop_front();
            if queue.is_empty() {
                state.queues.remove(&business_id);
            } else {
                state.ring.push_back(business_id);
            }
            if run_id.is_some() {
                return run_id;
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.values().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next ready run; `None` once `cancel` fires.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<TaskRunId> {
        loop {
            if let Some(run_id) = self.pop() {
                // Hand the wakeup on so a sibling worker can grab the next
                // item instead of sleeping through it.
                if !self.is_empty() {
                    self.notify.notify_one();
                }
                return Some(run_id);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }
}

// ============================================================================
// Executor pool
// ============================================================================

struct ExecutorInner {
    workers: Arc<dyn WorkerRepository>,
    runs: Arc<dyn TaskRunRepository>,
    ledger: Arc<dyn ExecutionLedger>,
    catalog: Arc<WorkerTypeCatalog>,
    queue: Arc<ExecutionQueue>,
    bus: EventBus,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    cancel: CancellationToken,
}

/// Drives admitted runs through execution on a pool of tokio tasks.
pub struct TaskExecutor {
    inner: Arc<ExecutorInner>,
    pool_size: usize,
}

impl TaskExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &EngineConfig,
        workers: Arc<dyn WorkerRepository>,
        runs: Arc<dyn TaskRunRepository>,
        ledger: Arc<dyn ExecutionLedger>,
        catalog: Arc<WorkerTypeCatalog>,
        queue: Arc<ExecutionQueue>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                workers,
                runs,
                ledger,
                catalog,
                queue,
                bus,
                retry: RetryPolicy::from_config(config),
                attempt_timeout: config.attempt_timeout,
                cancel: CancellationToken::new(),
            }),
            pool_size: config.pool_size,
        }
    }

    /// Spawn the pull loops. Each returned handle resolves once the pool is
    /// cancelled and that worker's in-flight attempt has drained.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        (0..self.pool_size)
            .map(|slot| {
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    debug!(slot, "execution worker started");
                    while let Some(run_id) = inner.queue.recv(&inner.cancel).await {
                        inner.execute_ready(run_id).await;
                    }
                    debug!(slot, "execution worker drained");
                })
            })
            .collect()
    }

    /// Stop pulling new runs. In-flight attempts finish on their own.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl ExecutorInner {
    /// One attempt of one run, end to end.
    async fn execute_ready(&self, run_id: TaskRunId) {
        let run = match self.runs.find_by_id(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                warn!(task_run_id = %run_id, "queued run no longer exists");
                return;
            }
            Err(err) => {
                error!(task_run_id = %run_id, error = %err, "failed to load queued run");
                return;
            }
        };

        if run.status != TaskRunStatus::Approved {
            debug!(task_run_id = %run_id, status = %run.status, "skipping run not ready");
            return;
        }

        let worker = match self.workers.find_by_id(run.worker_id).await {
            Ok(Some(worker)) => worker,
            Ok(None) => {
                self.fail_without_collaborator(run, "owning worker no longer exists")
                    .await;
                return;
            }
            Err(err) => {
                error!(task_run_id = %run_id, error = %err, "failed to load worker");
                return;
            }
        };

        let Some(entry) = self.catalog.get(worker.worker_type_id) else {
            self.fail_without_collaborator(run, "worker type missing from catalog")
                .await;
            return;
        };

        let mut run = run;
        let attempt = match run.begin_attempt() {
            Ok(attempt) => attempt,
            Err(err) => {
                warn!(task_run_id = %run_id, error = %err, "cannot start attempt");
                return;
            }
        };
        if let Err(err) = self.runs.update(&run).await {
            warn!(task_run_id = %run_id, error = %err, "lost attempt-start race");
            return;
        }

        self.bus.publish_run_event(TaskRunEvent::AttemptStarted {
            task_run_id: run.id,
            business_id: run.business_id,
            attempt,
            started_at: Utc::now(),
        });
        metrics::counter!("workforce_task_attempts_total").increment(1);

        let ctx = ExecutionContext {
            task_run_id: run.id,
            business_id: run.business_id,
            worker_id: run.worker_id,
            task_kind: run.task_kind.clone(),
            attempt,
            payload: run.input.clone(),
            worker_config: worker.config.clone(),
        };

        let started = std::time::Instant::now();
        let outcome = match timeout(self.attempt_timeout, entry.collaborator.execute(ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CollaboratorError::Transient(format!(
                "attempt exceeded the {}s wall-clock ceiling",
                self.attempt_timeout.as_secs()
            ))),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("workforce_attempt_duration_ms").record(duration_ms as f64);

        match outcome {
            Ok(outcome) => self.handle_success(run, outcome, duration_ms).await,
            Err(err) if err.is_transient() => self.handle_transient(run, err, duration_ms).await,
            Err(err) => self.handle_permanent(run, err, duration_ms).await,
        }
    }

    async fn handle_success(&self, mut run: TaskRun, outcome: TaskOutcome, duration_ms: u64) {
        self.append_entry(ExecutionLogEntry::succeeded(
            run.id,
            run.business_id,
            run.attempts,
            run.task_kind.clone(),
            run.input.clone(),
            outcome.output.clone(),
            duration_ms,
            outcome.cost,
        ))
        .await;

        if let Err(err) = run.complete(outcome.output, outcome.cost) {
            warn!(task_run_id = %run.id, error = %err, "cannot complete run");
            return;
        }
        self.finalize(&run, outcome.api_calls).await;

        info!(
            task_run_id = %run.id,
            business_id = %run.business_id,
            attempts = run.attempts,
            duration_ms,
            "Task run succeeded"
        );
        metrics::counter!("workforce_task_runs_succeeded_total").increment(1);
        self.bus.publish_run_event(TaskRunEvent::RunSucceeded {
            task_run_id: run.id,
            business_id: run.business_id,
            attempts: run.attempts,
            cost: run.cost,
            finished_at: Utc::now(),
        });
    }

    async fn handle_transient(&self, mut run: TaskRun, err: CollaboratorError, duration_ms: u64) {
        self.append_entry(ExecutionLogEntry::failed(
            run.id,
            run.business_id,
            run.attempts,
            run.task_kind.clone(),
            run.input.clone(),
            err.to_string(),
            duration_ms,
        ))
        .await;

        if run.attempts < self.retry.max_retries {
            let failed_attempt = run.attempts;
            if let Err(err) = run.schedule_retry(err.to_string()) {
                warn!(task_run_id = %run.id, error = %err, "cannot schedule retry");
                return;
            }
            if let Err(err) = self.runs.update(&run).await {
                warn!(task_run_id = %run.id, error = %err, "failed to persist retry");
                return;
            }

            let delay = self.retry.delay_after_attempt(failed_attempt);
            info!(
                task_run_id = %run.id,
                attempt = failed_attempt,
                delay_ms = delay.as_millis() as u64,
                "Recoverable failure, retry scheduled"
            );
            metrics::counter!("workforce_retries_scheduled_total").increment(1);

            let queue = self.queue.clone();
            let business_id = run.business_id;
            let run_id = run.id;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.enqueue(business_id, run_id);
            });
        } else {
            let exhausted = EngineError::RetriesExhausted {
                attempts: run.attempts,
                last_error: err.to_string(),
            };
            self.fail_run(run, exhausted.to_string()).await;
        }
    }

    async fn handle_permanent(&self, mut run: TaskRun, err: CollaboratorError, duration_ms: u64) {
        self.append_entry(ExecutionLogEntry::failed(
            run.id,
            run.business_id,
            run.attempts,
            run.task_kind.clone(),
            run.input.clone(),
            err.to_string(),
            duration_ms,
        ))
        .await;

        self.fail_run(run, err.to_string()).await;
    }

    /// The run cannot reach its collaborator at all (worker or type gone).
    /// Still burns an attempt and a ledger entry so the failure is auditable.
    async fn fail_without_collaborator(&self, mut run: TaskRun, reason: &str) {
        if run.begin_attempt().is_err() {
            return;
        }
        if let Err(err) = self.runs.update(&run).await {
            warn!(task_run_id = %run.id, error = %err, "failed to persist attempt");
            return;
        }
        self.append_entry(ExecutionLogEntry::failed(
            run.id,
            run.business_id,
            run.attempts,
            run.task_kind.clone(),
            run.input.clone(),
            reason,
            0,
        ))
        .await;
        self.fail_run(run, reason.to_string()).await;
    }

    async fn fail_run(&self, mut run: TaskRun, reason: String) {
        if let Err(err) = run.fail(reason.clone()) {
            warn!(task_run_id = %run.id, error = %err, "cannot fail run");
            return;
        }
        self.finalize(&run, 0).await;

        warn!(
            task_run_id = %run.id,
            business_id = %run.business_id,
            attempts = run.attempts,
            reason = %reason,
            "Task run failed"
        );
        metrics::counter!("workforce_task_runs_failed_total").increment(1);
        self.bus.publish_run_event(TaskRunEvent::RunFailed {
            task_run_id: run.id,
            business_id: run.business_id,
            attempts: run.attempts,
            reason,
            finished_at: Utc::now(),
        });
    }

    async fn finalize(&self, run: &TaskRun, api_calls: u64) {
        let deltas = UsageMeter::deltas_for(run, api_calls);
        match self.runs.finalize(run, &deltas).await {
            Ok(true) => {}
            Ok(false) => debug!(task_run_id = %run.id, "terminal transition already applied"),
            Err(err) => error!(task_run_id = %run.id, error = %err, "failed to finalize run"),
        }
    }

    async fn append_entry(&self, entry: ExecutionLogEntry) {
        if let Err(err) = self.ledger.append(entry).await {
            error!(error = %err, "failed to append execution log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(retry.delay_after_attempt(1), Duration::from_secs(2));
        assert_eq!(retry.delay_after_attempt(2), Duration::from_secs(4));
        assert_eq!(retry.delay_after_attempt(3), Duration::from_secs(8));
        assert_eq!(retry.delay_after_attempt(4), Duration::from_secs(10));
        assert_eq!(retry.delay_after_attempt(30), Duration::from_secs(10));
    }

    #[test]
    fn test_queue_round_robin_across_businesses() {
        let queue = ExecutionQueue::new();
        let biz_a = BusinessId::new();
        let biz_b = BusinessId::new();

        let a1 = TaskRunId::new();
        let a2 = TaskRunId::new();
        let a3 = TaskRunId::new();
        let b1 = TaskRunId::new();

        queue.enqueue(biz_a, a1);
        queue.enqueue(biz_a, a2);
        queue.enqueue(biz_a, a3);
        queue.enqueue(biz_b, b1);

        // Business B gets a turn before A's backlog is drained.
        assert_eq!(queue.pop(), Some(a1));
        assert_eq!(queue.pop(), Some(b1));
        assert_eq!(queue.pop(), Some(a2));
        assert_eq!(queue.pop(), Some(a3));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_cancel() {
        let queue = ExecutionQueue::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(queue.recv(&cancel).await.is_none());
    }
}
