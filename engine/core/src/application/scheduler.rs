// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Scheduler
//!
//! Synchronous admission path for task runs: resolve the worker inside the
//! tenant boundary, validate the payload against the capability contract,
//! evaluate the autonomy policy, then create-or-return the run under the
//! idempotency key. Admission never executes anything; it only enqueues.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::application::enforce_tenant;
use crate::application::policy::PolicyEngine;
use crate::application::validation::CapabilityValidator;
use crate::domain::context::TenantContext;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::events::TaskRunEvent;
use crate::domain::ledger::ExecutionLogEntry;
use crate::domain::policy::PolicyDecision;
use crate::domain::repository::{
    AdmissionOutcome, BusinessRepository, ExecutionLedger, TaskRunRepository, WorkerRepository,
};
use crate::domain::task_run::{
    ApprovalDecision, ApprovalVerdict, TaskRun, TaskRunId, TaskRunStatus,
};
use crate::domain::worker::WorkerId;
use crate::infrastructure::catalog::WorkerTypeCatalog;
use crate::infrastructure::event_bus::EventBus;
use crate::application::executor::ExecutionQueue;

/// A caller's request to run a task kind on a worker.
#[derive(Debug, Clone)]
pub struct TaskSubmission {
    pub worker_id: WorkerId,
    pub task_kind: String,
    pub payload: serde_json::Value,
    /// Caller-supplied, business-scoped idempotency token.
    pub idempotency_key: String,
    /// Opaque risk/cost score driving hybrid routing; the engine does not
    /// compute it.
    pub estimated_impact: f64,
}

pub struct TaskScheduler {
    businesses: Arc<dyn BusinessRepository>,
    workers: Arc<dyn WorkerRepository>,
    runs: Arc<dyn TaskRunRepository>,
    ledger: Arc<dyn ExecutionLedger>,
    catalog: Arc<WorkerTypeCatalog>,
    queue: Arc<ExecutionQueue>,
    bus: EventBus,
}

impl TaskScheduler {
    pub fn new(
        businesses: Arc<dyn BusinessRepository>,
        workers: Arc<dyn WorkerRepository>,
        runs: Arc<dyn TaskRunRepository>,
        ledger: Arc<dyn ExecutionLedger>,
        catalog: Arc<WorkerTypeCatalog>,
        queue: Arc<ExecutionQueue>,
        bus: EventBus,
    ) -> Self {
        Self {
            businesses,
            workers,
            runs,
            ledger,
            catalog,
            queue,
            bus,
        }
    }

    /// Admit a task run.
    ///
    /// Submitting the same `(worker, task kind, idempotency key)` twice
    /// returns the original run unchanged: the second payload is ignored
    /// and no duplicate is created, whatever state the original is in.
    pub async fn submit(
        &self,
        ctx: &TenantContext,
        submission: TaskSubmission,
    ) -> EngineResult<TaskRun> {
        let business = self
            .businesses
            .find_by_id(ctx.business_id)
            .await?
            .ok_or(EngineError::NotFound { entity: "business" })?;
        if !business.active {
            return Err(EngineError::PolicyRejected {
                reason: "business is deactivated".to_string(),
            });
        }

        let worker = self
            .workers
            .find_by_id(submission.worker_id)
            .await?
            .ok_or(EngineError::NotFound { entity: "worker" })?;
        enforce_tenant(&self.bus, ctx, &worker)?;

        // Retirement stops new admissions outright; draining only covers
        // runs that were already in the queue.
        if !worker.admits_submissions() {
            return Err(EngineError::WorkerNotActive);
        }

        let entry = self
            .catalog
            .get(worker.worker_type_id)
            .ok_or(EngineError::NotFound {
                entity: "worker type",
            })?;

        let validated =
            CapabilityValidator::validate(entry, &submission.task_kind, submission.payload)?;

        let decision = PolicyEngine::evaluate(
            &business.policy,
            worker.state,
            &submission.task_kind,
            submission.estimated_impact,
        );

        let mut run = TaskRun::new(
            ctx.business_id,
            worker.id,
            submission.task_kind.clone(),
            submission.idempotency_key.clone(),
            validated.into_inner(),
            submission.estimated_impact,
        );
        match &decision {
            PolicyDecision::Proceed => run.admit()?,
            PolicyDecision::RequireApproval => run.route_to_approval(),
            PolicyDecision::Reject(reason) => run.reject(reason.to_string())?,
        }

        let run = match self.runs.create_if_absent(&run).await? {
            AdmissionOutcome::Existing(existing) => {
                debug!(
                    task_run_id = %existing.id,
                    business_id = %ctx.business_id,
                    idempotency_key = %submission.idempotency_key,
                    "Idempotent resubmission, returning existing run"
                );
                metrics::counter!("workforce_idempotent_replays_total").increment(1);
                return Ok(existing);
            }
            AdmissionOutcome::Created(run) => run,
        };

        metrics::counter!("workforce_task_runs_submitted_total").increment(1);
        info!(
            task_run_id = %run.id,
            business_id = %run.business_id,
            worker_id = %run.worker_id,
            task_kind = %run.task_kind,
            status = %run.status,
            "Task run admitted"
        );

        match decision {
            PolicyDecision::Proceed => {
                self.queue.enqueue(run.business_id, run.id);
                self.bus.publish_run_event(TaskRunEvent::RunAdmitted {
                    task_run_id: run.id,
                    business_id: run.business_id,
                    task_kind: run.task_kind.clone(),
                    admitted_at: Utc::now(),
                });
            }
            PolicyDecision::RequireApproval => {
                self.bus.publish_run_event(TaskRunEvent::RunRoutedToApproval {
                    task_run_id: run.id,
                    business_id: run.business_id,
                    task_kind: run.task_kind.clone(),
                    estimated_impact: run.estimated_impact,
                    routed_at: Utc::now(),
                });
            }
            PolicyDecision::Reject(reason) => {
                self.bus.publish_run_event(TaskRunEvent::RunRejected {
                    task_run_id: run.id,
                    business_id: run.business_id,
                    reason: reason.to_string(),
                    rejected_at: Utc::now(),
                });
            }
        }

        Ok(run)
    }

    /// Decide a run the policy engine routed to manual review.
    pub async fn approve(
        &self,
        ctx: &TenantContext,
        task_run_id: TaskRunId,
        verdict: ApprovalVerdict,
        note: Option<String>,
    ) -> EngineResult<TaskRun> {
        let mut run = self.fetch_owned(ctx, task_run_id).await?;

        if run.status != TaskRunStatus::Pending || !run.requires_approval {
            return Err(EngineError::NotPendingApproval);
        }

        // An approval cannot resurrect work on a worker that has been
        // retired (or failed) since the run was routed to review.
        let worker = self
            .workers
            .find_by_id(run.worker_id)
            .await?
            .ok_or(EngineError::NotFound { entity: "worker" })?;
        if verdict == ApprovalVerdict::Approve && !worker.admits_submissions() {
            return Err(EngineError::WorkerNotActive);
        }

        run.record_approval(ApprovalDecision {
            decided_by: ctx.actor_id.clone(),
            verdict,
            note,
            decided_at: Utc::now(),
        })?;

        match verdict {
            ApprovalVerdict::Approve => {
                self.runs.update(&run).await.map_err(|err| match err {
                    // Lost a race against another decision on the same run.
                    crate::domain::repository::RepositoryError::Conflict(_) => {
                        EngineError::NotPendingApproval
                    }
                    other => EngineError::Repository(other),
                })?;
                self.queue.enqueue(run.business_id, run.id);
                info!(
                    task_run_id = %run.id,
                    business_id = %run.business_id,
                    approved_by = %ctx.actor_id,
                    "Task run approved and enqueued"
                );
                self.bus.publish_run_event(TaskRunEvent::RunApproved {
                    task_run_id: run.id,
                    business_id: run.business_id,
                    approved_by: ctx.actor_id.clone(),
                    approved_at: Utc::now(),
                });
            }
            ApprovalVerdict::Reject => {
                // Terminal; committed through finalize (no usage deltas for
                // a run that never executed).
                let applied = self.runs.finalize(&run, &[]).await?;
                if !applied {
                    return Err(EngineError::NotPendingApproval);
                }
                info!(
                    task_run_id = %run.id,
                    business_id = %run.business_id,
                    rejected_by = %ctx.actor_id,
                    "Task run rejected by approver"
                );
                self.bus.publish_run_event(TaskRunEvent::RunRejected {
                    task_run_id: run.id,
                    business_id: run.business_id,
                    reason: "rejected by approver".to_string(),
                    rejected_at: Utc::now(),
                });
            }
        }

        Ok(run)
    }

    /// Fetch a run owned by the caller's business.
    pub async fn get_run(&self, ctx: &TenantContext, id: TaskRunId) -> EngineResult<TaskRun> {
        self.fetch_owned(ctx, id).await
    }

    /// Ordered attempt history of a run owned by the caller's business.
    pub async fn run_log(
        &self,
        ctx: &TenantContext,
        id: TaskRunId,
    ) -> EngineResult<Vec<ExecutionLogEntry>> {
        let run = self.fetch_owned(ctx, id).await?;
        Ok(self.ledger.list_by_task_run(run.id).await?)
    }

    /// Runs for the caller's business, optionally filtered by status.
    pub async fn list_runs(
        &self,
        ctx: &TenantContext,
        status: Option<TaskRunStatus>,
    ) -> EngineResult<Vec<TaskRun>> {
        Ok(self.runs.list_by_business(ctx.business_id, status).await?)
    }

    /// Runs parked awaiting a human decision.
    pub async fn pending_approvals(&self, ctx: &TenantContext) -> EngineResult<Vec<TaskRun>> {
        let pending = self
            .runs
            .list_by_business(ctx.business_id, Some(TaskRunStatus::Pending))
            .await?;
        Ok(pending.into_iter().filter(|r| r.requires_approval).collect())
    }

    async fn fetch_owned(&self, ctx: &TenantContext, id: TaskRunId) -> EngineResult<TaskRun> {
        let run = self
            .runs
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound { entity: "task_run" })?;
        enforce_tenant(&self.bus, ctx, &run)?;
        Ok(run)
    }
}
