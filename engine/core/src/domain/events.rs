// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::business::BusinessId;
use crate::domain::task_run::TaskRunId;
use crate::domain::worker::{WorkerId, WorkerState};
use crate::domain::worker_type::WorkerTypeId;

/// Worker provisioning and lifecycle audit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerLifecycleEvent {
    WorkerProvisioned {
        worker_id: WorkerId,
        business_id: BusinessId,
        worker_type_id: WorkerTypeId,
        version: String,
        /// SHA-256 of the merged instance configuration.
        config_sha256: String,
        provisioned_by: String,
        provisioned_at: DateTime<Utc>,
    },
    WorkerTransitioned {
        worker_id: WorkerId,
        business_id: BusinessId,
        from: WorkerState,
        to: WorkerState,
        requested_by: String,
        transitioned_at: DateTime<Utc>,
    },
    WorkerFailed {
        worker_id: WorkerId,
        business_id: BusinessId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

/// Task run admission and execution events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskRunEvent {
    RunAdmitted {
        task_run_id: TaskRunId,
        business_id: BusinessId,
        task_kind: String,
        admitted_at: DateTime<Utc>,
    },
    RunRoutedToApproval {
        task_run_id: TaskRunId,
        business_id: BusinessId,
        task_kind: String,
        estimated_impact: f64,
        routed_at: DateTime<Utc>,
    },
    RunApproved {
        task_run_id: TaskRunId,
        business_id: BusinessId,
        approved_by: String,
        approved_at: DateTime<Utc>,
    },
    RunRejected {
        task_run_id: TaskRunId,
        business_id: BusinessId,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
    AttemptStarted {
        task_run_id: TaskRunId,
        business_id: BusinessId,
        attempt: u32,
        started_at: DateTime<Utc>,
    },
    RunSucceeded {
        task_run_id: TaskRunId,
        business_id: BusinessId,
        attempts: u32,
        cost: f64,
        finished_at: DateTime<Utc>,
    },
    RunFailed {
        task_run_id: TaskRunId,
        business_id: BusinessId,
        attempts: u32,
        reason: String,
        finished_at: DateTime<Utc>,
    },
}

/// Security events are kept separate from ordinary lifecycle events: a
/// cross-tenant lookup is answered with a plain not-found, but the engine
/// records the mismatch distinctly for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SecurityEvent {
    TenantIsolationViolation {
        /// Business the caller was authenticated for.
        context_business_id: BusinessId,
        actor_id: String,
        entity_kind: String,
        entity_id: Uuid,
        /// Business that actually owns the entity.
        owner_business_id: BusinessId,
        detected_at: DateTime<Utc>,
    },
}
