// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker collaborator port
//!
//! The boundary between the engine and the code that actually performs a
//! task kind: document generation, payment reminders, listing syndication,
//! all external to this crate. Implemented once per worker type and
//! selected through the catalog at dispatch time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::business::BusinessId;
use crate::domain::task_run::TaskRunId;
use crate::domain::worker::{Worker, WorkerId};

/// Everything a collaborator gets for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub task_run_id: TaskRunId,
    pub business_id: BusinessId,
    pub worker_id: WorkerId,
    pub task_kind: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Schema-validated input payload.
    pub payload: serde_json::Value,
    /// The worker instance's merged configuration.
    pub worker_config: serde_json::Value,
}

/// What a successful attempt produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub output: serde_json::Value,
    /// Monetary cost attributed to this attempt.
    pub cost: f64,
    /// Upstream API calls consumed by this attempt.
    pub api_calls: u64,
}

impl TaskOutcome {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            cost: 0.0,
            api_calls: 0,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_api_calls(mut self, api_calls: u64) -> Self {
        self.api_calls = api_calls;
        self
    }
}

/// Failure classification the retry policy keys off.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Transient condition; the attempt may be retried.
    #[error("Transient execution failure: {0}")]
    Transient(String),
    /// Unrecoverable; retrying will not help.
    #[error("Permanent execution failure: {0}")]
    Permanent(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Transient(_))
    }
}

/// Per-worker-type execution collaborator.
#[async_trait]
pub trait WorkerCollaborator: Send + Sync {
    /// Synchronous readiness probe run during provisioning. A failure puts
    /// the worker in the `failed` state.
    async fn check_readiness(&self, worker: &Worker) -> Result<(), CollaboratorError>;

    /// Execute one attempt. May block on external services; the engine
    /// bounds it with the configured wall-clock ceiling.
    async fn execute(&self, ctx: ExecutionContext) -> Result<TaskOutcome, CollaboratorError>;
}
