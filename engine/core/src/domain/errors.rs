// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Engine error taxonomy
//!
//! Caller-facing errors for every engine operation. Cross-tenant lookups are
//! deliberately indistinguishable from plain not-found here; the mismatch is
//! recorded internally as a [`crate::domain::events::SecurityEvent`] instead
//! of a distinct error variant, so existence never leaks across businesses.

use thiserror::Error;

use crate::domain::repository::RepositoryError;
use crate::domain::task_run::TaskRunError;
use crate::domain::worker::WorkerError;

/// Field-level detail for a payload that failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldViolation {
    /// JSON pointer into the offending payload.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Absent, or owned by another business; the caller cannot tell.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Invalid worker configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("Worker type '{worker_type}' does not support task kind '{task_kind}'")]
    UnsupportedTaskKind {
        worker_type: String,
        task_kind: String,
    },

    #[error("Payload failed schema validation ({} violation(s))", violations.len())]
    SchemaViolation { violations: Vec<FieldViolation> },

    #[error("Worker does not admit task submissions")]
    WorkerNotActive,

    #[error("Submission rejected by policy: {reason}")]
    PolicyRejected { reason: String },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Task run is not pending approval")]
    NotPendingApproval,

    #[error("Retries exhausted after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Execution failed: {detail}")]
    ExecutionFailure { detail: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<WorkerError> for EngineError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::InvalidTransition { from, to } => EngineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
        }
    }
}

impl From<TaskRunError> for EngineError {
    fn from(err: TaskRunError) -> Self {
        match err {
            TaskRunError::InvalidTransition { from, to } => EngineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            TaskRunError::NotRoutedToApproval => EngineError::NotPendingApproval,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
