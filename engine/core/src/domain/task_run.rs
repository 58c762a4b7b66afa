// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::business::BusinessId;
use crate::domain::worker::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRunId(pub Uuid);

impl TaskRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TaskRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task run lifecycle.
///
/// `Pending → Approved | Rejected`, `Approved → Running`,
/// `Running → Succeeded | Failed | Approved` (the last one re-queues a
/// retryable attempt). `Rejected`, `Succeeded` and `Failed` are terminal;
/// a terminal run is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Pending,
    Approved,
    Rejected,
    Running,
    Succeeded,
    Failed,
}

impl TaskRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskRunStatus::Rejected | TaskRunStatus::Succeeded | TaskRunStatus::Failed
        )
    }

    fn can_transition_to(&self, target: TaskRunStatus) -> bool {
        use TaskRunStatus::*;
        match (self, target) {
            (Pending, Approved) | (Pending, Rejected) => true,
            (Approved, Running) => true,
            (Running, Succeeded) | (Running, Failed) => true,
            // A recoverable attempt failure puts the run back in the queue.
            (Running, Approved) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskRunStatus::Pending => "pending",
            TaskRunStatus::Approved => "approved",
            TaskRunStatus::Rejected => "rejected",
            TaskRunStatus::Running => "running",
            TaskRunStatus::Succeeded => "succeeded",
            TaskRunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TaskRunError {
    #[error("Invalid task run transition: {from} -> {to}")]
    InvalidTransition {
        from: TaskRunStatus,
        to: TaskRunStatus,
    },
    #[error("Task run was not routed to approval")]
    NotRoutedToApproval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalVerdict {
    Approve,
    Reject,
}

/// Human decision attached to a run the policy engine routed to review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub decided_by: String,
    pub verdict: ApprovalVerdict,
    pub note: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// The unit of execution, audit and billing.
///
/// `business_id` always equals the owning worker's business id; it is fixed
/// at creation and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: TaskRunId,
    pub business_id: BusinessId,
    pub worker_id: WorkerId,
    pub task_kind: String,
    /// Caller-supplied token; unique per (business, worker, task kind).
    pub idempotency_key: String,
    pub input: serde_json::Value,
    pub status: TaskRunStatus,
    /// Set when the policy engine routed this run to manual review.
    pub requires_approval: bool,
    pub approval: Option<ApprovalDecision>,
    pub estimated_impact: f64,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cost: f64,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskRun {
    pub fn new(
        business_id: BusinessId,
        worker_id: WorkerId,
        task_kind: impl Into<String>,
        idempotency_key: impl Into<String>,
        input: serde_json::Value,
        estimated_impact: f64,
    ) -> Self {
        Self {
            id: TaskRunId::new(),
            business_id,
            worker_id,
            task_kind: task_kind.into(),
            idempotency_key: idempotency_key.into(),
            input,
            status: TaskRunStatus::Pending,
            requires_approval: false,
            approval: None,
            estimated_impact,
            attempts: 0,
            started_at: None,
            finished_at: None,
            cost: 0.0,
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, target: TaskRunStatus) -> Result<(), TaskRunError> {
        if !self.status.can_transition_to(target) {
            return Err(TaskRunError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Admit for execution without human review.
    pub fn admit(&mut self) -> Result<(), TaskRunError> {
        self.transition(TaskRunStatus::Approved)
    }

    /// Park the run awaiting a human decision.
    pub fn route_to_approval(&mut self) {
        self.requires_approval = true;
    }

    /// Terminal rejection (policy refusal or approver veto).
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), TaskRunError> {
        self.transition(TaskRunStatus::Rejected)?;
        self.error = Some(reason.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Apply a human approval decision to a run routed to review.
    pub fn record_approval(&mut self, decision: ApprovalDecision) -> Result<(), TaskRunError> {
        if !self.requires_approval {
            return Err(TaskRunError::NotRoutedToApproval);
        }
        match decision.verdict {
            ApprovalVerdict::Approve => self.transition(TaskRunStatus::Approved)?,
            ApprovalVerdict::Reject => {
                self.transition(TaskRunStatus::Rejected)?;
                self.error = Some("rejected by approver".to_string());
                self.finished_at = Some(Utc::now());
            }
        }
        self.approval = Some(decision);
        Ok(())
    }

    /// Start the next attempt. Returns the attempt number (1-based).
    pub fn begin_attempt(&mut self) -> Result<u32, TaskRunError> {
        self.transition(TaskRunStatus::Running)?;
        self.attempts += 1;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(self.attempts)
    }

    /// Put a recoverable failure back into the queue for a later attempt.
    pub fn schedule_retry(&mut self, error: impl Into<String>) -> Result<(), TaskRunError> {
        self.transition(TaskRunStatus::Approved)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn complete(
        &mut self,
        result: serde_json::Value,
        cost_delta: f64,
    ) -> Result<(), TaskRunError> {
        self.transition(TaskRunStatus::Succeeded)?;
        self.result = Some(result);
        self.cost += cost_delta;
        self.error = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskRunError> {
        self.transition(TaskRunStatus::Failed)?;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run() -> TaskRun {
        TaskRun::new(
            BusinessId::new(),
            WorkerId::new(),
            "send_reminder",
            "key-1",
            json!({"lease_id": "L-100"}),
            0.1,
        )
    }

    #[test]
    fn test_autonomous_path() {
        let mut r = run();
        r.admit().unwrap();
        assert_eq!(r.begin_attempt().unwrap(), 1);
        r.complete(json!({"sent": true}), 0.02).unwrap();
        assert!(r.is_terminal());
        assert_eq!(r.status, TaskRunStatus::Succeeded);
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn test_retry_path_counts_attempts() {
        let mut r = run();
        r.admit().unwrap();
        r.begin_attempt().unwrap();
        r.schedule_retry("connection reset").unwrap();
        assert_eq!(r.status, TaskRunStatus::Approved);
        assert_eq!(r.begin_attempt().unwrap(), 2);
        r.fail("gave up").unwrap();
        assert_eq!(r.attempts, 2);
    }

    #[test]
    fn test_approval_required_path() {
        let mut r = run();
        r.route_to_approval();
        assert_eq!(r.status, TaskRunStatus::Pending);

        r.record_approval(ApprovalDecision {
            decided_by: "user-9".to_string(),
            verdict: ApprovalVerdict::Reject,
            note: Some("not this month".to_string()),
            decided_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(r.status, TaskRunStatus::Rejected);
        assert!(r.is_terminal());
    }

    #[test]
    fn test_approval_refused_when_not_routed() {
        let mut r = run();
        let err = r
            .record_approval(ApprovalDecision {
                decided_by: "user-9".to_string(),
                verdict: ApprovalVerdict::Approve,
                note: None,
                decided_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, TaskRunError::NotRoutedToApproval));
    }

    #[test]
    fn test_terminal_run_is_immutable() {
        let mut r = run();
        r.admit().unwrap();
        r.begin_attempt().unwrap();
        r.complete(json!({}), 0.0).unwrap();

        assert!(r.begin_attempt().is_err());
        assert!(r.fail("late").is_err());
        assert!(r.reject("late").is_err());
    }

    #[test]
    fn test_started_at_set_once() {
        let mut r = run();
        r.admit().unwrap();
        r.begin_attempt().unwrap();
        let first = r.started_at;
        r.schedule_retry("timeout").unwrap();
        r.begin_attempt().unwrap();
        assert_eq!(r.started_at, first);
    }
}
