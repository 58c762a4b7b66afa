// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Autonomy Policy
//!
//! Per-business mapping from task kind to an autonomy mode, plus the
//! numeric impact threshold that drives hybrid routing. The policy is plain
//! data; the decision function lives in
//! [`crate::application::policy::PolicyEngine`] so it stays a pure,
//! table-testable function of its inputs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Hybrid threshold must be within 0.0..=1.0, got {0}")]
    InvalidThreshold(f64),
}

/// How much latitude a worker has for a given task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyMode {
    /// Execute without human involvement.
    Autonomous,
    /// Execute autonomously below the impact threshold, gate above it.
    Hybrid,
    /// Every run is gated behind a human approval.
    Manual,
}

/// Per-business autonomy rules.
///
/// A task kind with no explicit rule is never silently autonomous; the
/// decision function falls back to requiring approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyPolicy {
    rules: HashMap<String, AutonomyMode>,
    hybrid_threshold: f64,
}

impl AutonomyPolicy {
    pub fn new(hybrid_threshold: f64) -> Result<Self, PolicyError> {
        if !(0.0..=1.0).contains(&hybrid_threshold) {
            return Err(PolicyError::InvalidThreshold(hybrid_threshold));
        }
        Ok(Self {
            rules: HashMap::new(),
            hybrid_threshold,
        })
    }

    /// Builder method to add a rule for a task kind.
    pub fn with_rule(mut self, task_kind: impl Into<String>, mode: AutonomyMode) -> Self {
        self.rules.insert(task_kind.into(), mode);
        self
    }

    pub fn set_rule(&mut self, task_kind: impl Into<String>, mode: AutonomyMode) {
        self.rules.insert(task_kind.into(), mode);
    }

    /// Explicit rule for a task kind, if the business configured one.
    pub fn mode_for(&self, task_kind: &str) -> Option<AutonomyMode> {
        self.rules.get(task_kind).copied()
    }

    pub fn hybrid_threshold(&self) -> f64 {
        self.hybrid_threshold
    }
}

impl Default for AutonomyPolicy {
    /// Empty rule set with a mid-range threshold; everything routes to
    /// approval until the business configures rules.
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            hybrid_threshold: 0.5,
        }
    }
}

/// Why the policy engine refused to admit a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Autonomous execution requested on a worker that is not active.
    WorkerNotActive,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::WorkerNotActive => write!(f, "worker is not active"),
        }
    }
}

/// Outcome of evaluating a task run against the business policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyDecision {
    /// Admit and enqueue for execution.
    Proceed,
    /// Park the run until a human decides.
    RequireApproval,
    /// Refuse admission; the run is recorded as rejected.
    Reject(RejectReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_bounds() {
        assert!(AutonomyPolicy::new(0.0).is_ok());
        assert!(AutonomyPolicy::new(1.0).is_ok());
        assert!(AutonomyPolicy::new(-0.1).is_err());
        assert!(AutonomyPolicy::new(1.5).is_err());
    }

    #[test]
    fn test_mode_lookup() {
        let policy = AutonomyPolicy::default()
            .with_rule("send_reminder", AutonomyMode::Autonomous)
            .with_rule("apply_late_fee", AutonomyMode::Manual);

        assert_eq!(policy.mode_for("send_reminder"), Some(AutonomyMode::Autonomous));
        assert_eq!(policy.mode_for("apply_late_fee"), Some(AutonomyMode::Manual));
        assert_eq!(policy.mode_for("publish_listing"), None);
    }
}
