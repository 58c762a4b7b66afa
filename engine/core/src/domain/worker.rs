// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::business::BusinessId;
use crate::domain::worker_type::WorkerTypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker lifecycle state.
///
/// `Provisioned → Active ⇄ Paused → Retired`, with `Failed` reachable from
/// any non-terminal state on an unrecoverable provisioning or config error.
/// `Retired` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Provisioned,
    Active,
    Paused,
    Retired,
    Failed,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Retired | WorkerState::Failed)
    }

    pub fn can_transition_to(&self, target: WorkerState) -> bool {
        use WorkerState::*;
        match (self, target) {
            (Provisioned, Active) => true,
            (Active, Paused) => true,
            (Paused, Active) => true,
            (Active, Retired) | (Paused, Retired) => true,
            (from, Failed) if !from.is_terminal() => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Provisioned => "provisioned",
            WorkerState::Active => "active",
            WorkerState::Paused => "paused",
            WorkerState::Retired => "retired",
            WorkerState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid worker transition: {from} -> {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },
}

/// A business-owned instance of a worker type.
///
/// `business_id` is fixed at creation and never mutated; changing ownership
/// means provisioning a new worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub business_id: BusinessId,
    pub worker_type_id: WorkerTypeId,
    pub version: String,
    /// Instance configuration, already merged over the type defaults and
    /// validated against the type's config schema.
    pub config: serde_json::Value,
    pub state: WorkerState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(
        business_id: BusinessId,
        worker_type_id: WorkerTypeId,
        version: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkerId::new(),
            business_id,
            worker_type_id,
            version: version.into(),
            config,
            state: WorkerState::Provisioned,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition_to(&mut self, target: WorkerState) -> Result<(), WorkerError> {
        if !self.state.can_transition_to(target) {
            return Err(WorkerError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether new task submissions may target this worker.
    ///
    /// Terminal workers refuse admission outright; non-active, non-terminal
    /// states are left to the policy engine (manual/hybrid kinds can still
    /// be routed to approval on a paused worker).
    pub fn admits_submissions(&self) -> bool {
        !self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> Worker {
        Worker::new(
            BusinessId::new(),
            WorkerTypeId::from_name("property-manager"),
            "1.0.0",
            serde_json::json!({}),
        )
    }

    #[test]
    fn test_new_worker_is_provisioned() {
        let w = worker();
        assert_eq!(w.state, WorkerState::Provisioned);
        assert!(w.admits_submissions());
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut w = worker();
        assert!(w.transition_to(WorkerState::Active).is_ok());
        assert!(w.transition_to(WorkerState::Paused).is_ok());
        assert!(w.transition_to(WorkerState::Active).is_ok());
        assert!(w.transition_to(WorkerState::Retired).is_ok());
        assert!(!w.admits_submissions());
    }

    #[test]
    fn test_transition_matrix_exhaustive() {
        use WorkerState::*;
        let all = [Provisioned, Active, Paused, Retired, Failed];
        let allowed = [
            (Provisioned, Active),
            (Provisioned, Failed),
            (Active, Paused),
            (Active, Retired),
            (Active, Failed),
            (Paused, Active),
            (Paused, Retired),
            (Paused, Failed),
        ];

        for from in all {
            for to in all {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut w = worker();
        let err = w.transition_to(WorkerState::Paused).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidTransition { .. }));
        // State unchanged after a refused transition.
        assert_eq!(w.state, WorkerState::Provisioned);
    }

    #[test]
    fn test_terminal_states_are_dead_ends() {
        let mut w = worker();
        w.transition_to(WorkerState::Failed).unwrap();
        assert!(w.transition_to(WorkerState::Active).is_err());
        assert!(w.transition_to(WorkerState::Failed).is_err());
    }
}
