// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Policy Engine
//!
//! Decides, per task run, whether execution proceeds autonomously, waits
//! for a human, or is refused. The evaluation is a pure function of
//! (policy, worker state, task kind, estimated impact): no clock, no
//! repository, no hidden state. That is what keeps it table-testable.

use crate::domain::policy::{AutonomyMode, AutonomyPolicy, PolicyDecision, RejectReason};
use crate::domain::worker::WorkerState;

pub struct PolicyEngine;

impl PolicyEngine {
    /// Evaluation order:
    ///
    /// 1. `manual` kinds always require approval, whatever the worker state.
    /// 2. `autonomous` kinds proceed only on an `active` worker; otherwise
    ///    the run is rejected with `WorkerNotActive`.
    /// 3. `hybrid` kinds compare the caller-supplied impact score against
    ///    the business threshold: below proceeds (same active-worker
    ///    requirement as autonomous), at or above requires approval.
    /// 4. A task kind with no policy entry requires approval; absence is
    ///    never silently autonomous.
    pub fn evaluate(
        policy: &AutonomyPolicy,
        worker_state: WorkerState,
        task_kind: &str,
        estimated_impact: f64,
    ) -> PolicyDecision {
        match policy.mode_for(task_kind) {
            Some(AutonomyMode::Manual) => PolicyDecision::RequireApproval,
            Some(AutonomyMode::Autonomous) => Self::proceed_if_active(worker_state),
            Some(AutonomyMode::Hybrid) => {
                if estimated_impact >= policy.hybrid_threshold() {
                    PolicyDecision::RequireApproval
                } else {
                    Self::proceed_if_active(worker_state)
                }
            }
            None => PolicyDecision::RequireApproval,
        }
    }

    fn proceed_if_active(worker_state: WorkerState) -> PolicyDecision {
        if worker_state == WorkerState::Active {
            PolicyDecision::Proceed
        } else {
            PolicyDecision::Reject(RejectReason::WorkerNotActive)
        }
    }
}
