// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Ledger entries
//!
//! One append-only record per attempt of a task run. Entries are never
//! updated; the full attempt history of a run is reconstructable from its
//! ordered entries even though the run itself only reflects the latest
//! attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::business::BusinessId;
use crate::domain::task_run::TaskRunId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub task_run_id: TaskRunId,
    pub business_id: BusinessId,
    /// 1-based attempt number; ordering key within a run.
    pub attempt: u32,
    /// The action the collaborator was invoked with (the task kind).
    pub action: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub cost_delta: f64,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionLogEntry {
    pub fn succeeded(
        task_run_id: TaskRunId,
        business_id: BusinessId,
        attempt: u32,
        action: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
        duration_ms: u64,
        cost_delta: f64,
    ) -> Self {
        Self {
            task_run_id,
            business_id,
            attempt,
            action: action.into(),
            input,
            output: Some(output),
            error: None,
            duration_ms,
            cost_delta,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(
        task_run_id: TaskRunId,
        business_id: BusinessId,
        attempt: u32,
        action: impl Into<String>,
        input: serde_json::Value,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            task_run_id,
            business_id,
            attempt,
            action: action.into(),
            input,
            output: None,
            error: Some(error.into()),
            duration_ms,
            cost_delta: 0.0,
            recorded_at: Utc::now(),
        }
    }
}
