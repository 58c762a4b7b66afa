// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Usage Meter
//!
//! Turns terminal task runs into per-business usage deltas and answers
//! tenant-scoped usage queries. The deltas themselves are committed by
//! `TaskRunRepository::finalize` in the same transaction as the terminal
//! status write, so the counters can never drift from the run table.

use std::sync::Arc;

use crate::domain::context::TenantContext;
use crate::domain::errors::EngineResult;
use crate::domain::repository::UsageRepository;
use crate::domain::task_run::{TaskRun, TaskRunStatus};
use crate::domain::usage::{UsageDelta, UsageMetric, UsagePeriod, UsageRecord};

pub struct UsageMeter {
    usage: Arc<dyn UsageRepository>,
}

impl UsageMeter {
    pub fn new(usage: Arc<dyn UsageRepository>) -> Self {
        Self { usage }
    }

    /// Deltas to apply when `run` reaches its terminal state.
    ///
    /// Rejected runs never executed, so they meter nothing; `runs_started`
    /// counts runs that consumed at least one attempt.
    pub fn deltas_for(run: &TaskRun, api_calls: u64) -> Vec<UsageDelta> {
        let mut deltas = Vec::new();

        if run.attempts > 0 {
            deltas.push(UsageDelta::new(UsageMetric::RunsStarted, 1.0));
        }

        match run.status {
            TaskRunStatus::Succeeded => {
                deltas.push(UsageDelta::new(UsageMetric::RunsSucceeded, 1.0));
                if run.cost > 0.0 {
                    deltas.push(UsageDelta::new(UsageMetric::Cost, run.cost));
                }
                if api_calls > 0 {
                    deltas.push(UsageDelta::new(UsageMetric::ApiCalls, api_calls as f64));
                }
            }
            TaskRunStatus::Failed => {
                deltas.push(UsageDelta::new(UsageMetric::RunsFailed, 1.0));
            }
            // Rejected, or a non-terminal status the caller should not have
            // passed; nothing to meter.
            _ => {}
        }

        deltas
    }

    /// Usage counters for the caller's business only.
    pub async fn usage(
        &self,
        ctx: &TenantContext,
        period: UsagePeriod,
    ) -> EngineResult<Vec<UsageRecord>> {
        Ok(self.usage.query(ctx.business_id, period).await?)
    }
}
