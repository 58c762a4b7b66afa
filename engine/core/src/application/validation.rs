// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Contract Validator
//!
//! Structural validation of task-run inputs against the worker type's
//! declared schema, before a request is admitted. Side-effect free.

use serde_json::Value;

use crate::domain::errors::{EngineError, EngineResult};
use crate::infrastructure::catalog::CatalogEntry;

/// Payload that passed the capability contract for its task kind.
#[derive(Debug, Clone)]
pub struct ValidatedPayload(Value);

impl ValidatedPayload {
    pub fn into_inner(self) -> Value {
        self.0
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

pub struct CapabilityValidator;

impl CapabilityValidator {
    /// Check `payload` against the input schema `entry` declares for
    /// `task_kind`.
    ///
    /// Fails with `UnsupportedTaskKind` when the worker type does not
    /// declare the kind at all, and with `SchemaViolation` (carrying
    /// field-level paths) when the payload does not conform.
    pub fn validate(
        entry: &CatalogEntry,
        task_kind: &str,
        payload: Value,
    ) -> EngineResult<ValidatedPayload> {
        let violations = entry.input_violations(task_kind, &payload).ok_or_else(|| {
            EngineError::UnsupportedTaskKind {
                worker_type: entry.worker_type.name.clone(),
                task_kind: task_kind.to_string(),
            }
        })?;

        if !violations.is_empty() {
            return Err(EngineError::SchemaViolation { violations });
        }

        Ok(ValidatedPayload(payload))
    }
}
