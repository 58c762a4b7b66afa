// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Type (capability contract)
//!
//! Immutable, business-independent catalog entries. A worker type declares
//! the task kinds it can execute, with a JSON Schema per kind for the input
//! and output payloads, a config schema for instance provisioning, and a
//! default autonomy tier businesses can seed their policy from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::policy::AutonomyMode;

/// Unique identifier for a worker type.
///
/// Derived deterministically from the catalog name so the same type resolves
/// to the same id on every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerTypeId(pub Uuid);

impl WorkerTypeId {
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl std::fmt::Display for WorkerTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contract for one task kind a worker type supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskKindSpec {
    /// JSON Schema the input payload must satisfy before admission.
    pub input_schema: serde_json::Value,
    /// JSON Schema describing the collaborator's output.
    pub output_schema: serde_json::Value,
    /// Autonomy tier suggested to businesses when seeding their policy.
    pub default_tier: AutonomyMode,
}

/// Immutable capability catalog entry a worker instantiates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerType {
    pub id: WorkerTypeId,
    pub name: String,
    pub version: String,
    /// JSON Schema for instance configuration.
    pub config_schema: serde_json::Value,
    /// Defaults merged under the caller-supplied config at provisioning.
    pub default_config: serde_json::Map<String, serde_json::Value>,
    pub task_kinds: HashMap<String, TaskKindSpec>,
}

impl WorkerType {
    pub fn task_kind(&self, kind: &str) -> Option<&TaskKindSpec> {
        self.task_kinds.get(kind)
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.task_kinds.contains_key(kind)
    }

    /// Merge `overrides` on top of the type's default config.
    ///
    /// Top-level keys only; a caller-supplied key replaces the default
    /// wholesale.
    pub fn merged_config(&self, overrides: &serde_json::Value) -> serde_json::Value {
        let mut merged = self.default_config.clone();
        if let Some(map) = overrides.as_object() {
            for (key, value) in map {
                merged.insert(key.clone(), value.clone());
            }
        }
        serde_json::Value::Object(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn worker_type() -> WorkerType {
        let mut task_kinds = HashMap::new();
        task_kinds.insert(
            "send_reminder".to_string(),
            TaskKindSpec {
                input_schema: json!({"type": "object"}),
                output_schema: json!({"type": "object"}),
                default_tier: AutonomyMode::Autonomous,
            },
        );
        let mut default_config = serde_json::Map::new();
        default_config.insert("reminder_days_before".to_string(), json!(3));
        default_config.insert("channel".to_string(), json!("email"));

        WorkerType {
            id: WorkerTypeId::from_name("rent-collector"),
            name: "rent-collector".to_string(),
            version: "1.0.0".to_string(),
            config_schema: json!({"type": "object"}),
            default_config,
            task_kinds,
        }
    }

    #[test]
    fn test_id_is_deterministic() {
        assert_eq!(
            WorkerTypeId::from_name("rent-collector"),
            WorkerTypeId::from_name("rent-collector")
        );
        assert_ne!(
            WorkerTypeId::from_name("rent-collector"),
            WorkerTypeId::from_name("property-manager")
        );
    }

    #[test]
    fn test_supports() {
        let wt = worker_type();
        assert!(wt.supports("send_reminder"));
        assert!(!wt.supports("generate_report"));
    }

    #[test]
    fn test_merged_config_overrides_defaults() {
        let wt = worker_type();
        let merged = wt.merged_config(&json!({"channel": "sms"}));
        assert_eq!(merged["channel"], json!("sms"));
        assert_eq!(merged["reminder_days_before"], json!(3));
    }
}
