// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Type Catalog
//!
//! Immutable registry of capability contracts. Each entry pairs a
//! [`WorkerType`] with its execution collaborator and the pre-compiled JSON
//! Schema validators for its config and task-kind inputs, so admission-time
//! validation never recompiles schemas.
//!
//! The built-in property-management types mirror the platform's seed
//! catalog; deployments register additional types (with their own
//! collaborators) at startup.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::Validator;
use serde_json::json;
use thiserror::Error;

use crate::domain::collaborator::WorkerCollaborator;
use crate::domain::errors::FieldViolation;
use crate::domain::policy::AutonomyMode;
use crate::domain::worker_type::{TaskKindSpec, WorkerType, WorkerTypeId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Worker type '{name}' declares an invalid schema: {detail}")]
    InvalidSchema { name: String, detail: String },

    #[error("Worker type '{0}' is already registered")]
    DuplicateType(String),
}

/// A worker type plus everything needed to validate and dispatch against it.
pub struct CatalogEntry {
    pub worker_type: WorkerType,
    pub collaborator: Arc<dyn WorkerCollaborator>,
    config_validator: Validator,
    input_validators: HashMap<String, Validator>,
}

impl CatalogEntry {
    fn new(
        worker_type: WorkerType,
        collaborator: Arc<dyn WorkerCollaborator>,
    ) -> Result<Self, CatalogError> {
        let invalid = |detail: String| CatalogError::InvalidSchema {
            name: worker_type.name.clone(),
            detail,
        };

        let config_validator =
            jsonschema::validator_for(&worker_type.config_schema).map_err(|e| invalid(e.to_string()))?;

        let mut input_validators = HashMap::new();
        for (kind, spec) in &worker_type.task_kinds {
            let validator =
                jsonschema::validator_for(&spec.input_schema).map_err(|e| invalid(e.to_string()))?;
            input_validators.insert(kind.clone(), validator);
        }

        Ok(Self {
            worker_type,
            collaborator,
            config_validator,
            input_validators,
        })
    }

    /// Violations of the instance config schema; empty means valid.
    pub fn config_violations(&self, config: &serde_json::Value) -> Vec<FieldViolation> {
        collect_violations(&self.config_validator, config)
    }

    /// Violations of the input schema for `task_kind`.
    ///
    /// `None` if the worker type does not declare the kind at all.
    pub fn input_violations(
        &self,
        task_kind: &str,
        payload: &serde_json::Value,
    ) -> Option<Vec<FieldViolation>> {
        self.input_validators
            .get(task_kind)
            .map(|validator| collect_violations(validator, payload))
    }
}

fn collect_violations(validator: &Validator, instance: &serde_json::Value) -> Vec<FieldViolation> {
    validator
        .iter_errors(instance)
        .map(|error| FieldViolation {
            path: error.instance_path().to_string(),
            message: error.to_string(),
        })
        .collect()
}

/// Registry of all worker types known to this deployment.
#[derive(Default)]
pub struct WorkerTypeCatalog {
    entries: HashMap<WorkerTypeId, CatalogEntry>,
}

impl WorkerTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker type with its collaborator, compiling its schemas.
    pub fn register(
        &mut self,
        worker_type: WorkerType,
        collaborator: Arc<dyn WorkerCollaborator>,
    ) -> Result<(), CatalogError> {
        if self.entries.contains_key(&worker_type.id) {
            return Err(CatalogError::DuplicateType(worker_type.name));
        }
        let entry = CatalogEntry::new(worker_type, collaborator)?;
        self.entries.insert(entry.worker_type.id, entry);
        Ok(())
    }

    pub fn get(&self, id: WorkerTypeId) -> Option<&CatalogEntry> {
        self.entries.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&CatalogEntry> {
        self.get(WorkerTypeId::from_name(name))
    }

    pub fn list(&self) -> Vec<&WorkerType> {
        self.entries.values().map(|e| &e.worker_type).collect()
    }
}

// ============================================================================
// Built-in property-management worker types
// ============================================================================

/// The seed catalog shipped with the platform.
pub fn builtin_worker_types() -> Vec<WorkerType> {
    vec![property_manager_type(), rent_collector_type()]
}

fn property_manager_type() -> WorkerType {
    let mut task_kinds = HashMap::new();
    task_kinds.insert(
        "generate_report".to_string(),
        TaskKindSpec {
            input_schema: json!({
                "type": "object",
                "properties": {
                    "property_id": {"type": "string"},
                    "period": {"type": "string", "pattern": "^[0-9]{4}-[0-9]{2}$"}
                },
                "required": ["property_id", "period"],
                "additionalProperties": false
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "report_url": {"type": "string"},
                    "totals": {"type": "object"}
                },
                "required": ["report_url"]
            }),
            default_tier: AutonomyMode::Autonomous,
        },
    );
    task_kinds.insert(
        "detect_overdue".to_string(),
        TaskKindSpec {
            input_schema: json!({
                "type": "object",
                "properties": {
                    "as_of": {"type": "string", "format": "date"}
                },
                "required": ["as_of"],
                "additionalProperties": false
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "overdue_leases": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["overdue_leases"]
            }),
            default_tier: AutonomyMode::Autonomous,
        },
    );
    task_kinds.insert(
        "publish_listing".to_string(),
        TaskKindSpec {
            input_schema: json!({
                "type": "object",
                "properties": {
                    "property_id": {"type": "string"},
                    "channels": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1
                    }
                },
                "required": ["property_id"],
                "additionalProperties": false
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "published_to": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["published_to"]
            }),
            default_tier: AutonomyMode::Hybrid,
        },
    );

    let mut default_config = serde_json::Map::new();
    default_config.insert("report_timezone".to_string(), json!("UTC"));
    default_config.insert("listing_channels".to_string(), json!(["website"]));

    WorkerType {
        id: WorkerTypeId::from_name("property-manager"),
        name: "property-manager".to_string(),
        version: "1.2.0".to_string(),
        config_schema: json!({
            "type": "object",
            "properties": {
                "report_timezone": {"type": "string"},
                "listing_channels": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 1
                }
            },
            "additionalProperties": false
        }),
        default_config,
        task_kinds,
    }
}

fn rent_collector_type() -> WorkerType {
    let mut task_kinds = HashMap::new();
    task_kinds.insert(
        "send_reminder".to_string(),
        TaskKindSpec {
            input_schema: json!({
                "type": "object",
                "properties": {
                    "lease_id": {"type": "string"},
                    "amount_due": {"type": "number", "minimum": 0}
                },
                "required": ["lease_id", "amount_due"],
                "additionalProperties": false
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "sent": {"type": "boolean"},
                    "channel": {"type": "string"}
                },
                "required": ["sent"]
            }),
            default_tier: AutonomyMode::Autonomous,
        },
    );
    task_kinds.insert(
        "apply_late_fee".to_string(),
        TaskKindSpec {
            input_schema: json!({
                "type": "object",
                "properties": {
                    "lease_id": {"type": "string"},
                    "percent": {"type": "number", "minimum": 0, "maximum": 100}
                },
                "required": ["lease_id"],
                "additionalProperties": false
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "fee_amount": {"type": "number"}
                },
                "required": ["fee_amount"]
            }),
            default_tier: AutonomyMode::Manual,
        },
    );

    let mut default_config = serde_json::Map::new();
    default_config.insert("reminder_days_before".to_string(), json!(3));
    default_config.insert("channel".to_string(), json!("email"));
    default_config.insert("late_fee_percent".to_string(), json!(5.0));

    WorkerType {
        id: WorkerTypeId::from_name("rent-collector"),
        name: "rent-collector".to_string(),
        version: "1.0.3".to_string(),
        config_schema: json!({
            "type": "object",
            "properties": {
                "reminder_days_before": {"type": "integer", "minimum": 0},
                "channel": {"type": "string", "enum": ["email", "sms"]},
                "late_fee_percent": {"type": "number", "minimum": 0, "maximum": 100}
            },
            "additionalProperties": false
        }),
        default_config,
        task_kinds,
    }
}
