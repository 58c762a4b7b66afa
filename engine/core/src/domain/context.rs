// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tenant Context
//!
//! The authenticated `(actor, business)` pair, resolved by the transport
//! layer and passed explicitly into every engine operation. No component
//! reads identity from ambient state; if an operation does not receive a
//! context, it cannot touch tenant data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::business::BusinessId;
use crate::domain::task_run::TaskRun;
use crate::domain::worker::Worker;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
    pub business_id: BusinessId,
    pub actor_id: String,
    pub actor_roles: Vec<String>,
}

impl TenantContext {
    pub fn new(business_id: BusinessId, actor_id: impl Into<String>) -> Self {
        Self {
            business_id,
            actor_id: actor_id.into(),
            actor_roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.actor_roles = roles;
        self
    }

    /// Whether `entity` belongs to this context's business.
    pub fn owns<T: BusinessScoped>(&self, entity: &T) -> bool {
        entity.owning_business() == self.business_id
    }
}

/// Implemented by every entity that carries the owning-business foreign key.
///
/// Used by the tenant gate to compare ownership after a primary-key lookup
/// and to describe the entity in security events without leaking payloads.
pub trait BusinessScoped {
    fn owning_business(&self) -> BusinessId;
    fn entity_kind(&self) -> &'static str;
    fn entity_id(&self) -> Uuid;
}

impl BusinessScoped for Worker {
    fn owning_business(&self) -> BusinessId {
        self.business_id
    }

    fn entity_kind(&self) -> &'static str {
        "worker"
    }

    fn entity_id(&self) -> Uuid {
        self.id.0
    }
}

impl BusinessScoped for TaskRun {
    fn owning_business(&self) -> BusinessId {
        self.business_id
    }

    fn entity_kind(&self) -> &'static str {
        "task_run"
    }

    fn entity_id(&self) -> Uuid {
        self.id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::worker_type::WorkerTypeId;

    #[test]
    fn test_ownership_check() {
        let business = BusinessId::new();
        let ctx = TenantContext::new(business, "user-1");
        let worker = Worker::new(
            business,
            WorkerTypeId::from_name("property-manager"),
            "1.0.0",
            serde_json::json!({}),
        );
        assert!(ctx.owns(&worker));

        let other_ctx = TenantContext::new(BusinessId::new(), "user-2");
        assert!(!other_ctx.owns(&worker));
    }
}
