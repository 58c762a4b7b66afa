// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod executor;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod usage;
pub mod validation;

// Re-export the service types for convenience
pub use executor::{ExecutionQueue, RetryPolicy, TaskExecutor};
pub use policy::PolicyEngine;
pub use registry::WorkerRegistry;
pub use scheduler::{TaskScheduler, TaskSubmission};
pub use usage::UsageMeter;
pub use validation::CapabilityValidator;

use chrono::Utc;

use crate::domain::context::{BusinessScoped, TenantContext};
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::events::SecurityEvent;
use crate::infrastructure::event_bus::EventBus;

/// Compare an entity fetched by primary key against the caller's business.
///
/// A mismatch is answered with the same `NotFound` an absent entity gets, so
/// existence never leaks across tenants, but it is recorded distinctly as a
/// security event before the error is returned.
pub(crate) fn enforce_tenant<T: BusinessScoped>(
    bus: &EventBus,
    ctx: &TenantContext,
    entity: &T,
) -> EngineResult<()> {
    if ctx.owns(entity) {
        return Ok(());
    }

    bus.publish_security_event(SecurityEvent::TenantIsolationViolation {
        context_business_id: ctx.business_id,
        actor_id: ctx.actor_id.clone(),
        entity_kind: entity.entity_kind().to_string(),
        entity_id: entity.entity_id(),
        owner_business_id: entity.owning_business(),
        detected_at: Utc::now(),
    });

    Err(EngineError::NotFound {
        entity: entity.entity_kind(),
    })
}
