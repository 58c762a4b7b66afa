// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Registry
//!
//! Owns worker provisioning and lifecycle inside a business boundary.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::application::enforce_tenant;
use crate::domain::context::TenantContext;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::events::WorkerLifecycleEvent;
use crate::domain::repository::WorkerRepository;
use crate::domain::worker::{Worker, WorkerId, WorkerState};
use crate::domain::worker_type::{WorkerType, WorkerTypeId};
use crate::infrastructure::catalog::WorkerTypeCatalog;
use crate::infrastructure::event_bus::EventBus;

pub struct WorkerRegistry {
    workers: Arc<dyn WorkerRepository>,
    catalog: Arc<WorkerTypeCatalog>,
    bus: EventBus,
}

impl WorkerRegistry {
    pub fn new(
        workers: Arc<dyn WorkerRepository>,
        catalog: Arc<WorkerTypeCatalog>,
        bus: EventBus,
    ) -> Self {
        Self {
            workers,
            catalog,
            bus,
        }
    }

    /// Provision a worker of `worker_type_id` for the caller's business.
    ///
    /// The caller config is merged over the type defaults and validated
    /// against the type's config schema. The worker is created in
    /// `provisioned` and moved to `active` once the collaborator's
    /// readiness probe succeeds, or to `failed` if it does not; either way
    /// the worker is returned with a provisioning audit event emitted.
    pub async fn provision(
        &self,
        ctx: &TenantContext,
        worker_type_id: WorkerTypeId,
        config: serde_json::Value,
    ) -> EngineResult<Worker> {
        let entry = self
            .catalog
            .get(worker_type_id)
            .ok_or(EngineError::NotFound {
                entity: "worker type",
            })?;

        let merged = entry.worker_type.merged_config(&config);
        let violations = entry.config_violations(&merged);
        if !violations.is_empty() {
            let detail = violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(EngineError::InvalidConfig { detail });
        }

        let mut worker = Worker::new(
            ctx.business_id,
            worker_type_id,
            entry.worker_type.version.clone(),
            merged.clone(),
        );
        self.workers.save(&worker).await?;

        match entry.collaborator.check_readiness(&worker).await {
            Ok(()) => {
                worker.transition_to(WorkerState::Active)?;
                info!(
                    worker_id = %worker.id,
                    business_id = %worker.business_id,
                    worker_type = %entry.worker_type.name,
                    "Worker provisioned and active"
                );
            }
            Err(err) => {
                worker.transition_to(WorkerState::Failed)?;
                warn!(
                    worker_id = %worker.id,
                    business_id = %worker.business_id,
                    error = %err,
                    "Worker readiness check failed"
                );
                self.bus.publish_worker_event(WorkerLifecycleEvent::WorkerFailed {
                    worker_id: worker.id,
                    business_id: worker.business_id,
                    reason: err.to_string(),
                    failed_at: Utc::now(),
                });
            }
        }
        self.workers.save(&worker).await?;

        self.bus
            .publish_worker_event(WorkerLifecycleEvent::WorkerProvisioned {
                worker_id: worker.id,
                business_id: worker.business_id,
                worker_type_id,
                version: worker.version.clone(),
                config_sha256: config_hash(&merged),
                provisioned_by: ctx.actor_id.clone(),
                provisioned_at: Utc::now(),
            });
        metrics::counter!("workforce_workers_provisioned_total").increment(1);

        Ok(worker)
    }

    /// Move a worker through its lifecycle state machine.
    pub async fn transition(
        &self,
        ctx: &TenantContext,
        worker_id: WorkerId,
        target: WorkerState,
    ) -> EngineResult<Worker> {
        let mut worker = self.fetch_owned(ctx, worker_id).await?;
        let from = worker.state;
        worker.transition_to(target)?;
        self.workers.save(&worker).await?;

        info!(
            worker_id = %worker.id,
            business_id = %worker.business_id,
            from = %from,
            to = %target,
            "Worker transitioned"
        );
        self.bus
            .publish_worker_event(WorkerLifecycleEvent::WorkerTransitioned {
                worker_id: worker.id,
                business_id: worker.business_id,
                from,
                to: target,
                requested_by: ctx.actor_id.clone(),
                transitioned_at: Utc::now(),
            });

        Ok(worker)
    }

    /// Fetch a worker owned by the caller's business.
    pub async fn get(&self, ctx: &TenantContext, worker_id: WorkerId) -> EngineResult<Worker> {
        self.fetch_owned(ctx, worker_id).await
    }

    /// All workers owned by the caller's business.
    pub async fn list(&self, ctx: &TenantContext) -> EngineResult<Vec<Worker>> {
        Ok(self.workers.list_by_business(ctx.business_id).await?)
    }

    /// The deployment's worker type catalog (business-independent).
    pub fn list_worker_types(&self) -> Vec<&WorkerType> {
        self.catalog.list()
    }

    async fn fetch_owned(&self, ctx: &TenantContext, worker_id: WorkerId) -> EngineResult<Worker> {
        let worker = self
            .workers
            .find_by_id(worker_id)
            .await?
            .ok_or(EngineError::NotFound { entity: "worker" })?;
        enforce_tenant(&self.bus, ctx, &worker)?;
        Ok(worker)
    }
}

fn config_hash(config: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(config).unwrap_or_default();
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collaborator::{
        CollaboratorError, ExecutionContext, TaskOutcome, WorkerCollaborator,
    };
    use crate::infrastructure::catalog::builtin_worker_types;
    use crate::infrastructure::repositories::InMemoryEngineStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubCollaborator {
        ready: bool,
    }

    #[async_trait]
    impl WorkerCollaborator for StubCollaborator {
        async fn check_readiness(&self, _worker: &Worker) -> Result<(), CollaboratorError> {
            if self.ready {
                Ok(())
            } else {
                Err(CollaboratorError::Permanent("backing service unreachable".into()))
            }
        }

        async fn execute(
            &self,
            _ctx: ExecutionContext,
        ) -> Result<TaskOutcome, CollaboratorError> {
            Ok(TaskOutcome::new(json!({})))
        }
    }

    fn registry_with(ready: bool) -> WorkerRegistry {
        let mut catalog = WorkerTypeCatalog::new();
        for worker_type in builtin_worker_types() {
            catalog
                .register(worker_type, Arc::new(StubCollaborator { ready }))
                .unwrap();
        }
        WorkerRegistry::new(
            Arc::new(InMemoryEngineStore::new()),
            Arc::new(catalog),
            EventBus::new(64),
        )
    }

    fn ctx() -> TenantContext {
        TenantContext::new(crate::domain::business::BusinessId::new(), "admin")
    }

    #[tokio::test]
    async fn test_provision_activates_on_ready() {
        let registry = registry_with(true);
        let ctx = ctx();

        let worker = registry
            .provision(&ctx, WorkerTypeId::from_name("rent-collector"), json!({}))
            .await
            .unwrap();
        assert_eq!(worker.state, WorkerState::Active);
        // Type defaults were merged in.
        assert_eq!(worker.config["channel"], json!("email"));
    }

    #[tokio::test]
    async fn test_provision_fails_on_unready_collaborator() {
        let registry = registry_with(false);
        let ctx = ctx();

        let worker = registry
            .provision(&ctx, WorkerTypeId::from_name("rent-collector"), json!({}))
            .await
            .unwrap();
        assert_eq!(worker.state, WorkerState::Failed);

        // The failed worker is persisted and readable.
        let fetched = registry.get(&ctx, worker.id).await.unwrap();
        assert_eq!(fetched.state, WorkerState::Failed);
    }

    #[tokio::test]
    async fn test_provision_rejects_bad_config() {
        let registry = registry_with(true);
        let ctx = ctx();

        let err = registry
            .provision(
                &ctx,
                WorkerTypeId::from_name("rent-collector"),
                json!({"channel": "carrier-pigeon"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig { .. }));

        // Nothing was provisioned.
        assert!(registry.list(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provision_unknown_type_is_not_found() {
        let registry = registry_with(true);
        let err = registry
            .provision(&ctx(), WorkerTypeId::from_name("unheard-of"), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_transition_enforces_state_machine() {
        let registry = registry_with(true);
        let ctx = ctx();
        let worker = registry
            .provision(&ctx, WorkerTypeId::from_name("rent-collector"), json!({}))
            .await
            .unwrap();

        let paused = registry
            .transition(&ctx, worker.id, WorkerState::Paused)
            .await
            .unwrap();
        assert_eq!(paused.state, WorkerState::Paused);

        let err = registry
            .transition(&ctx, worker.id, WorkerState::Provisioned)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }
}
