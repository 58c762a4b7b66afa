// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Engine runtime composition
//!
//! Wires the services over a set of repositories and runs the executor
//! pool. Transport layers (HTTP, gRPC, queues) sit on top of the public
//! services; this module owns only assembly and shutdown.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::application::executor::{ExecutionQueue, TaskExecutor};
use crate::application::registry::WorkerRegistry;
use crate::application::scheduler::TaskScheduler;
use crate::application::usage::UsageMeter;
use crate::config::EngineConfig;
use crate::domain::repository::{
    BusinessRepository, ExecutionLedger, TaskRunRepository, UsageRepository, WorkerRepository,
};
use crate::infrastructure::catalog::WorkerTypeCatalog;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::repositories::InMemoryEngineStore;

/// One handle per repository trait; hand in the same store several times or
/// mix backends as the deployment needs.
pub struct EngineRepositories {
    pub businesses: Arc<dyn BusinessRepository>,
    pub workers: Arc<dyn WorkerRepository>,
    pub runs: Arc<dyn TaskRunRepository>,
    pub ledger: Arc<dyn ExecutionLedger>,
    pub usage: Arc<dyn UsageRepository>,
}

impl EngineRepositories {
    /// Single shared in-memory store, for development and tests.
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryEngineStore::new());
        Self {
            businesses: store.clone(),
            workers: store.clone(),
            runs: store.clone(),
            ledger: store.clone(),
            usage: store,
        }
    }
}

/// A fully wired engine with a running executor pool.
pub struct EngineRuntime {
    pub registry: Arc<WorkerRegistry>,
    pub scheduler: Arc<TaskScheduler>,
    pub meter: Arc<UsageMeter>,
    pub bus: EventBus,
    pub queue: Arc<ExecutionQueue>,
    executor: TaskExecutor,
    handles: Vec<JoinHandle<()>>,
}

impl EngineRuntime {
    pub fn start(
        config: EngineConfig,
        catalog: Arc<WorkerTypeCatalog>,
        repos: EngineRepositories,
    ) -> Self {
        let bus = EventBus::new(config.event_capacity);
        let queue = Arc::new(ExecutionQueue::new());

        let registry = Arc::new(WorkerRegistry::new(
            repos.workers.clone(),
            catalog.clone(),
            bus.clone(),
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            repos.businesses.clone(),
            repos.workers.clone(),
            repos.runs.clone(),
            repos.ledger.clone(),
            catalog.clone(),
            queue.clone(),
            bus.clone(),
        ));
        let meter = Arc::new(UsageMeter::new(repos.usage.clone()));

        let executor = TaskExecutor::new(
            &config,
            repos.workers,
            repos.runs,
            repos.ledger,
            catalog,
            queue.clone(),
            bus.clone(),
        );
        let handles = executor.spawn();
        info!(pool_size = handles.len(), "Engine runtime started");

        Self {
            registry,
            scheduler,
            meter,
            bus,
            queue,
            executor,
            handles,
        }
    }

    /// Stop pulling new runs and wait for in-flight attempts to drain.
    pub async fn shutdown(self) {
        self.executor.shutdown();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Engine runtime drained");
    }
}
