// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod catalog;
pub mod event_bus;
pub mod repositories;

pub use catalog::{CatalogEntry, WorkerTypeCatalog};
pub use event_bus::{DomainEvent, EventBus, EventReceiver};
pub use repositories::InMemoryEngineStore;
