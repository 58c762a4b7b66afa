// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// Provides in-memory event streaming using tokio broadcast channels so
// observers (audit sinks, notification services, SSE bridges) can follow
// worker lifecycle, task run and security events in real time.
//
// In-memory only; durable audit lives in the execution ledger.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{SecurityEvent, TaskRunEvent, WorkerLifecycleEvent};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    WorkerLifecycle(WorkerLifecycleEvent),
    TaskRun(TaskRunEvent),
    Security(SecurityEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given buffered capacity. Old events
    /// are dropped for lagging subscribers once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a worker lifecycle event
    pub fn publish_worker_event(&self, event: WorkerLifecycleEvent) {
        self.publish(DomainEvent::WorkerLifecycle(event));
    }

    /// Publish a task run event
    pub fn publish_run_event(&self, event: TaskRunEvent) {
        self.publish(DomainEvent::TaskRun(event));
    }

    /// Publish a security event.
    ///
    /// Also written to the structured log at WARN so tenant-isolation
    /// violations are visible even with no bus subscriber attached.
    pub fn publish_security_event(&self, event: SecurityEvent) {
        warn!("Security event: {:?}", event);
        self.publish(DomainEvent::Security(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() returns the number of receivers; zero is fine.
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiver side of the event bus
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Wait for the next event. Returns `None` when the bus is closed or
    /// this receiver lagged past the buffer.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event receiver lagged, skipped {} events", skipped);
                self.receiver.recv().await.ok()
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::business::BusinessId;
    use crate::domain::task_run::TaskRunId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::with_default_capacity();
        let mut rx = bus.subscribe();

        bus.publish_run_event(TaskRunEvent::RunAdmitted {
            task_run_id: TaskRunId::new(),
            business_id: BusinessId::new(),
            task_kind: "send_reminder".to_string(),
            admitted_at: Utc::now(),
        });

        let event = rx.recv().await.expect("event");
        assert!(matches!(event, DomainEvent::TaskRun(_)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(8);
        bus.publish_run_event(TaskRunEvent::RunAdmitted {
            task_run_id: TaskRunId::new(),
            business_id: BusinessId::new(),
            task_kind: "generate_report".to_string(),
            admitted_at: Utc::now(),
        });
    }
}
