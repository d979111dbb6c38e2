// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory fan-out over a tokio broadcast channel. Events are lost on
// restart; subscribers that fall behind see `Lagged`.

use crate::domain::events::{AdminNotification, ExAppLifecycleEvent, SecurityEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Lifecycle(ExAppLifecycleEvent),
    Security(SecurityEvent),
    AdminNotification(AdminNotification),
}

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of buffered events before slow subscribers lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_lifecycle_event(&self, event: ExAppLifecycleEvent) {
        self.publish(DomainEvent::Lifecycle(event));
    }

    pub fn publish_security_event(&self, event: SecurityEvent) {
        self.publish(DomainEvent::Security(event));
    }

    pub fn publish_admin_notification(&self, notification: AdminNotification) {
        self.publish(DomainEvent::AdminNotification(notification));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exapp::AppId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        bus.publish_lifecycle_event(ExAppLifecycleEvent::Enabled {
            app_id: AppId::new("a"),
            enabled_at: Utc::now(),
        });
        match rx.recv().await.unwrap() {
            DomainEvent::Lifecycle(ExAppLifecycleEvent::Enabled { app_id, .. }) => {
                assert_eq!(app_id.as_str(), "a")
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = DomainEvent::Security(SecurityEvent::RequestRejected {
            claimed_app_id: None,
            client: "127.0.0.1".into(),
            reason: "missing credentials".into(),
            rejected_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "security");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish_lifecycle_event(ExAppLifecycleEvent::Unregistered {
            app_id: AppId::new("a"),
            unregistered_at: Utc::now(),
        });
    }
}
