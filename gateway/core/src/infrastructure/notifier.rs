// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use tracing::warn;

use crate::domain::events::{AdminNotification, AdminNotifier};
use crate::infrastructure::event_bus::EventBus;

/// Publishes admin notifications on the event bus and mirrors them to the log.
#[derive(Clone)]
pub struct EventBusNotifier {
    event_bus: EventBus,
}

impl EventBusNotifier {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

#[async_trait]
impl AdminNotifier for EventBusNotifier {
    async fn notify_admins(&self, notification: AdminNotification) {
        warn!(
            app_id = %notification.app_id,
            subject = %notification.subject,
            "{}",
            notification.message
        );
        self.event_bus.publish_admin_notification(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exapp::AppId;
    use crate::infrastructure::event_bus::DomainEvent;

    #[tokio::test]
    async fn test_notification_reaches_subscribers() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let notifier = EventBusNotifier::new(bus);
        notifier
            .notify_admins(AdminNotification::version_drift(&AppId::new("a"), "1.0.0", "1.1.0"))
            .await;
        match rx.recv().await.unwrap() {
            DomainEvent::AdminNotification(n) => assert!(n.message.contains("1.1.0")),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
