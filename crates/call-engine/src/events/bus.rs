//! # Presence Event Bus
//!
//! Fans events out to two audiences:
//!
//! - in-process subscribers, through a `tokio::sync::broadcast` channel
//!   (monitoring, the simulator, tests);
//! - connected clients, through a [`NotificationChannel`], one spawned task
//!   per event so a slow transport never holds up routing.
//!
//! Delivery is best-effort. A failed notification is logged with its target
//! and counted; nothing upstream ever waits for or depends on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use callcenter_infra_common::ErrorContext;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::channel::NotificationChannel;
use super::types::{EventEnvelope, NotificationPayload, NotificationTarget, PresenceEvent};

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusStats {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

pub struct EventBus {
    channel: Arc<dyn NotificationChannel>,
    sender: broadcast::Sender<EventEnvelope>,
    counters: Arc<DeliveryCounters>,
}

impl EventBus {
    pub fn new(channel: Arc<dyn NotificationChannel>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            channel,
            sender,
            counters: Arc::new(DeliveryCounters::default()),
        }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Publish without waiting for delivery
    pub fn publish(&self, event: PresenceEvent) {
        let envelope = EventEnvelope::new(event);
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        // No subscribers is fine
        let _ = self.sender.send(envelope.clone());

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("📭 No runtime to deliver {}; dropping notification", envelope.event.name());
            return;
        };

        let channel = self.channel.clone();
        let counters = self.counters.clone();
        handle.spawn(async move {
            deliver(channel.as_ref(), &counters, &envelope).await;
        });
    }

    /// Publish and wait until every target has been attempted
    pub async fn publish_and_wait(&self, event: PresenceEvent) {
        let envelope = EventEnvelope::new(event);
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(envelope.clone());
        deliver(self.channel.as_ref(), &self.counters, &envelope).await;
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn deliver(channel: &dyn NotificationChannel, counters: &DeliveryCounters, envelope: &EventEnvelope) {
    let payload = match NotificationPayload::from_envelope(envelope) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Cannot encode {} event: {}", envelope.event.name(), e);
            counters.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    for target in envelope.event.targets() {
        let result = match &target {
            NotificationTarget::Agent(agent_id) => channel.notify_agent(agent_id, &payload).await,
            NotificationTarget::Role(role) => channel.broadcast_to_role(*role, &payload).await,
        };

        match result {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("📨 Delivered {} to {:?}", payload.event, target);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                let ctx = ErrorContext::new("event_bus", "deliver")
                    .with_detail("event", &payload.event)
                    .with_detail("target", format!("{:?}", target));
                warn!("⚠️ Notification failed {}: {}", ctx, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentId, Role};
    use crate::events::channel::InMemoryNotificationChannel;

    fn bus() -> (EventBus, Arc<InMemoryNotificationChannel>) {
        let channel = Arc::new(InMemoryNotificationChannel::new());
        (EventBus::new(channel.clone(), 16), channel)
    }

    #[tokio::test]
    async fn test_subscribers_see_published_events() {
        let (bus, _) = bus();
        let mut rx = bus.subscribe();

        bus.publish(PresenceEvent::AgentDisconnected { agent_id: AgentId::from("A1") });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event, PresenceEvent::AgentDisconnected { agent_id: AgentId::from("A1") });
    }

    #[tokio::test]
    async fn test_incoming_call_is_delivered_to_agent() {
        let (bus, channel) = bus();
        bus.publish_and_wait(PresenceEvent::IncomingCall {
            agent_id: AgentId::from("A1"),
            call_id: "c-1".into(),
            phone_number: "+15550100".into(),
            queue_id: Some("support-queue".into()),
        })
        .await;

        assert_eq!(channel.events_for_agent(&AgentId::from("A1")), vec!["call:incoming"]);
        assert!(channel.events_for_role(Role::Supervisor).is_empty());
        assert_eq!(bus.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_spawned_delivery_reaches_supervisors() {
        let (bus, channel) = bus();
        bus.publish(PresenceEvent::AgentAvailable { agent_id: AgentId::from("B1") });

        for _ in 0..100 {
            if channel.sent().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(channel.events_for_role(Role::Supervisor), vec!["agent:available"]);
        assert_eq!(channel.events_for_role(Role::Admin), vec!["agent:available"]);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_counted_not_raised() {
        let (bus, channel) = bus();
        channel.set_failing(true);

        bus.publish_and_wait(PresenceEvent::SystemMessage {
            message: "maintenance at 22:00".into(),
            roles: vec![Role::Agent],
        })
        .await;

        let stats = bus.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 0);
    }

    #[test]
    fn test_publish_outside_runtime_does_not_panic() {
        let (bus, channel) = bus();
        bus.publish(PresenceEvent::AgentDisconnected { agent_id: AgentId::from("A1") });
        assert!(channel.sent().is_empty());
        assert_eq!(bus.stats().published, 1);
    }
}
