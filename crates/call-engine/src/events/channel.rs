//! Notification delivery transport.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::agent::{AgentId, Role};
use crate::error::{CallCenterError, Result};
use super::types::{NotificationPayload, NotificationTarget};

/// Transport to connected clients (websocket hub, push service, ...).
///
/// Both operations are fire-and-forget from the router's point of view: an
/// `Err` is logged and dropped.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify_agent(&self, agent_id: &AgentId, payload: &NotificationPayload) -> Result<()>;

    async fn broadcast_to_role(&self, role: Role, payload: &NotificationPayload) -> Result<()>;
}

/// A notification as recorded by [`InMemoryNotificationChannel`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub target: NotificationTarget,
    pub payload: NotificationPayload,
}

/// Records every notification instead of sending it
#[derive(Debug, Default)]
pub struct InMemoryNotificationChannel {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
}

impl InMemoryNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    /// Event names delivered to one agent, in order
    pub fn events_for_agent(&self, agent_id: &AgentId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.target == NotificationTarget::Agent(agent_id.clone()))
            .map(|n| n.payload.event.clone())
            .collect()
    }

    /// Event names broadcast to one role, in order
    pub fn events_for_role(&self, role: Role) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.target == NotificationTarget::Role(role))
            .map(|n| n.payload.event.clone())
            .collect()
    }

    fn record(&self, target: NotificationTarget, payload: &NotificationPayload) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CallCenterError::internal("notification transport down"));
        }
        self.sent.lock().push(SentNotification {
            target,
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for InMemoryNotificationChannel {
    async fn notify_agent(&self, agent_id: &AgentId, payload: &NotificationPayload) -> Result<()> {
        self.record(NotificationTarget::Agent(agent_id.clone()), payload)
    }

    async fn broadcast_to_role(&self, role: Role, payload: &NotificationPayload) -> Result<()> {
        self.record(NotificationTarget::Role(role), payload)
    }
}
