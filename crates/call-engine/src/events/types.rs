//! Presence and call events, and who they are delivered to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentId, AgentStatus, Role};
use crate::store::CallStatus;

/// Everything the router tells the outside world about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    AgentConnected {
        agent_id: AgentId,
        role: Role,
    },
    AgentDisconnected {
        agent_id: AgentId,
    },
    AgentStatusChanged {
        agent_id: AgentId,
        previous: AgentStatus,
        status: AgentStatus,
    },
    /// Agent finished a call and is back in the pool
    AgentAvailable {
        agent_id: AgentId,
    },
    /// A call was claimed for this agent and is about to ring
    IncomingCall {
        agent_id: AgentId,
        call_id: String,
        phone_number: String,
        queue_id: Option<String>,
    },
    CallUpdated {
        call_id: String,
        status: CallStatus,
        agent_id: Option<AgentId>,
    },
    /// A call entered (`waiting = true`) or left the hold queue
    QueueUpdated {
        queue_id: String,
        call_id: String,
        waiting: bool,
    },
    SystemMessage {
        message: String,
        roles: Vec<Role>,
    },
}

/// Where a notification goes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTarget {
    Agent(AgentId),
    Role(Role),
}

const SUPERVISION: [Role; 2] = [Role::Supervisor, Role::Admin];

impl PresenceEvent {
    /// Wire name of the event, as clients subscribe to it
    pub fn name(&self) -> &'static str {
        match self {
            PresenceEvent::AgentConnected { .. } => "agent:connected",
            PresenceEvent::AgentDisconnected { .. } => "agent:disconnected",
            PresenceEvent::AgentStatusChanged { .. } => "agent:status-changed",
            PresenceEvent::AgentAvailable { .. } => "agent:available",
            PresenceEvent::IncomingCall { .. } => "call:incoming",
            PresenceEvent::CallUpdated { .. } => "call:updated",
            PresenceEvent::QueueUpdated { .. } => "queue:updated",
            PresenceEvent::SystemMessage { .. } => "system:message",
        }
    }

    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            PresenceEvent::AgentConnected { agent_id, .. }
            | PresenceEvent::AgentDisconnected { agent_id }
            | PresenceEvent::AgentStatusChanged { agent_id, .. }
            | PresenceEvent::AgentAvailable { agent_id }
            | PresenceEvent::IncomingCall { agent_id, .. } => Some(agent_id),
            PresenceEvent::CallUpdated { agent_id, .. } => agent_id.as_ref(),
            PresenceEvent::QueueUpdated { .. } | PresenceEvent::SystemMessage { .. } => None,
        }
    }

    /// Incoming calls go to the claimed agent only; call updates also reach
    /// the assigned agent; everything else is for supervisors and admins
    /// unless the event names its own roles.
    pub fn targets(&self) -> Vec<NotificationTarget> {
        match self {
            PresenceEvent::IncomingCall { agent_id, .. } => vec![NotificationTarget::Agent(agent_id.clone())],
            PresenceEvent::SystemMessage { roles, .. } => {
                roles.iter().copied().map(NotificationTarget::Role).collect()
            }
            PresenceEvent::CallUpdated { agent_id, .. } => {
                let mut targets: Vec<_> = SUPERVISION.iter().copied().map(NotificationTarget::Role).collect();
                if let Some(agent_id) = agent_id {
                    targets.push(NotificationTarget::Agent(agent_id.clone()));
                }
                targets
            }
            _ => SUPERVISION.iter().copied().map(NotificationTarget::Role).collect(),
        }
    }
}

/// An event stamped with an id and time, as seen by subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: PresenceEvent,
}

impl EventEnvelope {
    pub fn new(event: PresenceEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// What a [`super::NotificationChannel`] actually sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub event: String,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl NotificationPayload {
    pub fn from_envelope(envelope: &EventEnvelope) -> serde_json::Result<Self> {
        Ok(Self {
            event: envelope.event.name().to_string(),
            event_id: envelope.event_id,
            timestamp: envelope.timestamp,
            data: serde_json::to_value(&envelope.event)?,
        })
    }
}
