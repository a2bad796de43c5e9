//! Agent presence entry points.
//!
//! These wrap the registry so every presence change is published on the
//! event bus, and so disconnects and availability changes feed back into
//! call routing.

use std::sync::Arc;

use callcenter_infra_common::ErrorContext;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::{AgentId, AgentStatus, SessionMeta};
use crate::error::Result;
use crate::events::PresenceEvent;
use crate::presence::{PresenceStats, RegistryOutcome};
use crate::store::CallStatus;
use super::core::CallRouter;
use super::types::{CallState, RouteOutcome};

impl CallRouter {
    /// Register (or reconnect) an agent. Calls waiting on hold are re-offered
    /// straight away.
    pub async fn agent_connected(self: &Arc<Self>, agent_id: &AgentId, meta: SessionMeta) -> Result<RegistryOutcome> {
        let role = meta.role;
        let outcome = self.registry.register_agent(agent_id, meta).await?;
        info!("👤 Agent {} connected as {} ({:?})", agent_id, role, outcome);

        self.events.publish(PresenceEvent::AgentConnected {
            agent_id: agent_id.clone(),
            role,
        });
        self.wake_held_calls().await;
        Ok(outcome)
    }

    /// Remove an agent. A call still ringing at that agent moves on to the
    /// next candidate; an answered call is left to end normally.
    pub async fn agent_disconnected(self: &Arc<Self>, agent_id: &AgentId) -> Result<RegistryOutcome> {
        let outcome = self.registry.deregister_agent(agent_id).await?;
        let current_call_id = match &outcome {
            RegistryOutcome::Deregistered { current_call_id } => current_call_id.clone(),
            _ => {
                debug!("Disconnect for unknown agent {}", agent_id);
                return Ok(outcome);
            }
        };

        info!("👋 Agent {} disconnected", agent_id);
        self.events.publish(PresenceEvent::AgentDisconnected { agent_id: agent_id.clone() });

        if let Some(call_id) = current_call_id {
            if let Some(session) = self.session(&call_id) {
                let mut st = session.state.lock().await;
                if st.state == CallState::Ringing && st.agent_id.as_ref() == Some(agent_id) {
                    warn!("📵 Agent {} left while call {} was ringing", agent_id, call_id);
                    self.fail_ringing_agent(&session, &mut st, "agent_disconnected", CallStatus::Failed).await;
                }
            }
        }
        Ok(outcome)
    }

    /// Change an agent's status. Going `Available` re-offers held calls.
    pub async fn agent_status_update(self: &Arc<Self>, agent_id: &AgentId, status: AgentStatus) -> Result<RegistryOutcome> {
        let outcome = self.registry.set_status(agent_id, status).await?;
        if let RegistryOutcome::StatusUpdated { previous } = outcome {
            if previous != status {
                info!("🔄 Agent {} status {} -> {}", agent_id, previous, status);
            }
            self.events.publish(PresenceEvent::AgentStatusChanged {
                agent_id: agent_id.clone(),
                previous,
                status,
            });
            if status == AgentStatus::Available {
                self.wake_held_calls().await;
            }
        }
        Ok(outcome)
    }

    /// The agent's side of a call ended (agent hung up, wrap-up done).
    ///
    /// Ends the call if the router still tracks it with this agent; otherwise
    /// only releases the agent, which is a no-op if it was already released.
    pub async fn agent_call_ended(self: &Arc<Self>, agent_id: &AgentId, call_id: &str) -> Result<RouteOutcome> {
        if let Some(session) = self.session(call_id) {
            let mut st = session.state.lock().await;
            if st.state != CallState::Ended && st.agent_id.as_ref() == Some(agent_id) {
                return Ok(self.finish(&session, &mut st, CallStatus::Completed, "completed").await);
            }
        }

        if let Err(e) = self.coordinator.release_agent(agent_id, Some(call_id)).await {
            let ctx = ErrorContext::new("call_router", "release")
                .with_detail("call_id", call_id)
                .with_detail("agent_id", agent_id);
            warn!("🔒 Release after call end failed {}: {}", ctx, e);
            return Err(e);
        }
        Ok(RouteOutcome::NotFound { call_id: call_id.to_string() })
    }

    pub async fn presence_statistics(&self) -> Result<PresenceStats> {
        self.registry.statistics().await
    }

    /// Re-check held calls, longest-waiting first
    async fn wake_held_calls(self: &Arc<Self>) {
        let sessions: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut held: Vec<(Instant, String)> = Vec::new();
        for session in sessions {
            let st = session.state.lock().await;
            if st.state == CallState::Exhausted {
                if let Some(started) = st.hold_started {
                    held.push((started, session.call_id.clone()));
                }
            }
        }
        if held.is_empty() {
            return;
        }
        held.sort();

        debug!("Re-offering {} held calls", held.len());
        for (_, call_id) in held {
            if let Err(e) = self.on_hold_tick(&call_id).await {
                debug!("Re-offer of {} failed: {}", call_id, e);
            }
        }
    }
}
