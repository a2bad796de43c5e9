//! # Call Router Core
//!
//! [`CallRouter`] owns the per-call state machines and wires the registry,
//! coordinator, stores, telephony and event bus together. Call flows live in
//! [`super::calls`], hold handling in [`super::hold`], and agent presence
//! entry points in [`super::agents`].
//!
//! Each call has its own async mutex, so events for one call are applied in
//! order while different calls proceed in parallel. The only state shared
//! across calls is the presence registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use callcenter_infra_common::ErrorContext;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::agent::{AgentId, Role};
use crate::assignment::{AssignmentCoordinator, CallAssignmentAttempt};
use crate::config::CallCenterConfig;
use crate::events::{EventBus, EventEnvelope, PresenceEvent};
use crate::presence::PresenceRegistry;
use crate::routing::{CallRequirements, RoutingStrategy};
use crate::store::{CallDirection, CallPatch, CallStatus, CallStore, QueueStore};
use crate::telephony::TelephonyBackend;
use super::types::{CallState, RouteOutcome, RoutingCounters, RoutingRequest, RoutingStats};

/// Immutable facts about a call plus its mutable routing state
pub(super) struct CallSession {
    pub(super) call_id: String,
    pub(super) phone_number: String,
    pub(super) direction: CallDirection,
    pub(super) queue_id: String,
    pub(super) requirements: CallRequirements,
    pub(super) strategy: RoutingStrategy,
    pub(super) queue_members: Option<Vec<AgentId>>,
    /// Set on caller hangup; checked between claim attempts
    pub(super) cancelled: AtomicBool,
    pub(super) state: Mutex<SessionState>,
}

pub(super) struct SessionState {
    pub(super) state: CallState,
    pub(super) attempt: CallAssignmentAttempt,
    pub(super) agent_id: Option<AgentId>,
    /// Bumped on every offer; a ring timer only fires for its own offer
    pub(super) ring_generation: u64,
    /// Bumped on every entry into hold; stale monitors stop
    pub(super) hold_generation: u64,
    pub(super) hold_started: Option<Instant>,
    pub(super) connected_from_queue: bool,
}

impl CallSession {
    pub(super) fn new(
        request: &RoutingRequest,
        queue_id: String,
        strategy: RoutingStrategy,
        queue_members: Option<Vec<AgentId>>,
    ) -> Self {
        Self {
            call_id: request.call_id.clone(),
            phone_number: request.phone_number.clone(),
            direction: request.direction,
            queue_id,
            requirements: request.requirements(),
            strategy,
            queue_members,
            cancelled: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                state: CallState::New,
                attempt: CallAssignmentAttempt::new(request.call_id.clone()),
                agent_id: None,
                ring_generation: 0,
                hold_generation: 0,
                hold_started: None,
                connected_from_queue: false,
            }),
        }
    }

    pub(super) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-call routing state machine and presence entry points
pub struct CallRouter {
    pub(super) config: CallCenterConfig,
    pub(super) registry: Arc<dyn PresenceRegistry>,
    pub(super) coordinator: AssignmentCoordinator,
    pub(super) call_store: Arc<dyn CallStore>,
    pub(super) queue_store: Arc<dyn QueueStore>,
    pub(super) telephony: Arc<dyn TelephonyBackend>,
    pub(super) events: Arc<EventBus>,
    pub(super) sessions: DashMap<String, Arc<CallSession>>,
    pub(super) counters: RoutingCounters,
}

impl CallRouter {
    pub(super) fn new(
        config: CallCenterConfig,
        registry: Arc<dyn PresenceRegistry>,
        coordinator: AssignmentCoordinator,
        call_store: Arc<dyn CallStore>,
        queue_store: Arc<dyn QueueStore>,
        telephony: Arc<dyn TelephonyBackend>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            registry,
            coordinator,
            call_store,
            queue_store,
            telephony,
            events,
            sessions: DashMap::new(),
            counters: RoutingCounters::default(),
        }
    }

    pub fn config(&self) -> &CallCenterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn PresenceRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Every event the router publishes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> RoutingStats {
        self.counters.snapshot(self.sessions.len() as u64)
    }

    /// Ids of calls the router is still tracking
    pub fn active_calls(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// `None` once the call has ended or if it was never routed here
    pub async fn call_state(&self, call_id: &str) -> Option<CallState> {
        let session = self.session(call_id)?;
        let st = session.state.lock().await;
        Some(st.state)
    }

    /// Exclusion list and retry history of a live call
    pub async fn assignment_attempt(&self, call_id: &str) -> Option<CallAssignmentAttempt> {
        let session = self.session(call_id)?;
        let st = session.state.lock().await;
        Some(st.attempt.clone())
    }

    /// Push an announcement to every connected user with one of `roles`
    pub fn broadcast_system_message(&self, message: impl Into<String>, roles: Vec<Role>) {
        self.events.publish(PresenceEvent::SystemMessage {
            message: message.into(),
            roles,
        });
    }

    pub(super) fn session(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(call_id).map(|entry| entry.value().clone())
    }

    /// Write-behind to the call store. Failures are logged and swallowed:
    /// the registry already holds the truth about the agent.
    pub(super) async fn persist(&self, call_id: &str, patch: CallPatch) {
        match self.call_store.update_call(call_id, patch).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!("💾 Call record {} not found; update dropped", call_id),
            Err(e) => {
                let ctx = ErrorContext::new("call_router", "update_call").with_detail("call_id", call_id);
                error!("💾 Call store write failed {}: {}", ctx, e);
            }
        }
    }

    pub(super) fn publish_call_update(&self, call_id: &str, status: CallStatus, agent_id: Option<AgentId>) {
        self.events.publish(PresenceEvent::CallUpdated {
            call_id: call_id.to_string(),
            status,
            agent_id,
        });
    }

    pub(super) fn publish_queue_update(&self, session: &CallSession, waiting: bool) {
        self.events.publish(PresenceEvent::QueueUpdated {
            queue_id: session.queue_id.clone(),
            call_id: session.call_id.clone(),
            waiting,
        });
    }

    /// Terminal transition: release the agent (idempotent), stop timers,
    /// persist the end and forget the call.
    pub(super) async fn finish(
        &self,
        session: &CallSession,
        st: &mut SessionState,
        status: CallStatus,
        reason: &str,
    ) -> RouteOutcome {
        let was_on_hold = st.state == CallState::Exhausted;
        session.cancelled.store(true, Ordering::SeqCst);

        if let Some(agent_id) = st.agent_id.clone() {
            if let Err(e) = self.coordinator.release_agent(&agent_id, Some(&session.call_id)).await {
                let ctx = ErrorContext::new("call_router", "release")
                    .with_detail("call_id", &session.call_id)
                    .with_detail("agent_id", &agent_id);
                error!("🔒 Could not release agent on call end {}: {}", ctx, e);
            }
        }

        st.state = CallState::Ended;
        st.ring_generation += 1;
        st.hold_generation += 1;

        self.persist(&session.call_id, CallPatch::new().status(status).ended(reason, Utc::now())).await;
        self.publish_call_update(&session.call_id, status, st.agent_id.clone());
        if was_on_hold {
            self.publish_queue_update(session, false);
        }

        self.sessions.remove(&session.call_id);
        RoutingCounters::bump(&self.counters.calls_ended);
        if st.connected_from_queue {
            info!("📴 Call {} ended: {} ({}, answered from hold)", session.call_id, status, reason);
        } else {
            info!("📴 Call {} ended: {} ({})", session.call_id, status, reason);
        }

        RouteOutcome::Ended {
            call_id: session.call_id.clone(),
            reason: reason.to_string(),
        }
    }
}
