//! Call flows: inbound routing, dial outcomes, ring timeouts, hangups and
//! outbound calls.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use callcenter_infra_common::{ErrorContext, LogContext};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tracing::{debug, error, info, warn, Instrument, Level};

use crate::agent::AgentId;
use crate::assignment::{AssignmentOutcome, AssignmentRequest};
use crate::error::{CallCenterError, Result};
use crate::presence::ClaimOutcome;
use crate::routing::RoutingStrategy;
use crate::store::{CallDirection, CallPatch, CallRecord, CallStatus};
use crate::telephony::DialOutcome;
use super::core::{CallRouter, CallSession, SessionState};
use super::types::{CallState, RouteOutcome, RoutingCounters, RoutingRequest};

impl CallRouter {
    /// Route a new inbound call: select, claim and ring an agent, or put the
    /// caller on hold when nobody is eligible.
    ///
    /// `Err` is reserved for malformed requests and capacity limits; lack of
    /// agents is [`RouteOutcome::OnHold`].
    pub async fn route_inbound(self: &Arc<Self>, request: RoutingRequest) -> Result<RouteOutcome> {
        self.validate_request(&request, CallDirection::Inbound)?;

        let queue_id = request.queue_id.clone()
            .unwrap_or_else(|| self.config.general.default_queue_id.clone());
        let (strategy, members) = self.queue_routing(&queue_id).await;

        let session = Arc::new(CallSession::new(&request, queue_id.clone(), strategy, members));
        self.track(&session)?;
        RoutingCounters::bump(&self.counters.calls_routed);

        let mut record = CallRecord::new(&request.call_id, &request.phone_number, CallDirection::Inbound);
        record.queue_id = Some(queue_id.clone());
        record.priority = session.requirements.priority;
        record.required_skills = request.required_skills.clone();
        if let Err(e) = self.call_store.create_call(record).await {
            let ctx = ErrorContext::new("call_router", "create_call").with_detail("call_id", &request.call_id);
            error!("💾 Could not persist new call {}: {}", ctx, e);
        }

        info!("📞 Routing inbound call {} from {} (queue {}, strategy {}, priority {})",
              request.call_id, request.phone_number, queue_id, strategy, session.requirements.priority);

        let span = LogContext::with_operation("call_router", "route_inbound")
            .with_field("call_id", request.call_id.as_str())
            .with_field("queue_id", queue_id.as_str())
            .span(Level::DEBUG);

        let mut st = session.state.lock().await;
        if st.state == CallState::Ended {
            // Caller hung up before selection started
            return Ok(RouteOutcome::Ignored { call_id: session.call_id.clone(), state: st.state });
        }
        st.state = CallState::Selecting;
        self.publish_call_update(&session.call_id, CallStatus::Queued, None);
        Ok(self.attempt_assignment(&session, &mut st).instrument(span).await)
    }

    /// Apply a provider-reported dial outcome to the call
    pub async fn on_dial_outcome(self: &Arc<Self>, call_id: &str, outcome: DialOutcome) -> Result<RouteOutcome> {
        let Some(session) = self.session(call_id) else {
            debug!("Dial outcome {} for unknown call {}", outcome, call_id);
            return Ok(RouteOutcome::NotFound { call_id: call_id.to_string() });
        };
        let mut st = session.state.lock().await;

        let result = match (&outcome, st.state) {
            (DialOutcome::Answered, CallState::Ringing) => self.mark_answered(&session, &mut st).await,
            (DialOutcome::Completed, CallState::Ringing | CallState::InProgress) => {
                self.finish(&session, &mut st, CallStatus::Completed, "completed").await
            }
            (DialOutcome::Completed, CallState::Exhausted) => {
                self.finish(&session, &mut st, CallStatus::Completed, "caller_hangup_in_queue").await
            }
            (failure, CallState::Ringing) if failure.is_device_failure() => {
                let reason = failure.to_string();
                self.fail_ringing_agent(&session, &mut st, &reason, device_failure_status(failure)).await
            }
            (DialOutcome::Unknown(status), CallState::Ringing) => {
                self.unrecognised_dial_outcome(&session, &mut st, status).await
            }
            (_, state) => {
                debug!("Ignoring dial outcome {} for call {} in state {}", outcome, call_id, state);
                RouteOutcome::Ignored { call_id: call_id.to_string(), state }
            }
        };
        Ok(result)
    }

    /// Caller hung up
    pub async fn hangup(self: &Arc<Self>, call_id: &str) -> Result<RouteOutcome> {
        self.end_by_caller(call_id).await
    }

    /// End the call from our side: hang up the provider leg, then release
    /// and persist as for any other ending.
    pub async fn terminate(self: &Arc<Self>, call_id: &str, reason: &str) -> Result<RouteOutcome> {
        let Some(session) = self.session(call_id) else {
            return Ok(RouteOutcome::NotFound { call_id: call_id.to_string() });
        };
        session.cancelled.store(true, Ordering::SeqCst);
        let mut st = session.state.lock().await;
        if st.state == CallState::Ended {
            return Ok(RouteOutcome::Ignored { call_id: call_id.to_string(), state: st.state });
        }

        if let Err(e) = self.telephony.hangup(call_id).await {
            let ctx = ErrorContext::new("call_router", "hangup").with_detail("call_id", call_id);
            warn!("☎️ Provider hangup failed {}: {}", ctx, e);
        }
        Ok(self.finish(&session, &mut st, CallStatus::Completed, reason).await)
    }

    /// Place a call on behalf of an agent. The agent is claimed like any
    /// inbound assignment; a busy agent yields [`RouteOutcome::Rejected`].
    pub async fn route_outbound(self: &Arc<Self>, agent_id: &AgentId, request: RoutingRequest) -> Result<RouteOutcome> {
        let request = RoutingRequest { direction: CallDirection::Outbound, ..request };
        self.validate_request(&request, CallDirection::Outbound)?;

        let session = Arc::new(CallSession::new(&request, self.config.general.default_queue_id.clone(), RoutingStrategy::RoundRobin, None));
        self.track(&session)?;

        let rejection = match self.coordinator.claim_agent(agent_id, &request.call_id).await {
            Ok(ClaimOutcome::Claimed(_)) => None,
            Ok(ClaimOutcome::Conflict(conflict)) => {
                debug!("Outbound claim of {} refused: {:?}", agent_id, conflict);
                Some("agent_unavailable".to_string())
            }
            Ok(ClaimOutcome::NotFound) => Some("agent_not_found".to_string()),
            Err(e) => {
                self.sessions.remove(&request.call_id);
                return Err(e);
            }
        };
        if let Some(reason) = rejection {
            self.sessions.remove(&request.call_id);
            info!("🚫 Outbound call {} for agent {} rejected: {}", request.call_id, agent_id, reason);
            return Ok(RouteOutcome::Rejected { call_id: request.call_id, reason });
        }

        let mut st = session.state.lock().await;
        if st.state == CallState::Ended {
            // Hung up while the claim was in flight; nothing else holds the agent
            info!("🚫 Outbound call {} ended before dialing; releasing agent {}", request.call_id, agent_id);
            if let Err(e) = self.coordinator.release_agent(agent_id, Some(&request.call_id)).await {
                let ctx = ErrorContext::new("call_router", "release")
                    .with_detail("call_id", &request.call_id)
                    .with_detail("agent_id", agent_id);
                error!("🔒 Could not release agent for abandoned outbound call {}: {}", ctx, e);
            }
            return Ok(RouteOutcome::Ignored { call_id: request.call_id, state: st.state });
        }

        RoutingCounters::bump(&self.counters.outbound_calls);
        let mut record = CallRecord::new(&request.call_id, &request.phone_number, CallDirection::Outbound);
        record.status = CallStatus::Ringing;
        record.agent_id = Some(agent_id.clone());
        if let Err(e) = self.call_store.create_call(record).await {
            let ctx = ErrorContext::new("call_router", "create_call")
                .with_detail("call_id", &request.call_id)
                .with_detail("agent_id", agent_id);
            error!("💾 Could not persist outbound call {}: {}", ctx, e);
        }

        st.agent_id = Some(agent_id.clone());
        if session.is_cancelled() {
            // A hangup is queued behind this lock
            return Ok(self.finish(&session, &mut st, CallStatus::Canceled, "caller_hangup").await);
        }
        st.state = CallState::Ringing;
        st.ring_generation += 1;
        self.publish_call_update(&session.call_id, CallStatus::Ringing, Some(agent_id.clone()));

        if let Err(e) = self.telephony.connect(agent_id, &request.phone_number, &request.call_id).await {
            let ctx = ErrorContext::new("call_router", "connect")
                .with_detail("call_id", &request.call_id)
                .with_detail("agent_id", agent_id);
            error!("☎️ Outbound dial failed {}: {}", ctx, e);
            self.finish(&session, &mut st, CallStatus::Failed, "connect_failed").await;
            return Err(e);
        }

        info!("📤 Outbound call {} from agent {} to {}", request.call_id, agent_id, request.phone_number);
        self.arm_ring_timeout(&session.call_id, st.ring_generation);
        Ok(RouteOutcome::Ringing {
            call_id: request.call_id,
            agent_id: agent_id.clone(),
            strategy: None,
        })
    }

    /// Selection loop shared by new calls, retries and hold re-checks.
    ///
    /// Each pass runs one coordinator round. A ring that fails at the
    /// provider excludes the agent and loops; the loop ends on a ringing
    /// agent, hold, or cancellation.
    pub(super) async fn attempt_assignment(self: &Arc<Self>, session: &Arc<CallSession>, st: &mut SessionState) -> RouteOutcome {
        loop {
            if session.is_cancelled() {
                return self.finish(session, st, CallStatus::Canceled, "caller_hangup").await;
            }
            let from_hold = st.state == CallState::Exhausted;
            if !from_hold {
                st.state = CallState::Selecting;
            }

            let excluded = st.attempt.excluded_agent_ids.clone();
            let request = AssignmentRequest {
                call_id: &session.call_id,
                phone_number: &session.phone_number,
                queue_id: Some(&session.queue_id),
                requirements: &session.requirements,
                strategy: session.strategy,
                queue_members: session.queue_members.as_deref(),
                excluded: &excluded,
                cancelled: Some(&session.cancelled),
            };

            let outcome = match self.coordinator.assign(request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let ctx = ErrorContext::new("call_router", "assign").with_detail("call_id", &session.call_id);
                    error!("❌ Agent selection failed {}: {}", ctx, e);
                    st.attempt.note_failure("selection_failed");
                    return self.hold_unless_holding(session, st).await;
                }
            };
            RoutingCounters::add(&self.counters.claim_conflicts, u64::from(outcome.conflicts()));

            let (agent_id, strategy) = match outcome {
                AssignmentOutcome::Assigned { agent, strategy, .. } => (agent.agent_id, strategy),
                AssignmentOutcome::NoAgentAvailable { .. } => return self.hold_unless_holding(session, st).await,
                AssignmentOutcome::Cancelled { .. } => {
                    return self.finish(session, st, CallStatus::Canceled, "caller_hangup").await;
                }
            };

            st.state = CallState::Ringing;
            st.agent_id = Some(agent_id.clone());
            st.ring_generation += 1;
            RoutingCounters::bump(&self.counters.calls_assigned);

            let mut patch = CallPatch::new().status(CallStatus::Ringing).agent(Some(agent_id.clone()));
            if from_hold {
                st.connected_from_queue = true;
                patch = patch.from_queue();
                RoutingCounters::bump(&self.counters.connected_from_hold);
                self.publish_queue_update(session, false);
                info!("📤 Call {} leaves hold for agent {}", session.call_id, agent_id);
            }
            self.persist(&session.call_id, patch).await;
            self.publish_call_update(&session.call_id, CallStatus::Ringing, Some(agent_id.clone()));

            match self.telephony.ring(&agent_id, &session.call_id).await {
                Ok(()) => {
                    self.arm_ring_timeout(&session.call_id, st.ring_generation);
                    return RouteOutcome::Ringing {
                        call_id: session.call_id.clone(),
                        agent_id,
                        strategy: Some(strategy),
                    };
                }
                Err(e) => {
                    let ctx = ErrorContext::new("call_router", "ring")
                        .with_detail("call_id", &session.call_id)
                        .with_detail("agent_id", &agent_id);
                    error!("☎️ Ringing agent failed {}: {}", ctx, e);
                    RoutingCounters::bump(&self.counters.dial_failures);
                    self.exclude_failed_agent(session, st, &agent_id, "ring_failed").await;
                }
            }
        }
    }

    /// Dial-failure path for the agent currently ringing.
    ///
    /// Inbound calls move on to the next eligible agent; outbound calls end,
    /// since only the originating agent can place them.
    pub(super) async fn fail_ringing_agent(
        self: &Arc<Self>,
        session: &Arc<CallSession>,
        st: &mut SessionState,
        reason: &str,
        status: CallStatus,
    ) -> RouteOutcome {
        let Some(agent_id) = st.agent_id.clone() else {
            return RouteOutcome::Ignored { call_id: session.call_id.clone(), state: st.state };
        };
        RoutingCounters::bump(&self.counters.dial_failures);

        if session.direction == CallDirection::Outbound {
            return self.finish(session, st, status, reason).await;
        }

        self.exclude_failed_agent(session, st, &agent_id, reason).await;

        if let Err(e) = self.telephony.say(&session.call_id, &self.config.ringing.retry_message).await {
            debug!("Retry announcement for {} failed: {}", session.call_id, e);
        }
        self.attempt_assignment(session, st).await
    }

    /// Release + exclude, and record the failure on the call
    async fn exclude_failed_agent(&self, session: &CallSession, st: &mut SessionState, agent_id: &AgentId, reason: &str) {
        if let Err(e) = self.coordinator.handle_dial_failure(&mut st.attempt, agent_id, reason).await {
            let ctx = ErrorContext::new("call_router", "release")
                .with_detail("call_id", &session.call_id)
                .with_detail("agent_id", agent_id);
            error!("🔒 Could not release failed agent {}: {}", ctx, e);
        }
        st.agent_id = None;
        st.state = CallState::Selecting;
        st.ring_generation += 1;

        let patch = CallPatch::new()
            .agent(None)
            .failures(st.attempt.excluded_agent_ids.clone(), st.attempt.retry_count, st.attempt.last_failure_reason.clone());
        self.persist(&session.call_id, patch).await;
    }

    /// A status we cannot interpret is not the agent's fault: release it
    /// without excluding and hold the caller.
    async fn unrecognised_dial_outcome(self: &Arc<Self>, session: &Arc<CallSession>, st: &mut SessionState, status: &str) -> RouteOutcome {
        warn!("❓ Unrecognised dial status '{}' for call {}", status, session.call_id);
        if let Some(agent_id) = st.agent_id.take() {
            if let Err(e) = self.coordinator.release_agent(&agent_id, Some(&session.call_id)).await {
                let ctx = ErrorContext::new("call_router", "release")
                    .with_detail("call_id", &session.call_id)
                    .with_detail("agent_id", &agent_id);
                error!("🔒 Could not release agent {}: {}", ctx, e);
            }
        }
        st.attempt.note_failure(status);
        st.ring_generation += 1;
        self.persist(&session.call_id, CallPatch::new().agent(None).failure_reason(status)).await;
        self.enter_hold(session, st).await
    }

    async fn mark_answered(&self, session: &CallSession, st: &mut SessionState) -> RouteOutcome {
        let Some(agent_id) = st.agent_id.clone() else {
            return RouteOutcome::Ignored { call_id: session.call_id.clone(), state: st.state };
        };
        st.state = CallState::InProgress;
        st.ring_generation += 1;

        self.persist(&session.call_id, CallPatch::new().status(CallStatus::InProgress).answered_at(Utc::now())).await;
        self.publish_call_update(&session.call_id, CallStatus::InProgress, Some(agent_id.clone()));
        info!("✅ Agent {} answered call {}", agent_id, session.call_id);

        RouteOutcome::Connected {
            call_id: session.call_id.clone(),
            agent_id,
        }
    }

    pub(super) async fn end_by_caller(self: &Arc<Self>, call_id: &str) -> Result<RouteOutcome> {
        let Some(session) = self.session(call_id) else {
            return Ok(RouteOutcome::NotFound { call_id: call_id.to_string() });
        };
        session.cancelled.store(true, Ordering::SeqCst);
        let mut st = session.state.lock().await;

        let (status, reason) = match st.state {
            CallState::Ended => {
                return Ok(RouteOutcome::Ignored { call_id: call_id.to_string(), state: st.state });
            }
            CallState::InProgress => (CallStatus::Completed, "completed"),
            CallState::Exhausted => (CallStatus::Completed, "caller_hangup_in_queue"),
            _ => (CallStatus::Canceled, "caller_hangup"),
        };
        Ok(self.finish(&session, &mut st, status, reason).await)
    }

    /// Start the no-answer timer for the current offer
    pub(super) fn arm_ring_timeout(self: &Arc<Self>, call_id: &str, generation: u64) {
        let router = Arc::clone(self);
        let call_id = call_id.to_string();
        let timeout = self.config.ringing.ring_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            router.on_ring_timeout(&call_id, generation).await;
        });
    }

    async fn on_ring_timeout(self: &Arc<Self>, call_id: &str, generation: u64) -> RouteOutcome {
        let Some(session) = self.session(call_id) else {
            return RouteOutcome::NotFound { call_id: call_id.to_string() };
        };
        let mut st = session.state.lock().await;
        if st.state != CallState::Ringing || st.ring_generation != generation {
            return RouteOutcome::Ignored { call_id: call_id.to_string(), state: st.state };
        }

        warn!("⏰ Agent {:?} did not answer call {} within {}s",
              st.agent_id, call_id, self.config.ringing.ring_timeout_secs);
        self.fail_ringing_agent(&session, &mut st, "ring_timeout", CallStatus::NoAnswer).await
    }

    fn validate_request(&self, request: &RoutingRequest, direction: CallDirection) -> Result<()> {
        if request.call_id.trim().is_empty() {
            return Err(CallCenterError::invalid_input("call_id cannot be empty"));
        }
        if request.phone_number.trim().is_empty() {
            return Err(CallCenterError::invalid_input("phone_number cannot be empty"));
        }
        if request.priority > 10 {
            return Err(CallCenterError::invalid_input(format!("priority {} outside 0-10", request.priority)));
        }
        if request.direction != direction {
            return Err(CallCenterError::invalid_input(format!(
                "call {} has direction {:?}, expected {:?}", request.call_id, request.direction, direction
            )));
        }
        Ok(())
    }

    /// Register the session, refusing duplicates and enforcing capacity
    fn track(&self, session: &Arc<CallSession>) -> Result<()> {
        if self.sessions.len() >= self.config.general.max_concurrent_calls {
            return Err(CallCenterError::routing(format!(
                "capacity of {} concurrent calls reached", self.config.general.max_concurrent_calls
            )));
        }
        match self.sessions.entry(session.call_id.clone()) {
            Entry::Occupied(_) => Err(CallCenterError::invalid_input(format!(
                "call {} is already being routed", session.call_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    /// Strategy and members for a queue; unknown or unreadable queues fall
    /// back to the configured default strategy over every agent.
    async fn queue_routing(&self, queue_id: &str) -> (RoutingStrategy, Option<Vec<AgentId>>) {
        let fallback = self.config.routing.default_strategy;
        match self.queue_store.get_queue(queue_id).await {
            Ok(Some(queue)) => {
                let members = if queue.members.is_empty() { None } else { Some(queue.member_ids()) };
                (queue.strategy, members)
            }
            Ok(None) => {
                debug!("Queue {} not defined; using {}", queue_id, fallback);
                (fallback, None)
            }
            Err(e) => {
                let ctx = ErrorContext::new("call_router", "get_queue").with_detail("queue_id", queue_id);
                error!("📋 Queue lookup failed {}: {}", ctx, e);
                (fallback, None)
            }
        }
    }
}

fn device_failure_status(outcome: &DialOutcome) -> CallStatus {
    match outcome {
        DialOutcome::Busy => CallStatus::Busy,
        DialOutcome::NoAnswer => CallStatus::NoAnswer,
        DialOutcome::Canceled => CallStatus::Canceled,
        _ => CallStatus::Failed,
    }
}
