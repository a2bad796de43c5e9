//! Hold treatment for calls nobody could take.
//!
//! An exhausted call plays the hold message and is re-offered from a
//! background monitor whose interval doubles up to a ceiling. Callers held
//! longer than `max_hold_secs` get an apology and are hung up.

use std::sync::Arc;
use std::time::Duration;

use callcenter_infra_common::ErrorContext;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::store::{CallPatch, CallStatus};
use super::core::{CallRouter, CallSession, SessionState};
use super::types::{CallState, RouteOutcome, RoutingCounters};

impl CallRouter {
    /// Put the call on hold, or leave it there if it already is
    pub(super) async fn hold_unless_holding(self: &Arc<Self>, session: &Arc<CallSession>, st: &mut SessionState) -> RouteOutcome {
        if st.state == CallState::Exhausted {
            debug!("Call {} still has no eligible agent", session.call_id);
            return RouteOutcome::OnHold {
                call_id: session.call_id.clone(),
                excluded: st.attempt.excluded_agent_ids.clone(),
            };
        }
        self.enter_hold(session, st).await
    }

    pub(super) async fn enter_hold(self: &Arc<Self>, session: &Arc<CallSession>, st: &mut SessionState) -> RouteOutcome {
        st.state = CallState::Exhausted;
        st.agent_id = None;
        st.hold_started.get_or_insert_with(Instant::now);
        st.hold_generation += 1;
        RoutingCounters::bump(&self.counters.calls_exhausted);

        info!("⏸️ No agent for call {}; placing caller on hold ({} excluded)",
              session.call_id, st.attempt.excluded_agent_ids.len());

        self.persist(&session.call_id, CallPatch::new().status(CallStatus::Queued).agent(None).on_hold()).await;
        self.publish_call_update(&session.call_id, CallStatus::Queued, None);
        self.publish_queue_update(session, true);

        if let Err(e) = self.telephony.play_hold(&session.call_id, &self.config.hold.hold_message).await {
            let ctx = ErrorContext::new("call_router", "play_hold").with_detail("call_id", &session.call_id);
            error!("🎵 Hold treatment failed {}: {}", ctx, e);
            self.apologise_and_hang_up(&session.call_id).await;
            return self.finish(session, st, CallStatus::Failed, "backend_failure").await;
        }

        self.spawn_hold_monitor(&session.call_id, st.hold_generation);
        RouteOutcome::OnHold {
            call_id: session.call_id.clone(),
            excluded: st.attempt.excluded_agent_ids.clone(),
        }
    }

    /// Re-run selection for a held call now instead of waiting for the
    /// monitor, e.g. when an agent becomes available.
    pub async fn on_hold_tick(self: &Arc<Self>, call_id: &str) -> Result<RouteOutcome> {
        Ok(self.recheck_hold(call_id, None).await)
    }

    /// Caller gave up while waiting
    pub async fn on_queue_abandoned(self: &Arc<Self>, call_id: &str) -> Result<RouteOutcome> {
        self.end_by_caller(call_id).await
    }

    fn spawn_hold_monitor(self: &Arc<Self>, call_id: &str, generation: u64) {
        let router = Arc::clone(self);
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            router.hold_monitor(call_id, generation).await;
        });
    }

    async fn hold_monitor(self: Arc<Self>, call_id: String, generation: u64) {
        let mut interval = self.config.hold.recheck_interval();
        let ceiling = self.config.hold.max_recheck_interval();
        loop {
            tokio::time::sleep(interval).await;
            match self.recheck_hold(&call_id, Some(generation)).await {
                RouteOutcome::OnHold { .. } => {
                    interval = next_interval(interval, ceiling);
                    debug!("Call {} still on hold; next check in {:?}", call_id, interval);
                }
                outcome => {
                    debug!("Hold monitor for {} stopping: {:?}", call_id, outcome.state());
                    break;
                }
            }
        }
    }

    /// One re-check of a held call. With `generation` set, only the monitor
    /// of the current hold period acts.
    async fn recheck_hold(self: &Arc<Self>, call_id: &str, generation: Option<u64>) -> RouteOutcome {
        let Some(session) = self.session(call_id) else {
            return RouteOutcome::NotFound { call_id: call_id.to_string() };
        };
        let mut st = session.state.lock().await;
        if st.state != CallState::Exhausted || generation.is_some_and(|g| g != st.hold_generation) {
            return RouteOutcome::Ignored { call_id: call_id.to_string(), state: st.state };
        }

        let max_hold = self.config.hold.max_hold();
        let held_for = st.hold_started.map(|t| t.elapsed()).unwrap_or_default();
        if !max_hold.is_zero() && held_for >= max_hold {
            warn!("⌛ Call {} held for {:?}; giving up", call_id, held_for);
            self.apologise_and_hang_up(call_id).await;
            return self.finish(&session, &mut st, CallStatus::Completed, "hold_timeout").await;
        }

        self.attempt_assignment(&session, &mut st).await
    }

    /// Best effort: the call is ending either way
    async fn apologise_and_hang_up(&self, call_id: &str) {
        if let Err(e) = self.telephony.say(call_id, &self.config.hold.apology_message).await {
            debug!("Apology for {} not played: {}", call_id, e);
        }
        if let Err(e) = self.telephony.hangup(call_id).await {
            let ctx = ErrorContext::new("call_router", "hangup").with_detail("call_id", call_id);
            warn!("☎️ Provider hangup failed {}: {}", ctx, e);
        }
    }
}

fn next_interval(current: Duration, ceiling: Duration) -> Duration {
    (current * 2).min(ceiling)
}
