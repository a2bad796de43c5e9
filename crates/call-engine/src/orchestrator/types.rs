//! Shared types of the call router.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::routing::{CallRequirements, RoutingStrategy};
use crate::store::CallDirection;

/// Routing state of one call
///
/// ```text
/// new ─▶ selecting ─▶ ringing ─▶ in_progress ─▶ ended
///            ▲  │         │
///            └──┼─────────┘ device failure (agent excluded)
///               ▼
///           exhausted (on hold, periodic re-check) ─▶ ringing
/// ```
///
/// `ended` is reachable from every other state through hangup or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    New,
    Selecting,
    Ringing,
    InProgress,
    Exhausted,
    Ended,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::New => "new",
            CallState::Selecting => "selecting",
            CallState::Ringing => "ringing",
            CallState::InProgress => "in_progress",
            CallState::Exhausted => "exhausted",
            CallState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Per-call input from whoever hands the call to the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub call_id: String,
    pub phone_number: String,
    pub direction: CallDirection,
    #[serde(default)]
    pub required_skills: Vec<String>,
    /// 0-10
    #[serde(default)]
    pub priority: u8,
    /// Defaults to the configured queue
    #[serde(default)]
    pub queue_id: Option<String>,
}

impl RoutingRequest {
    pub fn inbound(call_id: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            phone_number: phone_number.into(),
            direction: CallDirection::Inbound,
            required_skills: Vec::new(),
            priority: 0,
            queue_id: None,
        }
    }

    pub fn outbound(call_id: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            direction: CallDirection::Outbound,
            ..Self::inbound(call_id, phone_number)
        }
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.required_skills.push(skill.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_queue(mut self, queue_id: impl Into<String>) -> Self {
        self.queue_id = Some(queue_id.into());
        self
    }

    pub fn requirements(&self) -> CallRequirements {
        CallRequirements {
            required_skills: self.required_skills.clone(),
            priority: self.priority.min(10),
        }
    }
}

/// What a router operation did to the call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Offered to an agent; waiting for the dial outcome
    Ringing {
        call_id: String,
        agent_id: AgentId,
        /// `None` for outbound calls, which are not selected
        strategy: Option<RoutingStrategy>,
    },
    Connected {
        call_id: String,
        agent_id: AgentId,
    },
    /// No eligible agent; the caller hears hold treatment
    OnHold {
        call_id: String,
        excluded: Vec<AgentId>,
    },
    Ended {
        call_id: String,
        reason: String,
    },
    /// Outbound call refused before anything was dialled
    Rejected {
        call_id: String,
        reason: String,
    },
    /// Event did not apply to the call's current state
    Ignored {
        call_id: String,
        state: CallState,
    },
    NotFound {
        call_id: String,
    },
}

impl RouteOutcome {
    /// State the call is in after the operation, when known
    pub fn state(&self) -> Option<CallState> {
        match self {
            RouteOutcome::Ringing { .. } => Some(CallState::Ringing),
            RouteOutcome::Connected { .. } => Some(CallState::InProgress),
            RouteOutcome::OnHold { .. } => Some(CallState::Exhausted),
            RouteOutcome::Ended { .. } => Some(CallState::Ended),
            RouteOutcome::Ignored { state, .. } => Some(*state),
            RouteOutcome::Rejected { .. } | RouteOutcome::NotFound { .. } => None,
        }
    }

    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            RouteOutcome::Ringing { agent_id, .. } | RouteOutcome::Connected { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }
}

/// Router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub calls_routed: u64,
    pub calls_assigned: u64,
    pub claim_conflicts: u64,
    pub dial_failures: u64,
    pub calls_exhausted: u64,
    pub connected_from_hold: u64,
    pub outbound_calls: u64,
    pub calls_ended: u64,
    pub active_calls: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RoutingCounters {
    pub calls_routed: AtomicU64,
    pub calls_assigned: AtomicU64,
    pub claim_conflicts: AtomicU64,
    pub dial_failures: AtomicU64,
    pub calls_exhausted: AtomicU64,
    pub connected_from_hold: AtomicU64,
    pub outbound_calls: AtomicU64,
    pub calls_ended: AtomicU64,
}

impl RoutingCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_calls: u64) -> RoutingStats {
        RoutingStats {
            calls_routed: self.calls_routed.load(Ordering::Relaxed),
            calls_assigned: self.calls_assigned.load(Ordering::Relaxed),
            claim_conflicts: self.claim_conflicts.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            calls_exhausted: self.calls_exhausted.load(Ordering::Relaxed),
            connected_from_hold: self.connected_from_hold.load(Ordering::Relaxed),
            outbound_calls: self.outbound_calls.load(Ordering::Relaxed),
            calls_ended: self.calls_ended.load(Ordering::Relaxed),
            active_calls,
        }
    }
}
