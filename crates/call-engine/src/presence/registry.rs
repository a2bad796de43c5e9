//! The presence registry contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentPresence, AgentStatus, SessionMeta};
use crate::error::Result;

/// Why a claim did not go through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// The agent is already on a call
    AlreadyOnCall,
    /// The agent is not in the available set (break, offline, busy)
    NotAvailable,
    /// The record changed between the read and the commit
    ConcurrentModification,
    /// The agent disconnected between the read and the commit
    Deregistered,
}

/// Result of [`PresenceRegistry::try_claim`]
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The agent moved from available to on-call; carries the post-claim view
    Claimed(AgentPresence),
    /// The precondition no longer held; retry with another candidate
    Conflict(ConflictReason),
    /// No such agent
    NotFound,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

/// Result of [`PresenceRegistry::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Agent left the on-call set; `available` says whether it rejoined the pool
    Released { available: bool },
    /// Agent was not on a call (or not on the given one); only the counter floor applies
    NotOnCall,
    /// No such agent
    NotFound,
}

/// Result of register / deregister / status operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryOutcome {
    /// Fresh presence record created
    Registered,
    /// Existing record refreshed; counters preserved
    Reconnected,
    /// Presence record deleted; `current_call_id` is the call the agent held
    /// at removal, which the router must move on
    Deregistered { current_call_id: Option<String> },
    /// Status written
    StatusUpdated { previous: AgentStatus },
    /// No such agent
    NotFound,
}

/// Per-agent line of [`PresenceStats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    pub current_calls: u32,
    pub total_calls: u64,
    pub is_available: bool,
    pub is_on_call: bool,
}

/// Registry-wide statistics for supervisors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceStats {
    pub total_agents: usize,
    pub available_agents: usize,
    pub on_call_agents: usize,
    pub agents: Vec<AgentSummary>,
}

/// Shared store of "who can take a call right now".
///
/// Implementations must keep an agent in at most one of the available and
/// on-call sets, and make [`try_claim`](Self::try_claim) linearizable with
/// respect to every other mutation of the same agent. `try_claim` is the only
/// operation that may put an agent into the on-call set.
///
/// Every method may suspend (a networked store does I/O); `Err` is reserved
/// for backend failure. Unknown agents are reported through the outcome
/// enums, never as errors.
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Add the agent to the available set (unless on a call), storing `meta`.
    /// Counters start at zero for a new record and are kept on reconnect.
    async fn register_agent(&self, agent_id: &AgentId, meta: SessionMeta) -> Result<RegistryOutcome>;

    /// Remove the agent from both sets and delete its record.
    async fn deregister_agent(&self, agent_id: &AgentId) -> Result<RegistryOutcome>;

    /// `Available` rejoins the pool (never while on a call); any other status
    /// leaves it.
    async fn set_status(&self, agent_id: &AgentId, status: AgentStatus) -> Result<RegistryOutcome>;

    /// Agents in the available set and not on a call. Stale by the time it
    /// returns; only `try_claim` is authoritative.
    async fn snapshot_available(&self) -> Result<Vec<AgentPresence>>;

    /// Atomically move the agent from available to on-call for `call_id`,
    /// bumping `current_calls`, `total_calls` and `last_assigned_at`.
    async fn try_claim(&self, agent_id: &AgentId, call_id: &str) -> Result<ClaimOutcome>;

    /// Atomically take the agent off its call and decrement `current_calls`
    /// (floored at zero). The agent rejoins the pool only if its status is
    /// still `Busy`: an agent that went offline or on break stays out.
    ///
    /// With `call_id` set, an agent that is on a *different* call is left
    /// untouched.
    async fn release(&self, agent_id: &AgentId, call_id: Option<&str>) -> Result<ReleaseOutcome>;

    /// Current presence of one agent
    async fn get(&self, agent_id: &AgentId) -> Result<Option<AgentPresence>>;

    /// Totals and per-agent summaries
    async fn statistics(&self) -> Result<PresenceStats>;
}
