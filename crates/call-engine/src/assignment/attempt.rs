use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// Per-call record of agents already tried and failed.
///
/// An agent in `excluded_agent_ids` is never offered this call again, even
/// after it returns to the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAssignmentAttempt {
    pub call_id: String,
    pub excluded_agent_ids: Vec<AgentId>,
    pub retry_count: u32,
    pub last_failure_reason: Option<String>,
}

impl CallAssignmentAttempt {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ..Default::default()
        }
    }

    /// Record a failed offer. Returns `false` if the agent was already excluded.
    pub fn exclude(&mut self, agent_id: AgentId, reason: impl Into<String>) -> bool {
        self.last_failure_reason = Some(reason.into());
        if self.is_excluded(&agent_id) {
            return false;
        }
        self.excluded_agent_ids.push(agent_id);
        self.retry_count += 1;
        true
    }

    /// Record a failure not attributed to any agent
    pub fn note_failure(&mut self, reason: impl Into<String>) {
        self.last_failure_reason = Some(reason.into());
    }

    pub fn is_excluded(&self, agent_id: &AgentId) -> bool {
        self.excluded_agent_ids.contains(agent_id)
    }
}
