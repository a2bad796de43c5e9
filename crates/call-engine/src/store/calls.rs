//! # Call Store
//!
//! Persistence contract for call records. The router writes status,
//! assignment and retry history here; a failed write is logged by the caller
//! and never rolls back a claim already committed in the presence registry.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::AgentId;
use crate::error::{CallCenterError, Result};

/// Provider-facing call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

impl CallStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Busy | CallStatus::Failed | CallStatus::NoAnswer | CallStatus::Canceled
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Queued => "queued",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Busy => "busy",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Persisted call record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub phone_number: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub queue_id: Option<String>,
    pub agent_id: Option<AgentId>,
    pub priority: u8,
    pub required_skills: Vec<String>,

    /// Agents that failed to answer this call, in order
    pub failed_agents: Vec<AgentId>,
    pub retry_count: u32,
    pub last_failure_reason: Option<String>,

    /// Call was put on hold at least once
    pub fallback_to_queue: bool,
    /// Call reached an agent after waiting on hold
    pub connected_from_queue: bool,

    pub end_reason: Option<String>,
    pub start_time: DateTime<Utc>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CallRecord {
    pub fn new(call_id: impl Into<String>, phone_number: impl Into<String>, direction: CallDirection) -> Self {
        Self {
            call_id: call_id.into(),
            phone_number: phone_number.into(),
            direction,
            status: CallStatus::Queued,
            queue_id: None,
            agent_id: None,
            priority: 0,
            required_skills: Vec::new(),
            failed_agents: Vec::new(),
            retry_count: 0,
            last_failure_reason: None,
            fallback_to_queue: false,
            connected_from_queue: false,
            end_reason: None,
            start_time: Utc::now(),
            answer_time: None,
            end_time: None,
        }
    }

    /// Duration in whole seconds, once the call has ended
    pub fn duration_secs(&self) -> Option<i64> {
        self.end_time.map(|end| (end - self.start_time).num_seconds())
    }
}

/// Partial update of a [`CallRecord`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallPatch {
    pub status: Option<CallStatus>,
    /// `Some(None)` clears the assigned agent
    pub agent_id: Option<Option<AgentId>>,
    pub failed_agents: Option<Vec<AgentId>>,
    pub retry_count: Option<u32>,
    pub last_failure_reason: Option<String>,
    pub fallback_to_queue: Option<bool>,
    pub connected_from_queue: Option<bool>,
    pub end_reason: Option<String>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CallPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: CallStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn agent(mut self, agent_id: Option<AgentId>) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn failures(mut self, failed_agents: Vec<AgentId>, retry_count: u32, reason: Option<String>) -> Self {
        self.failed_agents = Some(failed_agents);
        self.retry_count = Some(retry_count);
        self.last_failure_reason = reason;
        self
    }

    pub fn failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.last_failure_reason = Some(reason.into());
        self
    }

    pub fn on_hold(mut self) -> Self {
        self.fallback_to_queue = Some(true);
        self
    }

    pub fn from_queue(mut self) -> Self {
        self.connected_from_queue = Some(true);
        self
    }

    pub fn answered_at(mut self, at: DateTime<Utc>) -> Self {
        self.answer_time = Some(at);
        self
    }

    pub fn ended(mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.end_reason = Some(reason.into());
        self.end_time = Some(at);
        self
    }

    pub fn apply(self, record: &mut CallRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(agent_id) = self.agent_id {
            record.agent_id = agent_id;
        }
        if let Some(failed) = self.failed_agents {
            record.failed_agents = failed;
        }
        if let Some(retry_count) = self.retry_count {
            record.retry_count = retry_count;
        }
        if let Some(reason) = self.last_failure_reason {
            record.last_failure_reason = Some(reason);
        }
        if let Some(flag) = self.fallback_to_queue {
            record.fallback_to_queue = flag;
        }
        if let Some(flag) = self.connected_from_queue {
            record.connected_from_queue = flag;
        }
        if let Some(reason) = self.end_reason {
            record.end_reason = Some(reason);
        }
        if let Some(at) = self.answer_time {
            record.answer_time = Some(at);
        }
        if let Some(at) = self.end_time {
            record.end_time = Some(at);
        }
    }
}

/// Call persistence
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Insert a new record; an existing `call_id` is an `InvalidInput` error
    async fn create_call(&self, record: CallRecord) -> Result<()>;

    /// Apply `patch`; `Ok(None)` when the call is unknown
    async fn update_call(&self, call_id: &str, patch: CallPatch) -> Result<Option<CallRecord>>;

    async fn find_call(&self, call_id: &str) -> Result<Option<CallRecord>>;
}

/// DashMap-backed [`CallStore`].
///
/// `set_failing(true)` turns every operation into a store error, which is how
/// tests exercise the "log and keep routing" path.
#[derive(Debug, Default)]
pub struct InMemoryCallStore {
    calls: DashMap<String, CallRecord>,
    failing: AtomicBool,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CallCenterError::store(operation, "store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn create_call(&self, record: CallRecord) -> Result<()> {
        self.check("create_call")?;
        if self.calls.contains_key(&record.call_id) {
            return Err(CallCenterError::invalid_input(format!("call {} already exists", record.call_id)));
        }
        debug!("💾 Stored call {} ({})", record.call_id, record.status);
        self.calls.insert(record.call_id.clone(), record);
        Ok(())
    }

    async fn update_call(&self, call_id: &str, patch: CallPatch) -> Result<Option<CallRecord>> {
        self.check("update_call")?;
        Ok(self.calls.get_mut(call_id).map(|mut entry| {
            patch.apply(entry.value_mut());
            entry.value().clone()
        }))
    }

    async fn find_call(&self, call_id: &str) -> Result<Option<CallRecord>> {
        self.check("find_call")?;
        Ok(self.calls.get(call_id).map(|entry| entry.value().clone()))
    }
}
