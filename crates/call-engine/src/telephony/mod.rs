//! # Telephony Backend
//!
//! The router never speaks a signalling protocol itself. It asks a
//! [`TelephonyBackend`] to ring an agent, bridge an outbound call, play hold
//! treatment, or hang up, and learns how a dial went through
//! [`DialOutcome`]s the provider reports back asynchronously.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::AgentId;
use crate::error::{CallCenterError, Result};

/// Provider-reported result of ringing an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DialOutcome {
    Answered,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
    Completed,
    /// Anything the provider sends that we do not recognise
    Unknown(String),
}

impl DialOutcome {
    /// Map a provider status string (`"no-answer"`, `"in-progress"`, ...)
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "answered" | "in-progress" => DialOutcome::Answered,
            "busy" => DialOutcome::Busy,
            "no-answer" => DialOutcome::NoAnswer,
            "failed" => DialOutcome::Failed,
            "canceled" | "cancelled" => DialOutcome::Canceled,
            "completed" => DialOutcome::Completed,
            other => DialOutcome::Unknown(other.to_string()),
        }
    }

    /// The agent's device did not take the call
    pub fn is_device_failure(&self) -> bool {
        matches!(self, DialOutcome::Busy | DialOutcome::NoAnswer | DialOutcome::Failed | DialOutcome::Canceled)
    }
}

impl fmt::Display for DialOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialOutcome::Answered => f.write_str("answered"),
            DialOutcome::Busy => f.write_str("busy"),
            DialOutcome::NoAnswer => f.write_str("no-answer"),
            DialOutcome::Failed => f.write_str("failed"),
            DialOutcome::Canceled => f.write_str("canceled"),
            DialOutcome::Completed => f.write_str("completed"),
            DialOutcome::Unknown(s) => write!(f, "unknown:{}", s),
        }
    }
}

/// Call-leg control offered by the telephony provider
#[async_trait]
pub trait TelephonyBackend: Send + Sync {
    /// Offer the call to the agent's device
    async fn ring(&self, agent_id: &AgentId, call_id: &str) -> Result<()>;

    /// Bridge the agent to an external number (outbound)
    async fn connect(&self, agent_id: &AgentId, phone_number: &str, call_id: &str) -> Result<()>;

    async fn hangup(&self, call_id: &str) -> Result<()>;

    /// Announce `message` and start hold music
    async fn play_hold(&self, call_id: &str, message: &str) -> Result<()>;

    /// Announce `message` to the caller
    async fn say(&self, call_id: &str, message: &str) -> Result<()>;
}

/// A command recorded by [`LoopbackTelephony`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyCommand {
    Ring { agent_id: AgentId, call_id: String },
    Connect { agent_id: AgentId, phone_number: String, call_id: String },
    Hangup { call_id: String },
    PlayHold { call_id: String, message: String },
    Say { call_id: String, message: String },
}

/// Backend that records commands and succeeds, unless told otherwise
#[derive(Debug, Default)]
pub struct LoopbackTelephony {
    commands: Mutex<Vec<TelephonyCommand>>,
    unreachable_agents: Mutex<HashSet<AgentId>>,
    hold_broken: AtomicBool,
    connect_broken: AtomicBool,
}

impl LoopbackTelephony {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ring` fails for this agent
    pub fn make_unreachable(&self, agent_id: impl Into<AgentId>) {
        self.unreachable_agents.lock().insert(agent_id.into());
    }

    /// `play_hold` fails for every call
    pub fn break_hold(&self, broken: bool) {
        self.hold_broken.store(broken, Ordering::SeqCst);
    }

    /// `connect` fails for every call
    pub fn break_connect(&self, broken: bool) {
        self.connect_broken.store(broken, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<TelephonyCommand> {
        self.commands.lock().clone()
    }

    /// Agents rung for `call_id`, in order
    pub fn rings_for(&self, call_id: &str) -> Vec<AgentId> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                TelephonyCommand::Ring { agent_id, call_id: id } if id == call_id => Some(agent_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, command: TelephonyCommand) {
        debug!("☎️ {:?}", command);
        self.commands.lock().push(command);
    }
}

#[async_trait]
impl TelephonyBackend for LoopbackTelephony {
    async fn ring(&self, agent_id: &AgentId, call_id: &str) -> Result<()> {
        if self.unreachable_agents.lock().contains(agent_id) {
            return Err(CallCenterError::backend("ring", format!("agent {} unreachable", agent_id)));
        }
        self.record(TelephonyCommand::Ring {
            agent_id: agent_id.clone(),
            call_id: call_id.to_string(),
        });
        Ok(())
    }

    async fn connect(&self, agent_id: &AgentId, phone_number: &str, call_id: &str) -> Result<()> {
        if self.connect_broken.load(Ordering::SeqCst) {
            return Err(CallCenterError::backend("connect", "provider rejected dial"));
        }
        self.record(TelephonyCommand::Connect {
            agent_id: agent_id.clone(),
            phone_number: phone_number.to_string(),
            call_id: call_id.to_string(),
        });
        Ok(())
    }

    async fn hangup(&self, call_id: &str) -> Result<()> {
        self.record(TelephonyCommand::Hangup { call_id: call_id.to_string() });
        Ok(())
    }

    async fn play_hold(&self, call_id: &str, message: &str) -> Result<()> {
        if self.hold_broken.load(Ordering::SeqCst) {
            return Err(CallCenterError::backend("play_hold", "media server unavailable"));
        }
        self.record(TelephonyCommand::PlayHold {
            call_id: call_id.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn say(&self, call_id: &str, message: &str) -> Result<()> {
        self.record(TelephonyCommand::Say {
            call_id: call_id.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_statuses() {
        assert_eq!(DialOutcome::parse("no-answer"), DialOutcome::NoAnswer);
        assert_eq!(DialOutcome::parse("NO_ANSWER"), DialOutcome::NoAnswer);
        assert_eq!(DialOutcome::parse("in-progress"), DialOutcome::Answered);
        assert_eq!(DialOutcome::parse("cancelled"), DialOutcome::Canceled);
        assert_eq!(DialOutcome::parse("queued"), DialOutcome::Unknown("queued".into()));
        assert!(DialOutcome::Busy.is_device_failure());
        assert!(!DialOutcome::Unknown("x".into()).is_device_failure());
        assert!(!DialOutcome::Completed.is_device_failure());
    }

    #[tokio::test]
    async fn test_loopback_records_and_fails_on_request() {
        let telephony = LoopbackTelephony::new();
        telephony.ring(&AgentId::from("A1"), "c-1").await.unwrap();
        telephony.make_unreachable("B1");
        let err = telephony.ring(&AgentId::from("B1"), "c-1").await.unwrap_err();
        assert!(err.is_transient());

        assert_eq!(telephony.rings_for("c-1"), vec![AgentId::from("A1")]);
    }
}
