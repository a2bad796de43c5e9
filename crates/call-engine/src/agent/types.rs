//! Core types for agent management

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent status enumeration
///
/// Only `Available` agents are offered calls. `Busy` is set by a successful
/// claim and cleared by release; the others are chosen by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Agent is available for calls
    Available,

    /// Agent is on a call
    Busy,

    /// Agent is on a break
    Break,

    /// Agent is offline
    Offline,
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "available" => Ok(AgentStatus::Available),
            "busy" => Ok(AgentStatus::Busy),
            "break" => Ok(AgentStatus::Break),
            "offline" => Ok(AgentStatus::Offline),
            _ => Err(format!("Unknown agent status: {}", s)),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Available => write!(f, "available"),
            AgentStatus::Busy => write!(f, "busy"),
            AgentStatus::Break => write!(f, "break"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Agent identifier type for strongly-typed agent references
///
/// This is the stable external identifier (the softphone identity), not any
/// internal user id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        AgentId(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId(s.to_string())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Connected-user role, used to address role broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Supervisor,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Supervisor => write!(f, "supervisor"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// A named skill with a proficiency level on a 1-5 scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub skill: String,
    pub level: u8,
}

impl AgentSkill {
    pub fn new(skill: impl Into<String>, level: u8) -> Self {
        Self {
            skill: skill.into(),
            level: level.clamp(1, 5),
        }
    }
}

/// Routing-relevant profile data carried with an agent's session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Skills with proficiency
    pub skills: Vec<AgentSkill>,

    /// Customer satisfaction score (typically 0-5), if rated
    pub satisfaction_score: Option<f64>,
}

impl AgentProfile {
    pub fn with_skill(mut self, skill: impl Into<String>, level: u8) -> Self {
        self.skills.push(AgentSkill::new(skill, level));
        self
    }

    pub fn with_satisfaction(mut self, score: f64) -> Self {
        self.satisfaction_score = Some(score);
        self
    }

    /// Level of `skill`, if the agent has it
    pub fn skill_level(&self, skill: &str) -> Option<u8> {
        self.skills.iter().find(|s| s.skill == skill).map(|s| s.level)
    }
}

/// Metadata stored with a live agent session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Opaque handle to the agent's live connection (socket id, device contact)
    pub session_ref: String,

    /// Role the session authenticated as
    pub role: Role,

    /// Skills and performance data used by the selector
    pub profile: AgentProfile,
}

impl SessionMeta {
    pub fn new(session_ref: impl Into<String>) -> Self {
        Self {
            session_ref: session_ref.into(),
            role: Role::Agent,
            profile: AgentProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: AgentProfile) -> Self {
        self.profile = profile;
        self
    }
}

/// Point-in-time view of one agent's presence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPresence {
    pub agent_id: AgentId,
    pub status: AgentStatus,

    /// In the available set and not on a call, at the time of the read
    pub is_available: bool,

    pub current_call_id: Option<String>,
    pub current_calls: u32,
    pub total_calls: u64,

    /// `None` until the first assignment; sorts before any timestamp
    pub last_assigned_at: Option<DateTime<Utc>>,

    pub connected_at: DateTime<Utc>,
    pub session: SessionMeta,
}
