//! Agent management module
//!
//! Identity, status and profile types for call-center agents. Live presence
//! (who is online, who is on a call) is owned by [`crate::presence`].

pub mod types;

pub use types::{AgentId, AgentPresence, AgentProfile, AgentSkill, AgentStatus, Role, SessionMeta};
