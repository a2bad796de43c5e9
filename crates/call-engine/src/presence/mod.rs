//! # Agent Presence
//!
//! The shared record of which agents are connected, which are free to take a
//! call, and which are already on one. Every routing decision reads from here
//! and every assignment is committed here through
//! [`PresenceRegistry::try_claim`].

pub mod memory;
pub mod registry;

pub use memory::InMemoryPresenceRegistry;
pub use registry::{
    AgentSummary, ClaimOutcome, ConflictReason, PresenceRegistry, PresenceStats, RegistryOutcome,
    ReleaseOutcome,
};
