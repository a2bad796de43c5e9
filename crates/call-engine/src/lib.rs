//! # Call-center routing core
//!
//! Decides which agent takes an incoming call and keeps agent presence
//! consistent while many calls are routed at once.
//!
//! ## Layout
//!
//! - [`presence`]: who is connected, available, or on a call; the only
//!   shared state, with an atomic claim operation
//! - [`routing`]: pure agent selection strategies over a presence snapshot
//! - [`assignment`]: the claim loop and dial-failure handling
//! - [`orchestrator`]: the per-call state machine ([`CallRouter`])
//! - [`events`]: presence/call events fanned out to agents and supervisors
//! - [`store`], [`telephony`]: contracts for call/queue persistence and the
//!   voice provider, with in-process implementations
//! - [`config`], [`error`]: configuration and the crate error type
//!
//! ## Quick start
//!
//! ```
//! use callcenter_call_engine::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let router = CallRouter::builder(CallCenterConfig::default()).build().unwrap();
//!
//! // Nobody is logged in yet: the caller is held, not rejected.
//! let outcome = router.route_inbound(RoutingRequest::inbound("call-1", "+15550100")).await.unwrap();
//! assert!(matches!(outcome, RouteOutcome::OnHold { .. }));
//! # });
//! ```

pub mod agent;
pub mod assignment;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod presence;
pub mod routing;
pub mod store;
pub mod telephony;

pub use config::CallCenterConfig;
pub use error::{CallCenterError, Result};
pub use orchestrator::{CallRouter, CallRouterBuilder, CallState, RouteOutcome, RoutingRequest, RoutingStats};

/// Commonly used types
pub mod prelude {
    pub use crate::agent::{AgentId, AgentPresence, AgentProfile, AgentStatus, Role, SessionMeta};
    pub use crate::assignment::{AssignmentCoordinator, AssignmentOutcome, CallAssignmentAttempt};
    pub use crate::config::CallCenterConfig;
    pub use crate::error::{CallCenterError, Result};
    pub use crate::events::{EventBus, EventEnvelope, NotificationChannel, PresenceEvent};
    pub use crate::orchestrator::{CallRouter, CallState, RouteOutcome, RoutingRequest, RoutingStats};
    pub use crate::presence::{ClaimOutcome, InMemoryPresenceRegistry, PresenceRegistry, ReleaseOutcome};
    pub use crate::routing::{AgentSelector, CallRequirements, RoutingDecision, RoutingStrategy};
    pub use crate::store::{CallStatus, CallStore, QueueDefinition, QueueMember, QueueStore};
    pub use crate::telephony::{DialOutcome, TelephonyBackend};
}
