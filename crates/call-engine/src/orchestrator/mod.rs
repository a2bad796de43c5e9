//! # Call Routing Orchestration
//!
//! [`CallRouter`] drives each call through its routing state machine and is
//! the single entry point for everything that happens to a call or an agent:
//!
//! | Input                        | Method                                        |
//! |------------------------------|-----------------------------------------------|
//! | new inbound call             | [`CallRouter::route_inbound`]                 |
//! | agent places a call          | [`CallRouter::route_outbound`]                |
//! | provider dial status         | [`CallRouter::on_dial_outcome`]               |
//! | caller hangs up              | [`CallRouter::hangup`]                        |
//! | caller gives up on hold      | [`CallRouter::on_queue_abandoned`]            |
//! | re-check a held call now     | [`CallRouter::on_hold_tick`]                  |
//! | agent connects / leaves      | [`CallRouter::agent_connected`] / [`CallRouter::agent_disconnected`] |
//! | agent changes status         | [`CallRouter::agent_status_update`]           |
//! | agent finishes a call        | [`CallRouter::agent_call_ended`]              |
//!
//! ## Guarantees
//!
//! - An agent is offered at most one call at a time: offers only go out
//!   after a successful registry claim.
//! - Every path out of `ringing` or `in_progress` releases the claimed agent,
//!   and releasing twice is harmless.
//! - An agent that failed a call (busy, no answer, device failure, ring
//!   timeout, disconnect) is never offered that call again.
//! - Running out of agents puts the caller on hold; it is not an error.
//!
//! Ring timeouts and hold re-checks run as background tasks that carry a
//! generation number, so a timer that outlives its offer does nothing.
//!
//! ## Example
//!
//! ```
//! use callcenter_call_engine::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let router = CallRouter::builder(CallCenterConfig::default()).build().unwrap();
//! router.agent_connected(&AgentId::from("alice"), SessionMeta::new("ws-1")).await.unwrap();
//!
//! let outcome = router.route_inbound(RoutingRequest::inbound("call-1", "+15550100")).await.unwrap();
//! assert_eq!(outcome.agent_id(), Some(&AgentId::from("alice")));
//!
//! let outcome = router.on_dial_outcome("call-1", DialOutcome::Answered).await.unwrap();
//! assert_eq!(outcome.state(), Some(CallState::InProgress));
//! # });
//! ```

mod agents;
mod builder;
mod calls;
mod core;
mod hold;
pub mod types;

pub use builder::CallRouterBuilder;
pub use self::core::CallRouter;
pub use types::{CallState, RouteOutcome, RoutingRequest, RoutingStats};
