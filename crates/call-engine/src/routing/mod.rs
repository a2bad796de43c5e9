//! # Call Routing Module
//!
//! Decides which agent an incoming call should be offered to. The module is
//! deliberately side-effect free: it receives a snapshot of available agents
//! and returns a [`RoutingDecision`]. Claiming the chosen agent is the job of
//! [`crate::assignment`].
//!
//! ## Strategies
//!
//! | Strategy       | Rule                                                                 |
//! |----------------|----------------------------------------------------------------------|
//! | `round_robin`  | fewest `total_calls`, then oldest `last_assigned_at`, then id        |
//! | `skills_based` | holds every required skill at the minimum level; highest level sum   |
//! | `weighted`     | `base + satisfaction * bonus - current_calls * penalty`, highest     |
//! | `priority`     | high priority → `weighted`, medium → `skills_based`, else round robin |
//!
//! `skills_based` falls back to `round_robin` over the same candidates when
//! nobody qualifies, and scoring ties are always broken by the round robin
//! order.
//!
//! ## Example
//!
//! ```rust
//! use callcenter_call_engine::routing::{AgentSelector, CallRequirements, RoutingDecision, RoutingStrategy};
//!
//! let selector = AgentSelector::default();
//! let decision = selector.select(&[], &CallRequirements::new(), RoutingStrategy::RoundRobin, &[]);
//! assert_eq!(decision, RoutingDecision::NoAgentAvailable);
//! ```

pub mod selector;
pub mod strategy;

pub use selector::{fairness_order, AgentSelector};
pub use strategy::{CallRequirements, RoutingDecision, RoutingStrategy};
