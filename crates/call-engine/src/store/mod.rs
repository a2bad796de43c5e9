//! # External Stores
//!
//! Narrow persistence interfaces the router depends on, with in-memory
//! implementations for the simulator and tests. Production deployments plug
//! their document store in behind [`CallStore`] and [`QueueStore`].

pub mod calls;
pub mod queues;

pub use calls::{CallDirection, CallPatch, CallRecord, CallStatus, CallStore, InMemoryCallStore};
pub use queues::{InMemoryQueueStore, QueueDefinition, QueueMember, QueueStore};
