//! # Agent Assignment
//!
//! The stateful half of routing: claims agents in the presence registry,
//! retries lost races against a shrinking candidate pool, and runs the
//! dial-failure path (release + exclusion) when a claimed agent does not
//! pick up.

pub mod attempt;
pub mod coordinator;

pub use attempt::CallAssignmentAttempt;
pub use coordinator::{AssignmentCoordinator, AssignmentOutcome, AssignmentRequest};
