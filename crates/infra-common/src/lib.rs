//! # Call-center infrastructure
//!
//! Shared plumbing for the call-center routing crates:
//!
//! - [`logging`]: subscriber setup and contextual log spans
//! - [`errors`]: the common error type and [`errors::ErrorContext`] used to
//!   annotate failures with the component and operation that produced them

pub mod errors;
pub mod logging;

pub use errors::{Error, ErrorContext, ErrorExt, Result};
pub use logging::{setup_logging, LogContext, LoggingConfig};
