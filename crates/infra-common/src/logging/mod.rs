/*!
Logging

Standardized logging for the call-center stack:

- Subscriber setup and configuration
- Contextual spans carrying component/operation metadata
*/

pub mod setup;
pub mod context;

pub use setup::{setup_logging, parse_log_level, log_welcome, LoggingConfig};
pub use context::{LogContext, with_context};
