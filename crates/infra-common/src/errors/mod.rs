/*!
Error Handling

Standardized error types for the call-center stack:

- Common error type
- Error context utilities
*/

pub mod types;
mod context;

pub use types::{Error, Result};
pub use context::{ErrorContext, ErrorExt};
