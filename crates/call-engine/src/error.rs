//! # Error Types for Call Routing
//!
//! Errors raised by the routing core. Claim races and candidate exhaustion are
//! *not* errors: they are returned as [`crate::presence::ClaimOutcome`] and
//! [`crate::assignment::AssignmentOutcome`] values. What remains here are
//! genuine failures (telephony, stores, configuration) and requests the
//! router refuses outright.

use thiserror::Error;

/// Call center engine errors
///
/// # Examples
///
/// ```
/// use callcenter_call_engine::{CallCenterError, Result};
///
/// fn dial() -> Result<()> {
///     Err(CallCenterError::backend("ring", "provider timeout"))
/// }
///
/// match dial() {
///     Err(CallCenterError::Backend { operation, .. }) => assert_eq!(operation, "ring"),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum CallCenterError {
    /// Telephony backend operation failed (network, provider timeout, rejected command)
    #[error("Telephony backend error during {operation}: {message}")]
    Backend {
        operation: String,
        message: String,
    },

    /// Call or queue store operation failed
    #[error("Store error during {operation}: {message}")]
    Store {
        operation: String,
        message: String,
    },

    /// Routing errors
    #[error("Routing error: {0}")]
    Routing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Infrastructure errors (logging setup, I/O)
    #[error(transparent)]
    Infra(#[from] callcenter_infra_common::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallCenterError {
    /// Create a new telephony backend error
    pub fn backend<O: Into<String>, M: std::fmt::Display>(operation: O, message: M) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a new store error
    pub fn store<O: Into<String>, M: std::fmt::Display>(operation: O, message: M) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a new Routing error
    pub fn routing<S: Into<String>>(msg: S) -> Self {
        Self::Routing(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Backend and store failures are worth another routing attempt;
    /// everything else is a caller mistake or a broken deployment.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Store { .. })
    }
}

impl From<toml::de::Error> for CallCenterError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for call center operations
pub type Result<T> = std::result::Result<T, CallCenterError>;
