use crate::errors::types::Error;
use std::fmt;

/// Where a failure happened: component, operation and free-form details
/// (call and agent identifiers, usually).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Component where the error occurred
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional context information
    pub details: Vec<(String, String)>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: Vec::new(),
        }
    }

    /// Attach a key/value detail such as `call_id=...`
    pub fn with_detail<K: Into<String>, V: fmt::Display>(mut self, key: K, value: V) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in component '{}' during operation '{}'", self.component, self.operation)?;
        if !self.details.is_empty() {
            let joined = self.details
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({})", joined)?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors
pub trait ErrorExt {
    /// Add context to an error
    fn context(self, ctx: ErrorContext) -> Error;

    /// Add simple context with component and operation
    fn with_context<S: Into<String>, T: Into<String>>(self, component: S, operation: T) -> Error;
}

impl ErrorExt for Error {
    fn context(self, ctx: ErrorContext) -> Error {
        match self {
            Error::Custom(msg) => Error::Custom(format!("{} [{}]", msg, ctx)),
            Error::Internal(msg) => Error::Internal(format!("{} [{}]", msg, ctx)),
            other => Error::Custom(format!("{} [{}]", other, ctx)),
        }
    }

    fn with_context<S: Into<String>, T: Into<String>>(self, component: S, operation: T) -> Error {
        self.context(ErrorContext::new(component, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display_lists_details_in_order() {
        let ctx = ErrorContext::new("coordinator", "try_claim")
            .with_detail("call_id", "c-1")
            .with_detail("agent_id", "A1");
        assert_eq!(
            ctx.to_string(),
            "in component 'coordinator' during operation 'try_claim' (call_id=c-1, agent_id=A1)"
        );
    }

    #[test]
    fn test_context_wraps_internal_error() {
        let err = Error::Internal("boom".to_string()).with_context("router", "hangup");
        match err {
            Error::Internal(msg) => assert!(msg.contains("router") && msg.contains("boom")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_context_converts_other_errors_to_custom() {
        let err = Error::Config("bad".to_string()).with_context("config", "load");
        assert!(matches!(err, Error::Custom(ref m) if m.starts_with("Configuration error: bad")));
    }
}
