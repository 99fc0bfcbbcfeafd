//! Error type shared by every layer of the engine.
//!
//! Resource exhaustion and the format or I/O problems of a single
//! dictionary stay inside the engine: the dictionary concerned contributes
//! no candidates and the problem is logged. Caller-contract violations
//! ([`RkError::InvalidArgument`], [`RkError::NotFound`],
//! [`RkError::PermissionDenied`], ...) are returned unchanged.
//! [`RkError::Inconsistent`] reports broken session bookkeeping; the session
//! that hit it is reset.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type RkResult<T> = Result<T, RkError>;

#[derive(Debug, Error)]
pub enum RkError {
    #[error("I/O Error: {0}")]
    IoError(#[from] io::Error),

    #[error("Parse Error: {0}")]
    ParseError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Internal inconsistency: {0}")]
    Inconsistent(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RkError {
    /// Shorthand for building a [`RkError::ParseError`] from anything printable.
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        RkError::ParseError(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RkError::InvalidArgument(msg.into())
    }

    /// `true` for errors that belong to one dictionary only and must not
    /// abort a conversion.
    pub fn is_backend_local(&self) -> bool {
        matches!(
            self,
            RkError::IoError(_) | RkError::ParseError(_) | RkError::ResourceExhausted(_)
        )
    }
}

impl From<serde_cbor::Error> for RkError {
    fn from(err: serde_cbor::Error) -> Self {
        RkError::ParseError(err.to_string())
    }
}

impl From<serde_json::Error> for RkError {
    fn from(err: serde_json::Error) -> Self {
        RkError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_local_classification() {
        assert!(RkError::parse("bad magic").is_backend_local());
        assert!(RkError::from(io::Error::new(io::ErrorKind::Other, "x")).is_backend_local());
        assert!(!RkError::invalid("range").is_backend_local());
        assert!(!RkError::Inconsistent("sum".into()).is_backend_local());
    }

    #[test]
    fn display_keeps_prefix() {
        let e = RkError::parse("truncated record");
        assert_eq!(e.to_string(), "Parse Error: truncated record");
    }
}
