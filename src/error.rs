//! Error taxonomy for the benchmarking engine.
//!
//! Backend failures carry an explicit transient/permanent kind so retry
//! logic can decide whether another attempt is worthwhile. Failures scoped
//! to a single batch, query, or sweep factor are recorded in the
//! corresponding result entry and never propagate past their loop; only
//! configuration violations and zero-success runs surface as [`Error`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Backend errors
// ============================================================================

/// Retry classification of a backend failure.
///
/// Anything the client cannot positively classify as permanent is reported
/// as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Timeout, connection reset, backend overload.
    Transient,
    /// Malformed payload, authorization failure, missing collection, quota.
    Permanent,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::Transient => write!(f, "transient"),
            BackendErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// A failure reported by (or on behalf of) the vector-search backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind} backend error: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    /// A failure worth retrying.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Transient,
            message: message.into(),
        }
    }

    /// A failure no retry can fix.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == BackendErrorKind::Transient
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == BackendErrorKind::Permanent
    }
}

// ============================================================================
// Engine errors
// ============================================================================

/// Errors raised by engine components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input or configuration. Fatal, raised immediately, never
    /// retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A backend failure surfaced outside the per-item isolation loops,
    /// e.g. from direct collection-lifecycle calls.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Every query in a measurement run failed.
    #[error("all {attempted} queries against '{collection}' failed")]
    AllQueriesFailed { collection: String, attempted: usize },

    /// Strict-mode upload in which not a single batch succeeded.
    #[error("all {batches} upload batches for '{collection}' failed")]
    AllBatchesFailed { collection: String, batches: usize },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_kinds() {
        let t = BackendError::transient("connection reset");
        assert!(t.is_transient());
        assert!(!t.is_permanent());

        let p = BackendError::permanent("collection not found");
        assert!(p.is_permanent());
        assert!(!p.is_transient());
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::transient("request timed out");
        assert_eq!(err.to_string(), "transient backend error: request timed out");

        let err = BackendError::permanent("bad payload");
        assert_eq!(err.to_string(), "permanent backend error: bad payload");
    }

    #[test]
    fn test_engine_error_display() {
        let err = Error::config("batch_size must be >= 1");
        assert_eq!(
            err.to_string(),
            "invalid configuration: batch_size must be >= 1"
        );

        let err = Error::AllQueriesFailed {
            collection: "docs".to_string(),
            attempted: 5,
        };
        assert_eq!(err.to_string(), "all 5 queries against 'docs' failed");
    }

    #[test]
    fn test_backend_error_converts() {
        fn fails() -> Result<()> {
            Err(BackendError::permanent("unauthorized"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(Error::Backend(_))));
    }

    #[test]
    fn test_backend_error_serializes() {
        let err = BackendError::transient("busy");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"transient\""));
        let back: BackendError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
