//! Core error handling module
//!
//! • One unified `thiserror` enum for the whole crate
//! • Stack-friendly payloads (`CompactString`)
//! • Preserves `std::io::ErrorKind` so per-attribute failure state can be
//!   cached on file entries without dragging the full error around

use std::io::{self, ErrorKind};

use compact_str::{CompactString, ToCompactString};
use thiserror::Error;

/// Convenient alias carrying our unified error type
pub type CoreResult<T> = Result<T, CoreError>;

/// Primary error enumeration (grouped by concern)
#[non_exhaustive] // allow adding variants without breaking callers
#[derive(Error, Debug)]
pub enum CoreError {
    // ────────────────────────────────────────────────────────────
    // Entity lifecycle
    // ────────────────────────────────────────────────────────────
    #[error("Not found: {0}")]
    NotFound(CompactString),

    #[error("Access denied: {0}")]
    AccessDenied(CompactString),

    // ────────────────────────────────────────────────────────────
    // I/O and cancellation
    // ────────────────────────────────────────────────────────────
    #[error("I/O failure: {kind:?}")]
    Io {
        kind: ErrorKind,
        #[source] // keep causal chain intact
        source: Box<io::Error>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // ────────────────────────────────────────────────────────────
    // Collaborator failures
    // ────────────────────────────────────────────────────────────
    #[error("Decode failed: {0}")]
    Decode(CompactString),

    #[error("Info provider {provider} failed: {message}")]
    Provider {
        provider: CompactString,
        message: CompactString,
    },

    // ────────────────────────────────────────────────────────────
    // Configuration
    // ────────────────────────────────────────────────────────────
    #[error("Config error: {0}")]
    Config(CompactString),

    // ────────────────────────────────────────────────────────────
    // Invalid state
    // ────────────────────────────────────────────────────────────
    #[error("Invalid state: {0}")]
    InvalidState(CompactString),
}

// ────────────────────────────────────────────────────────────────────────────
// Fast classification helpers
// ────────────────────────────────────────────────────────────────────────────
impl CoreError {
    /// True when the underlying entity disappeared between enumeration and
    /// query. Never retried; the file is marked gone instead.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { kind, .. } => *kind == ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Cancellation is never surfaced to observers as an error.
    #[inline]
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Collapse into an [`ErrorKind`] for compact per-attribute failure
    /// caching on file entries.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied(_) => ErrorKind::PermissionDenied,
            Self::Io { kind, .. } => *kind,
            Self::Cancelled => ErrorKind::Interrupted,
            _ => ErrorKind::Other,
        }
    }

    // ────────────────────────────────────────────────────────────
    // Lightweight smart-constructors
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::NotFound(CompactString::new(what.as_ref()))
    }

    #[inline]
    #[must_use]
    pub fn access_denied(what: impl AsRef<str>) -> Self {
        Self::AccessDenied(CompactString::new(what.as_ref()))
    }

    #[inline]
    #[must_use]
    pub fn decode(message: impl AsRef<str>) -> Self {
        Self::Decode(CompactString::new(message.as_ref()))
    }

    #[inline]
    #[must_use]
    pub fn provider(provider: &str, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider: CompactString::new(provider),
            message: message.to_compact_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn invalid_state(message: &str) -> Self {
        Self::InvalidState(CompactString::new(message))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loss-free mapping from std::io::Error
// ────────────────────────────────────────────────────────────────────────────
impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(CoreError::not_found("/x").is_not_found());

        let io_gone = CoreError::from(io::Error::new(ErrorKind::NotFound, "gone"));
        assert!(io_gone.is_not_found());

        let denied = CoreError::access_denied("/x");
        assert!(!denied.is_not_found());
        assert_eq!(denied.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_cancelled_is_not_a_failure_kind() {
        assert!(CoreError::Cancelled.is_cancelled());
        assert!(!CoreError::Cancelled.is_not_found());
    }
}
