//! Error taxonomy for inference backends and per-unit failures.
//!
//! | Variant | Retried | Effect |
//! |---------|---------|--------|
//! | `Throttled` | yes, with backoff | surfaced after the retry ceiling |
//! | `Timeout` | yes, with backoff | surfaced after the retry ceiling |
//! | `Malformed` | no | the unit (chunk, iteration) fails |
//! | `Rejected` | no | the unit fails |
//! | `Fatal` | no | the whole run halts |

use serde::Serialize;
use thiserror::Error;

/// Failure of a single call to a completion or embedding backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend throttled the request: {0}")]
    Throttled(String),

    #[error("backend timed out: {0}")]
    Timeout(String),

    #[error("malformed backend response: {0}")]
    Malformed(String),

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("fatal backend error: {0}")]
    Fatal(String),
}

impl BackendError {
    /// Throttling and timeouts are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Throttled(_) | BackendError::Timeout(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Fatal(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::Throttled(_) => FailureKind::Throttled,
            BackendError::Timeout(_) => FailureKind::Timeout,
            BackendError::Malformed(_) => FailureKind::Malformed,
            BackendError::Rejected(_) => FailureKind::Rejected,
            BackendError::Fatal(_) => FailureKind::Fatal,
        }
    }
}

/// Classification attached to every recorded unit failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Throttled,
    Timeout,
    Malformed,
    Rejected,
    Fatal,
    ScannerIo,
    Store,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Throttled => "throttled",
            FailureKind::Timeout => "timeout",
            FailureKind::Malformed => "malformed",
            FailureKind::Rejected => "rejected",
            FailureKind::Fatal => "fatal",
            FailureKind::ScannerIo => "scanner_io",
            FailureKind::Store => "store",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Throttled("429".into()).is_retryable());
        assert!(BackendError::Timeout("slow".into()).is_retryable());
        assert!(!BackendError::Malformed("bad json".into()).is_retryable());
        assert!(!BackendError::Fatal("no key".into()).is_retryable());
        assert!(BackendError::Fatal("no key".into()).is_fatal());
        assert_eq!(
            BackendError::Malformed("x".into()).kind(),
            FailureKind::Malformed
        );
    }
}
