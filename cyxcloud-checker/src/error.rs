//! Error types for the repair checker
//!
//! Composes the module-local error enums into one `CheckerError`, the
//! same way `cyxcloud_core::error::CyxCloudError` composes its
//! subsystem errors.

use thiserror::Error;

/// Result type alias for checker operations
pub type Result<T> = std::result::Result<T, CheckerError>;

/// Unified error type for the repair checker
#[derive(Error, Debug)]
pub enum CheckerError {
    // ===== Reliability cache =====
    #[error("overlay unavailable: {0}")]
    OverlayUnavailable(String),

    #[error("reliability cache has no participating nodes")]
    NoNodes,

    // ===== Redundancy policy =====
    #[error("invalid redundancy override: {0}")]
    InvalidOverride(String),

    // ===== Classifier =====
    #[error("classifier internal error: {0}")]
    ClassifierInternal(String),

    // ===== Repair queue =====
    #[error("repair queue unavailable: {0}")]
    QueueUnavailable(String),

    // ===== Segment source =====
    #[error("segment source error: {0}")]
    SegmentSource(String),

    // ===== Cancellation =====
    #[error("iteration cancelled")]
    Cancelled,

    // ===== Configuration =====
    #[error("configuration error: {0}")]
    Configuration(String),

    // ===== Generic =====
    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckerError {
    /// Whether this error should abort the whole iteration (vs. just
    /// the segment or Partial that raised it).
    pub fn aborts_iteration(&self) -> bool {
        matches!(
            self,
            CheckerError::OverlayUnavailable(_)
                | CheckerError::NoNodes
                | CheckerError::QueueUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CheckerError::NoNodes;
        assert_eq!(err.to_string(), "reliability cache has no participating nodes");
    }

    #[test]
    fn test_aborts_iteration() {
        assert!(CheckerError::NoNodes.aborts_iteration());
        assert!(CheckerError::OverlayUnavailable("x".into()).aborts_iteration());
        assert!(!CheckerError::ClassifierInternal("x".into()).aborts_iteration());
    }
}
