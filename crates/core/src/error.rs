//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// consistency, allocation contention). Storage concerns belong in the infra
/// layer and are mapped onto these variants at the service boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (non-positive quantity, zero total volume,
    /// unknown delivery term, missing reference data, ...).
    ///
    /// Always reported to the caller, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A computed result broke one of the engine's own invariants (rounding
    /// reconciliation, item/invoice total divergence, arithmetic overflow).
    ///
    /// This is a defect: never corrected silently, always blocks finalization.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Transient contention on a sequence counter.
    #[error("allocation conflict: {0}")]
    AllocationConflict(String),

    /// Sequence allocation kept conflicting until the retry budget ran out.
    #[error("sequence allocation failed after {attempts} attempt(s): {reason}")]
    AllocationFailed { attempts: u32, reason: String },

    /// The counter for a key no longer fits the configured padding width.
    #[error("sequence exhausted for {key}: {value} does not fit {width} digit(s)")]
    SequenceExhausted { key: String, value: u64, width: u8 },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::ConsistencyViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::AllocationConflict(msg.into())
    }

    /// Whether a caller may retry the whole operation and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::AllocationConflict(_) | DomainError::AllocationFailed { .. }
        )
    }
}
