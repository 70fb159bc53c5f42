//! Service-level error, mapped from domain and store failures.

use thiserror::Error;

use proforma_core::DomainError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input or missing reference data; never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A computed invoice broke an engine invariant; blocks finalization.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Sequence allocation kept conflicting; the caller may retry.
    #[error("sequence allocation failed after {attempts} attempt(s): {reason}")]
    AllocationFailed { attempts: u32, reason: String },

    #[error("sequence exhausted for {key}: {value} does not fit {width} digit(s)")]
    SequenceExhausted { key: String, value: u64, width: u8 },

    /// Persisting or loading failed for a reason other than contention.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl EngineError {
    /// Whether repeating the whole request may succeed.
    ///
    /// A duplicate number or id stays a duplicate however often it is retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::AllocationFailed { .. } | EngineError::Store(StoreError::Conflict(_))
        )
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::ConsistencyViolation(msg) => EngineError::ConsistencyViolation(msg),
            DomainError::AllocationConflict(reason) => {
                EngineError::AllocationFailed { attempts: 1, reason }
            }
            DomainError::AllocationFailed { attempts, reason } => {
                EngineError::AllocationFailed { attempts, reason }
            }
            DomainError::SequenceExhausted { key, value, width } => {
                EngineError::SequenceExhausted { key, value, width }
            }
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(err) => err.into(),
            other => EngineError::Store(other),
        }
    }
}
