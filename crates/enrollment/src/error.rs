use thiserror::Error;

use campus_core::{Credits, DomainError, SectionId};

/// Outcome of a rejected ledger operation.
///
/// Every variant is a distinct outcome callers act on differently, so none of
/// them may be folded into a generic failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("section {section_id} is full (capacity {capacity})")]
    CapacityExceeded { section_id: SectionId, capacity: u32 },

    #[error("student is already enrolled in this section")]
    DuplicateEnrollment,

    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits { balance: Credits, required: Credits },

    /// Course or section data is malformed (missing section, non-positive
    /// price or capacity).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(String),

    /// No account could be resolved to receive a refund.
    #[error("no account found to refund for this enrollment")]
    RefundTargetMissing,

    /// Retryable infrastructure failure; nothing was persisted.
    #[error("transient store error: {0}")]
    TransientStore(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl LedgerError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::CapacityExceeded { .. } => "capacity_exceeded",
            LedgerError::DuplicateEnrollment => "duplicate_enrollment",
            LedgerError::InsufficientCredits { .. } => "insufficient_credits",
            LedgerError::Configuration(_) => "configuration_error",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::RefundTargetMissing => "refund_target_missing",
            LedgerError::TransientStore(_) => "transient_store_error",
            LedgerError::Validation(_) => "validation_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransientStore(_))
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        LedgerError::NotFound(entity.into())
    }
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LedgerError::Validation(msg)
            }
            DomainError::NotFound(entity) => LedgerError::NotFound(entity.to_string()),
            DomainError::Conflict(msg) | DomainError::InvariantViolation(msg) => {
                LedgerError::Configuration(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            LedgerError::CapacityExceeded {
                section_id: SectionId::new(),
                capacity: 1,
            },
            LedgerError::DuplicateEnrollment,
            LedgerError::InsufficientCredits {
                balance: Credits::ZERO,
                required: Credits::ZERO,
            },
            LedgerError::Configuration(String::new()),
            LedgerError::not_found("enrollment"),
            LedgerError::RefundTargetMissing,
            LedgerError::TransientStore(String::new()),
            LedgerError::Validation(String::new()),
        ];
        let mut codes: Vec<_> = errors.iter().map(LedgerError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(LedgerError::TransientStore("pool timed out".into()).is_retryable());
        assert!(!LedgerError::DuplicateEnrollment.is_retryable());
    }
}
