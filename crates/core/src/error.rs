//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only: validation, invariants, conflicts.
/// Storage and transport failures are modelled in `spadesk-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// One or more input values failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A business rule was violated (e.g. insufficient stock, overpayment).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The addressed record does not exist (or is soft-deleted).
    #[error("not found")]
    NotFound,

    /// Duplicate record or stale version.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Collapse several validation messages into one error.
    ///
    /// Messages are joined with `", "` so callers see every problem at once.
    pub fn validation_all<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = messages
            .into_iter()
            .map(|m| m.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::Validation(joined)
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_all_joins_messages_in_order() {
        let err = DomainError::validation_all(["name is required", "email is invalid"]);
        assert_eq!(
            err,
            DomainError::Validation("name is required, email is invalid".to_string())
        );
    }
}
