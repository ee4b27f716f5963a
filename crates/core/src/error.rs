//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the inventory core.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant carries enough context to render a precise message to the
/// caller. Insufficient stock and state conflicts are business outcomes and are
/// never retried automatically; only `Contention` originates from the storage
/// layer giving up on its bounded retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An unknown product, inventory record, lot, session or count record.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested quantity exceeds what is available.
    #[error("insufficient stock (requested: {requested}, available: {available})")]
    InsufficientStock { requested: Decimal, available: Decimal },

    /// The operation is not allowed in the current state (negative quantity,
    /// over-release, session already closed, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A conflicting resource already exists (e.g. an in-progress session).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Concurrent writers kept invalidating the read set; retries exhausted.
    #[error("contention: {0}")]
    Contention(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn insufficient(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn contention(msg: impl Into<String>) -> Self {
        Self::Contention(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_carries_both_quantities() {
        let err = DomainError::insufficient(Decimal::from(20), Decimal::from(10));
        assert_eq!(
            err.to_string(),
            "insufficient stock (requested: 20, available: 10)"
        );
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let err = DomainError::not_found("session", "abc");
        assert_eq!(err.to_string(), "session not found: abc");
    }
}
