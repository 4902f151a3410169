//! Error types for the protocol crate.

use crate::entity::EntityKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building plans or parsing protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An entity kind was placed before one of its dependencies.
    #[error("invalid sync order: {entity} must come after {dependency}")]
    InvalidOrder {
        /// The misplaced entity kind.
        entity: EntityKind,
        /// The dependency it must follow.
        dependency: EntityKind,
    },

    /// An entity kind appears more than once in a plan.
    #[error("entity {0} listed more than once")]
    DuplicateEntity(EntityKind),

    /// A name did not match any entity kind.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// A savings transaction type other than deposit or withdrawal.
    #[error("invalid transaction type: {0}")]
    InvalidTransactionType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::InvalidOrder {
            entity: EntityKind::Expense,
            dependency: EntityKind::Budget,
        };
        assert_eq!(
            err.to_string(),
            "invalid sync order: expenses must come after budgets"
        );

        let err = ProtocolError::UnknownEntity("invoices".into());
        assert!(err.to_string().contains("invoices"));
    }
}
