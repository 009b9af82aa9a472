//! Error types for the brewsync engine.

use crate::{ConflictId, EntityId, OperationId};
use thiserror::Error;

/// All possible errors from the brewsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    // Lookup errors
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    // Operation errors
    #[error("operation on deleted entity: {0}")]
    OperationOnDeleted(EntityId),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::EntityNotFound("temp_1000_1".into());
        assert_eq!(err.to_string(), "entity not found: temp_1000_1");

        let err = Error::TypeMismatch {
            field: "recipe_id".into(),
            expected: "text".into(),
            got: "number".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch for field 'recipe_id': expected text, got number"
        );
    }
}
