//! Domain and registration error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// These are the expected, caller-recoverable outcomes a command handler reports
/// through a failure effect. Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant would be violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. blank entity id).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The addressed entity does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. entity already created).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
        }
    }
}

/// Configuration error detected while registering an entity type, view or consumer.
///
/// Registration errors are fatal for the component being brought online; they are
/// never produced while handling a command or replaying history.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("entity '{entity_type}': duplicate command handler for '{command_type}'")]
    DuplicateCommandHandler {
        entity_type: String,
        command_type: String,
    },

    #[error("entity '{entity_type}': duplicate event handler for '{event_type}'")]
    DuplicateEventHandler {
        entity_type: String,
        event_type: String,
    },

    #[error("entity '{entity_type}': no command handler registered for '{command_type}'")]
    MissingCommandHandler {
        entity_type: String,
        command_type: String,
    },

    #[error("entity '{entity_type}': no event handler registered for '{event_type}'")]
    MissingEventHandler {
        entity_type: String,
        event_type: String,
    },

    #[error("'{owner}': handler registered for undeclared message type '{message_type}'")]
    UndeclaredMessage { owner: String, message_type: String },

    #[error("entity type '{0}' is already registered")]
    DuplicateEntityType(String),

    #[error("table '{table}': duplicate update handler for '{entity_type}/{event_type}'")]
    DuplicateUpdateHandler {
        table: String,
        entity_type: String,
        event_type: String,
    },

    #[error("table '{0}' has no update handlers")]
    EmptyTable(String),

    #[error("view '{view}' already has a table named '{table}'")]
    DuplicateTable { view: String, table: String },

    #[error("view '{0}' is already registered")]
    DuplicateView(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(DomainError::validation("x").code(), "validation");
        assert_eq!(DomainError::invariant("x").code(), "invariant_violation");
        assert_eq!(DomainError::not_found("x").code(), "not_found");
        assert_eq!(DomainError::conflict("x").code(), "conflict");
        assert_eq!(DomainError::invalid_id("x").code(), "invalid_id");
    }

    #[test]
    fn messages_are_human_readable() {
        let err = DomainError::validation("Value must be a zero or a positive number");
        assert_eq!(
            err.to_string(),
            "validation failed: Value must be a zero or a positive number"
        );
    }
}
