//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, state transitions). Infrastructure concerns belong elsewhere.
///
/// Propagation policy: transition and invariant errors always surface to the
/// caller and abort the operation. Collaborator failures (rendering, mail
/// delivery) are not part of this taxonomy; they are reported out-of-band and
/// never touch financial state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. a zero-amount payment).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A state-changing operation was invoked from a disallowed state.
    #[error("invalid transition: cannot {operation} from {from}")]
    InvalidTransition { from: String, operation: String },

    /// A domain invariant was violated. Programming-bug class: re-run the
    /// surrounding unit of work, do not attempt partial repair.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. duplicate payment fingerprint).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(from: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            operation: operation.into(),
        }
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
