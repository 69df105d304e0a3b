//! Error types for the type system
//!
//! This module defines the error taxonomy shared by every layer of the
//! workspace. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Errors are classified by *kind*, not by the component that raised them:
//!
//! | Kind | Meaning |
//! |------|---------|
//! | argument-required | a mandatory value was absent |
//! | argument-invalid | a value violates a structural contract |
//! | argument-invalid-type | a value has the wrong runtime shape |
//! | operation-invalid | a valid request made at the wrong time, or with no valid result |
//! | user | a domain conversion failure, surfaced verbatim |
//!
//! Errors are `Clone` so that a failure captured once (for example, the
//! terminal error of a lazily created instance) can be re-surfaced on every
//! later access.

use thiserror::Error;

/// Result type alias for type system operations
pub type Result<T> = std::result::Result<T, Error>;

/// Discriminant of [`Error`], convenient for matching and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A mandatory value was absent
    ArgumentRequired,
    /// A value violates a structural contract
    ArgumentInvalid,
    /// A value has the wrong runtime shape
    ArgumentInvalidType,
    /// The operation is not valid in the current state
    OperationInvalid,
    /// Domain-specific, user-facing failure
    User,
}

/// Error types for the type system
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// A mandatory argument was absent (null, empty or missing)
    #[error("Required argument '{name}' was not specified")]
    ArgumentRequired {
        /// Name of the argument
        name: String,
    },

    /// An argument violates a structural contract
    #[error("Argument '{name}' is invalid: {reason}")]
    ArgumentInvalid {
        /// Name of the argument
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// An argument has the wrong runtime shape or type
    #[error("Argument '{name}' is of an invalid type: expected {expected}")]
    ArgumentInvalidType {
        /// Name of the argument
        name: String,
        /// Description of the accepted types
        expected: String,
    },

    /// The operation is invalid in the current state
    #[error("Operation invalid: {0}")]
    OperationInvalid(String),

    /// User-facing error, propagated verbatim
    #[error("{0}")]
    User(String),
}

impl Error {
    /// Create an argument-required error
    pub fn argument_required(name: impl Into<String>) -> Self {
        Error::ArgumentRequired { name: name.into() }
    }

    /// Create an argument-invalid error
    pub fn argument_invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ArgumentInvalid {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an argument-invalid-type error
    pub fn argument_invalid_type(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Error::ArgumentInvalidType {
            name: name.into(),
            expected: expected.into(),
        }
    }

    /// Create an operation-invalid error
    pub fn operation_invalid(reason: impl Into<String>) -> Self {
        Error::OperationInvalid(reason.into())
    }

    /// Create a user error
    pub fn user(message: impl Into<String>) -> Self {
        Error::User(message.into())
    }

    /// The kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ArgumentRequired { .. } => ErrorKind::ArgumentRequired,
            Error::ArgumentInvalid { .. } => ErrorKind::ArgumentInvalid,
            Error::ArgumentInvalidType { .. } => ErrorKind::ArgumentInvalidType,
            Error::OperationInvalid(_) => ErrorKind::OperationInvalid,
            Error::User(_) => ErrorKind::User,
        }
    }

    /// Whether this error is of the given kind
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}
