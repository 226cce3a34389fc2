//! Error types for `lms-external-functions`.

use crate::schema::ParamKind;
use thiserror::Error;

/// Failure of a single external function call.
///
/// Validation variants are produced before the handler runs; the remaining variants are
/// produced by handlers (or by return-value cleaning) after external effects may already have
/// happened.
#[derive(Error, Debug)]
pub enum FunctionError {
    /// No function is registered under the requested name.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A required parameter was not supplied.
    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    /// A parameter value cannot be coerced to its declared kind.
    #[error("Invalid parameter value for '{name}': expected {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: ParamKind,
        got: String,
    },

    /// A parameter was supplied that the function does not declare.
    #[error("Unexpected parameter: {name}")]
    UnexpectedParameter { name: String },

    /// The requested record does not exist.
    #[error("Record not found: {what} {id}")]
    NotFound { what: &'static str, id: i64 },

    /// The data store is unreachable or the query failed.
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// The data store rejected a write.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Unexpected failure on the write path without a more specific cause.
    #[error("Operation error: {0}")]
    Operation(String),

    /// The handler returned a value that does not match its declared return shape.
    #[error("Invalid response value: {0}")]
    InvalidResponse(String),
}

impl FunctionError {
    /// Stable machine-readable error code, reported to callers alongside the message.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownFunction(_) => "unknownfunction",
            Self::MissingParameter { .. } => "missingparam",
            Self::TypeMismatch { .. } => "invalidparameter",
            Self::UnexpectedParameter { .. } => "unexpectedparam",
            Self::NotFound { .. } => "invalidrecord",
            Self::DataAccess(_) => "dmlreadexception",
            Self::Persistence(_) => "dmlwriteexception",
            Self::Operation(_) => "operationerror",
            Self::InvalidResponse(_) => "invalidresponse",
        }
    }

    /// Whether the caller can fix the failure by correcting the request.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. }
                | Self::TypeMismatch { .. }
                | Self::UnexpectedParameter { .. }
        )
    }
}

/// Failure to assemble a [`crate::registry::FunctionRegistry`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Two functions share a name (or a method name collides with another function's name).
    #[error("Duplicate function name '{0}'")]
    DuplicateName(String),

    /// A descriptor declares the same parameter twice.
    #[error("Duplicate parameter '{param}' in function '{function}'")]
    DuplicateParameter { function: String, param: String },
}

/// Result type alias for external function operations.
pub type Result<T> = std::result::Result<T, FunctionError>;

#[cfg(test)]
mod tests {
    use super::FunctionError;
    use crate::schema::ParamKind;

    #[test]
    fn validation_errors_are_flagged_as_caller_errors() {
        let missing = FunctionError::MissingParameter {
            name: "userid".to_string(),
        };
        let mismatch = FunctionError::TypeMismatch {
            name: "userid".to_string(),
            expected: ParamKind::Int,
            got: "\"abc\"".to_string(),
        };
        assert!(missing.is_validation());
        assert!(mismatch.is_validation());
        assert!(!FunctionError::DataAccess("down".to_string()).is_validation());
    }

    #[test]
    fn type_mismatch_message_names_field_and_kind() {
        let e = FunctionError::TypeMismatch {
            name: "courseid".to_string(),
            expected: ParamKind::Int,
            got: "\"x\"".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Invalid parameter value for 'courseid': expected int, got \"x\""
        );
        assert_eq!(e.error_code(), "invalidparameter");
    }
}
