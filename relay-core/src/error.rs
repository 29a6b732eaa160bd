use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse error category carried on the wire inside an [`ErrorDetail`].
///
/// Unknown variants received from a newer producer deserialise into
/// `Unsupported` rather than failing, so older consumers stay forward
/// compatible with new error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    NotFound,
    Validation,
    Timeout,
    ExternalService,
    Internal,
    Transport,
    #[serde(other)]
    Unsupported,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorType::NotFound => "NotFound",
            ErrorType::Validation => "Validation",
            ErrorType::Timeout => "Timeout",
            ErrorType::ExternalService => "ExternalService",
            ErrorType::Internal => "Internal",
            ErrorType::Unsupported => "Unsupported",
            ErrorType::Transport => "Transport",
        };
        write!(f, "{s}")
    }
}

/// Developer-facing error payload. Never contains secrets or PII — callers
/// outside the producing service observe this verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error_type: ErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl ErrorDetail {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            error_code: None,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: HashMap<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorType::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Transport, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Unsupported, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Internal, message)
    }

    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorType::ExternalService, message)
    }
}

/// Errors raised by `relay-core` itself — envelope construction and
/// (de)serialisation failures. Kept separate from [`ErrorDetail`], which is
/// wire data, not a Rust `Error` type.
#[derive(Debug)]
pub enum CoreError {
    /// `action_type` does not match the dotted `"<domain>.<entity>.<verb>"` format.
    InvalidActionType(String),
    /// The root invariant on `ActionResponse` (`success=true` iff `error=None`) was violated.
    InconsistentResponse,
    /// Deserialisation of a byte string into an envelope failed.
    Malformed(String),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidActionType(t) => {
                write!(f, "invalid action_type '{t}': must match <domain>.<entity>.<verb>")
            }
            CoreError::InconsistentResponse => {
                write!(f, "ActionResponse must have error present iff success=false")
            }
            CoreError::Malformed(msg) => write!(f, "malformed envelope: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<CoreError> for ErrorDetail {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidActionType(_) | CoreError::InconsistentResponse => {
                ErrorDetail::validation(err.to_string())
            }
            CoreError::Malformed(_) => ErrorDetail::validation(err.to_string()),
        }
    }
}
