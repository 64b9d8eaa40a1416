use std::time::Duration;

use shared::{
    domain::CaseId,
    error::{ErrorCode, ErrorInfo},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("case {0} not found")]
    NotFound(CaseId),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Stand-in for failures nobody anticipated (a panicking backend, a
    /// dropped task); the details go to the log, not to the user.
    pub fn unexpected() -> Self {
        Self::ServiceUnavailable("unexpected failure while processing the request".into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::ServiceUnavailable(_) => ErrorCode::ServiceUnavailable,
            Self::Timeout(_) => ErrorCode::Timeout,
        }
    }
}

impl From<&WorkflowError> for ErrorInfo {
    fn from(value: &WorkflowError) -> Self {
        ErrorInfo::new(value.code(), value.to_string())
    }
}

impl From<WorkflowError> for ErrorInfo {
    fn from(value: WorkflowError) -> Self {
        ErrorInfo::from(&value)
    }
}
