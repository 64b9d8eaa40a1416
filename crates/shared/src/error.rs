use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    ServiceUnavailable,
    Timeout,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::ServiceUnavailable => 503,
            Self::Timeout => 504,
        }
    }

    /// Maps a non-2xx status onto the error taxonomy. Anything unrecognised
    /// is reported as the service being unavailable.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 413 | 415 | 422 => Self::Validation,
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            _ => Self::ServiceUnavailable,
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::ServiceUnavailable | Self::Timeout)
    }
}

/// Error record shown to the user and carried in non-2xx response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}
