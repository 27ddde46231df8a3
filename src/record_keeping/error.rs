//! # Record Keeping Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordKeepingError {
    #[error("Record keeping {operation} request failed: {message}")]
    Request { operation: String, message: String },

    #[error("Record keeping {operation} returned HTTP {status}: {body}")]
    HttpStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Record keeping {operation} timed out after {timeout_ms}ms")]
    TimedOut { operation: String, timeout_ms: u64 },

    #[error("Record keeping configuration error: {message}")]
    Configuration { message: String },
}

impl RecordKeepingError {
    pub fn request(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Request {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn http_status(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    pub fn timed_out(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::TimedOut {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
