//! # Transfer Error Types
//!
//! `ObjectNotFound` is kept distinct from every other fault so callers can tell
//! "not visible yet" apart from infrastructure trouble. Both are transient from
//! the consumer's point of view.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Transfer I/O error during {operation}: {message}")]
    TransferIo { operation: String, message: String },

    #[error("Scratch space unavailable under {path}: {message}")]
    ScratchSpace { path: String, message: String },
}

impl TransferError {
    /// Create an object not found error
    pub fn object_not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Create a transfer I/O error
    pub fn io(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::TransferIo {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a scratch space error
    pub fn scratch_space(path: impl Into<String>, message: impl ToString) -> Self {
        Self::ScratchSpace {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}
