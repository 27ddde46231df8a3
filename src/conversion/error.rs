//! # Conversion Error Types

use thiserror::Error;

/// Longest stderr excerpt carried in error messages
const STDERR_TAIL_CHARS: usize = 512;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to spawn converter '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("Converter {stream} stream error: {message}")]
    StreamIo { stream: String, message: String },

    #[error("Conversion failed with exit code {exit_code}: {stderr_tail}")]
    ConversionFailed {
        exit_code: i32,
        captured_stdout_lines: Vec<String>,
        captured_stderr: String,
        stderr_tail: String,
    },

    #[error("Conversion timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

impl ConversionError {
    /// Create a spawn error
    pub fn spawn(program: impl Into<String>, message: impl ToString) -> Self {
        Self::Spawn {
            program: program.into(),
            message: message.to_string(),
        }
    }

    /// Create a stream I/O error
    pub fn stream_io(stream: impl Into<String>, message: impl ToString) -> Self {
        Self::StreamIo {
            stream: stream.into(),
            message: message.to_string(),
        }
    }

    /// Create a conversion failure carrying everything the child produced
    pub fn conversion_failed(
        exit_code: i32,
        captured_stdout_lines: Vec<String>,
        captured_stderr: String,
    ) -> Self {
        let stderr_tail = tail(&captured_stderr, STDERR_TAIL_CHARS);
        Self::ConversionFailed {
            exit_code,
            captured_stdout_lines,
            captured_stderr,
            stderr_tail,
        }
    }

    /// Create a timeout error
    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::TimedOut { timeout_ms }
    }

    /// Exit code of the child, when it ran to completion
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ConversionFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim_end();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let skip = count - max_chars;
    format!("...{}", trimmed.chars().skip(skip).collect::<String>())
}
