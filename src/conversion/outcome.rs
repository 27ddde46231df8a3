//! # Conversion Outcome
//!
//! What one converter invocation produced. Consumed immediately by the
//! consumer to decide acknowledgment; never persisted here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConversionError;

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutcome {
    /// Process exit code; `-1` when the child was terminated by a signal
    pub exit_code: i32,
    /// Standard output lines in the order they were produced
    pub captured_stdout_lines: Vec<String>,
    /// Standard error, captured whole and never interpreted
    pub captured_stderr: String,
    pub duration: Duration,
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Output lines that decode as [`ConvertedUnit`]s
    pub fn units(&self) -> Vec<ConvertedUnit> {
        self.captured_stdout_lines
            .iter()
            .filter_map(|line| ConvertedUnit::parse_line(line))
            .collect()
    }

    /// Turn a non-zero exit into [`ConversionError::ConversionFailed`]
    pub fn into_result(self) -> Result<Self, ConversionError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ConversionError::conversion_failed(
                self.exit_code,
                self.captured_stdout_lines,
                self.captured_stderr,
            ))
        }
    }
}

/// One unit of converted content reported by the converter
///
/// The converter prints one JSON object per discovered item, e.g.
/// `{"key": "Events", "class": "TTree"}`. Extra fields are preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedUnit {
    pub key: String,
    pub class: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConvertedUnit {
    /// Decode one output line; `None` for anything that is not a unit record
    pub fn parse_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(exit_code: i32, lines: &[&str]) -> ConversionOutcome {
        ConversionOutcome {
            exit_code,
            captured_stdout_lines: lines.iter().map(|l| l.to_string()).collect(),
            captured_stderr: String::new(),
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_units_skip_non_json_lines() {
        let outcome = outcome(
            0,
            &[
                r#"{"key": "Events", "class": "TTree"}"#,
                "Info in <TFile::Open>: opening file",
                r#"{"key": "Model", "class": "RNTuple", "entries": 42}"#,
            ],
        );

        let units = outcome.units();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].key, "Events");
        assert_eq!(units[1].class, "RNTuple");
        assert_eq!(units[1].extra["entries"], 42);
    }

    #[test]
    fn test_into_result() {
        assert!(outcome(0, &[]).into_result().is_ok());

        let err = outcome(3, &["partial"]).into_result().unwrap_err();
        match err {
            ConversionError::ConversionFailed {
                exit_code,
                captured_stdout_lines,
                ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(captured_stdout_lines, vec!["partial".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
