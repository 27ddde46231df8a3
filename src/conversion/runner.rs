//! # Conversion Runner
//!
//! Runs the external converter against one working file.
//!
//! The child gets a null stdin and piped stdout/stderr. Stdout is read line by
//! line on the caller's task; stderr is drained by a separate task from the
//! moment the child starts, so a converter that writes a lot of diagnostics can
//! never block on a full pipe while we wait for its stdout. Dropping a
//! [`ConversionProcess`] kills the child.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::error::ConversionError;
use super::outcome::ConversionOutcome;
use crate::config::ConverterConfig;
use crate::constants::conversion::SIGNALLED_EXIT_CODE;

#[derive(Debug, Clone)]
pub struct ConversionRunner {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ConversionRunner {
    /// Runner for `program` with no leading arguments and no timeout
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(config.program.clone())
            .with_args(config.args.clone())
            .with_timeout(config.timeout())
    }

    /// Arguments placed before the input path
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Start the converter on `input`
    ///
    /// Every call starts a fresh child; output of one invocation is never shared
    /// with another.
    pub fn spawn(&self, input: &Path) -> Result<ConversionProcess, ConversionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConversionError::spawn(&self.program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConversionError::stream_io("stdout", "stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConversionError::stream_io("stderr", "stderr was not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            stderr.read_to_end(&mut buffer).await?;
            Ok::<_, std::io::Error>(buffer)
        });

        debug!(
            program = %self.program,
            input = %input.display(),
            pid = ?child.id(),
            "🚀 Converter started"
        );

        Ok(ConversionProcess {
            child,
            stdout: BufReader::new(stdout),
            line_buf: Vec::new(),
            stderr_task: Some(stderr_task),
            captured_stdout_lines: Vec::new(),
            input: input.to_path_buf(),
            started: Instant::now(),
        })
    }

    /// Run the converter to completion, logging each output line as it arrives
    pub async fn run_conversion(&self, input: &Path) -> Result<ConversionOutcome, ConversionError> {
        self.run_conversion_with(input, |line| {
            debug!(line = %line, "Converter output");
        })
        .await
    }

    /// Run the converter to completion, handing each stdout line to `on_line`
    ///
    /// A non-zero exit is still `Ok`; use [`ConversionOutcome::into_result`] to
    /// turn it into an error. When the configured timeout elapses the child is
    /// killed and [`ConversionError::TimedOut`] is returned.
    #[instrument(skip(self, on_line), fields(program = %self.program, input = %input.display()))]
    pub async fn run_conversion_with<F>(
        &self,
        input: &Path,
        mut on_line: F,
    ) -> Result<ConversionOutcome, ConversionError>
    where
        F: FnMut(&str) + Send,
    {
        let mut process = self.spawn(input)?;

        let drive = async move {
            while let Some(line) = process.next_line().await? {
                on_line(&line);
            }
            process.finish().await
        };

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, drive).await {
                Ok(result) => result?,
                Err(_) => {
                    // Dropping the future dropped the process, which kills the child
                    warn!(
                        timeout_ms = limit.as_millis() as u64,
                        "⏱️ Converter timed out and was killed"
                    );
                    return Err(ConversionError::timed_out(limit.as_millis() as u64));
                }
            },
            None => drive.await?,
        };

        info!(
            exit_code = outcome.exit_code,
            lines = outcome.captured_stdout_lines.len(),
            duration_ms = outcome.duration.as_millis() as u64,
            "🏁 Converter finished"
        );

        Ok(outcome)
    }
}

/// A running converter child
#[derive(Debug)]
pub struct ConversionProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
    line_buf: Vec<u8>,
    stderr_task: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    captured_stdout_lines: Vec<String>,
    input: PathBuf,
    started: Instant,
}

impl ConversionProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Next stdout line, or `None` once the child closed its stdout
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than treated as an
    /// error; only the exit code decides success.
    pub async fn next_line(&mut self) -> Result<Option<String>, ConversionError> {
        self.line_buf.clear();
        let read = self
            .stdout
            .read_until(b'\n', &mut self.line_buf)
            .await
            .map_err(|e| ConversionError::stream_io("stdout", e))?;
        if read == 0 {
            return Ok(None);
        }

        let mut bytes = self.line_buf.as_slice();
        if let Some(stripped) = bytes.strip_suffix(b"\n") {
            bytes = stripped.strip_suffix(b"\r").unwrap_or(stripped);
        }
        let line = String::from_utf8_lossy(bytes).into_owned();
        self.captured_stdout_lines.push(line.clone());
        Ok(Some(line))
    }

    /// Drain remaining stdout, wait for exit and collect stderr
    pub async fn finish(mut self) -> Result<ConversionOutcome, ConversionError> {
        while self.next_line().await?.is_some() {}

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ConversionError::stream_io("wait", e))?;

        let stderr = match self.stderr_task.take() {
            Some(task) => task
                .await
                .map_err(|e| ConversionError::stream_io("stderr", e))?
                .map_err(|e| ConversionError::stream_io("stderr", e))?,
            None => Vec::new(),
        };

        Ok(ConversionOutcome {
            exit_code: status.code().unwrap_or(SIGNALLED_EXIT_CODE),
            captured_stdout_lines: std::mem::take(&mut self.captured_stdout_lines),
            captured_stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration: self.started.elapsed(),
        })
    }
}

impl Drop for ConversionProcess {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = ConversionRunner::new("/nonexistent/converter-binary");
        let err = runner.spawn(Path::new("/tmp/input.bin")).unwrap_err();
        assert!(matches!(err, ConversionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_lines_arrive_in_order_and_input_is_last_argument() {
        let runner = ConversionRunner::new("sh").with_args(["-c", "echo first; echo \"$0\""]);
        let mut process = runner.spawn(Path::new("/data/input.root")).unwrap();

        assert_eq!(process.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(
            process.next_line().await.unwrap().as_deref(),
            Some("/data/input.root")
        );

        let outcome = process.finish().await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.captured_stdout_lines, vec!["first", "/data/input.root"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_on_stdout_does_not_fail_clean_exit() {
        let runner = ConversionRunner::new("sh").with_args([
            "-c",
            r#"printf '{"key":"a","class":"TTree"}\n\377\376 caf\351\nlast'; exit 0"#,
        ]);
        let outcome = runner.run_conversion(Path::new("ignored")).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.captured_stdout_lines.len(), 3);
        assert_eq!(outcome.captured_stdout_lines[0], r#"{"key":"a","class":"TTree"}"#);
        assert!(outcome.captured_stdout_lines[1].contains('\u{FFFD}'));
        assert!(outcome.captured_stdout_lines[1].contains(" caf"));
        assert_eq!(outcome.captured_stdout_lines[2], "last");
    }

    #[tokio::test]
    async fn test_killed_child_reports_signalled_exit_code() {
        let runner = ConversionRunner::new("sh").with_args(["-c", "kill -9 $$"]);
        let outcome = runner.run_conversion(Path::new("ignored")).await.unwrap();
        assert_eq!(outcome.exit_code, SIGNALLED_EXIT_CODE);
        assert!(!outcome.is_success());
    }
}
