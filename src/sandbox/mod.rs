//! Execution sandbox
//!
//! Runs candidate code in an isolated child process with a hard wall-clock
//! timeout. Every outcome, including crashes and timeouts, is normalized
//! into `ExecutionResult` data; the sandbox never raises into the
//! controller. Process isolation is the whole contract — candidate side
//! effects on the filesystem or network are a documented limitation.

pub mod shim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a candidate process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    Success,
    Error(i32),
    /// Forcibly terminated after the wall-clock timeout.
    Killed,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }
}

/// Captured outcome of one sandbox execution. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit: ExitStatus,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecutionResult {
    /// A timeout result; stream output from a killed process is discarded.
    pub fn timed_out(duration: Duration) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit: ExitStatus::Killed,
            duration,
            timed_out: true,
        }
    }

    /// A result for a process that could not be started at all. The spawn
    /// failure is surfaced as stderr data, not as a controller error.
    pub fn spawn_failure(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            exit: ExitStatus::Error(127),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `code` with a hard wall-clock budget.
    async fn execute(&self, code: &str, timeout: Duration) -> ExecutionResult;
}

/// Child-process sandbox backed by an external interpreter.
pub struct ProcessSandbox {
    interpreter: String,
    output_cap: usize,
}

impl ProcessSandbox {
    pub fn new(interpreter: impl Into<String>, output_cap: usize) -> Self {
        Self {
            interpreter: interpreter.into(),
            output_cap,
        }
    }

    fn write_scratch_file(&self, code: &str) -> std::io::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("sisyphus-candidate-")
            .suffix(".py")
            .tempfile()?;
        file.write_all(code.as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    fn capture(&self, bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        truncate_capture(&text, self.output_cap)
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(&self, code: &str, timeout: Duration) -> ExecutionResult {
        let scratch = match self.write_scratch_file(code) {
            Ok(file) => file,
            Err(e) => {
                warn!("failed to stage candidate code: {e}");
                return ExecutionResult::spawn_failure(format!(
                    "failed to stage candidate code: {e}"
                ));
            }
        };

        debug!(
            "executing candidate with {} (timeout {:?})",
            self.interpreter, timeout
        );

        let start = Instant::now();
        let mut command = tokio::process::Command::new(&self.interpreter);
        command
            .arg(scratch.path())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("failed to spawn {}: {e}", self.interpreter);
                return ExecutionResult::spawn_failure(format!(
                    "failed to spawn {}: {e}",
                    self.interpreter
                ));
            }
        };

        // Dropping the wait future kills the child via kill_on_drop, so a
        // timeout cannot leave a stray interpreter behind.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let duration = start.elapsed();
                let exit = if output.status.success() {
                    ExitStatus::Success
                } else {
                    ExitStatus::Error(output.status.code().unwrap_or(-1))
                };
                let result = ExecutionResult {
                    stdout: self.capture(&output.stdout),
                    stderr: self.capture(&output.stderr),
                    exit,
                    duration,
                    timed_out: false,
                };
                debug!(
                    "candidate finished with {:?} in {:?}",
                    result.exit, result.duration
                );
                result
            }
            Ok(Err(e)) => {
                warn!("failed to collect candidate output: {e}");
                ExecutionResult::spawn_failure(format!("failed to collect output: {e}"))
            }
            Err(_) => {
                warn!("candidate timed out after {:?}, killed", timeout);
                ExecutionResult::timed_out(start.elapsed())
            }
        }
    }
}

/// Cap captured output at `cap` bytes, cutting on a char boundary.
fn truncate_capture(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let mut end = cap;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [output truncated]", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_capture_short_input_untouched() {
        assert_eq!(truncate_capture("hello", 64), "hello");
    }

    #[test]
    fn test_truncate_capture_caps_long_input() {
        let long = "x".repeat(200);
        let capped = truncate_capture(&long, 64);
        assert!(capped.starts_with(&"x".repeat(64)));
        assert!(capped.ends_with("[output truncated]"));
    }

    #[test]
    fn test_truncate_capture_respects_char_boundaries() {
        let text = "é".repeat(50);
        let capped = truncate_capture(&text, 33);
        assert!(capped.contains("[output truncated]"));
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let sandbox = ProcessSandbox::new("python3", 64 * 1024);
        let result = sandbox
            .execute("print(2 + 2)", Duration::from_secs(10))
            .await;
        assert!(result.exit.success());
        assert_eq!(result.stdout.trim(), "4");
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_candidate_exception_becomes_data() {
        let sandbox = ProcessSandbox::new("python3", 64 * 1024);
        let result = sandbox
            .execute("raise ValueError('boom')", Duration::from_secs(10))
            .await;
        assert!(!result.exit.success());
        assert!(result.stderr.contains("ValueError"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_infinite_loop_is_killed() {
        let sandbox = ProcessSandbox::new("python3", 64 * 1024);
        let result = sandbox
            .execute("while True:\n    pass", Duration::from_secs(2))
            .await;
        assert!(result.timed_out);
        assert_eq!(result.exit, ExitStatus::Killed);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_data_not_error() {
        let sandbox = ProcessSandbox::new("definitely-not-an-interpreter", 64 * 1024);
        let result = sandbox.execute("print(1)", Duration::from_secs(2)).await;
        assert!(!result.exit.success());
        assert!(result.stderr.contains("failed to spawn"));
    }
}
