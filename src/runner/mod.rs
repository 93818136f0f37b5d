//! Code execution collaborator behind the `run-python` event.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::models::RunResult;

/// Runs a snippet of source code and reports exactly one result
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str) -> RunResult;
}

/// Runs `<program> -c <code>` as a child process
pub struct ProcessRunner {
    program: String,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CodeRunner for ProcessRunner {
    async fn run(&self, code: &str) -> RunResult {
        let child = Command::new(&self.program)
            .arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start '{}': {}", self.program, e);
                return RunResult::Error(format!("Failed to start {}: {}", self.program, e));
            }
        };

        // Dropping the wait future on timeout kills the child
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                warn!("Execution timed out after {:?}", self.timeout);
                RunResult::Error(format!(
                    "Execution timed out after {} seconds",
                    self.timeout.as_secs_f32()
                ))
            }
            Ok(Err(e)) => RunResult::Error(e.to_string()),
            Ok(Ok(output)) => {
                info!("Execution finished with {}", output.status);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.is_empty() {
                    RunResult::Output(String::from_utf8_lossy(&output.stdout).into_owned())
                } else {
                    RunResult::Error(stderr.into_owned())
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell() -> ProcessRunner {
        ProcessRunner::new("sh", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn captures_stdout() {
        assert_eq!(shell().run("echo hello").await, RunResult::Output("hello\n".into()));
    }

    #[tokio::test]
    async fn any_stderr_is_an_error() {
        assert_eq!(
            shell().run("echo partial; echo broken >&2").await,
            RunResult::Error("broken\n".into())
        );
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let runner = ProcessRunner::new("definitely-not-an-interpreter", Duration::from_secs(1));
        match runner.run("print(1)").await {
            RunResult::Error(message) => assert!(message.starts_with("Failed to start")),
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_code_times_out() {
        let runner = ProcessRunner::new("sh", Duration::from_millis(200));
        match runner.run("sleep 5").await {
            RunResult::Error(message) => assert!(message.contains("timed out")),
            other => panic!("expected a timeout, got {other:?}"),
        }
    }
}
