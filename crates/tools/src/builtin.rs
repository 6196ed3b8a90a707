//! Built-in tools.

use super::r#trait::*;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Runs one external program.
///
/// The child is killed when the execution future is dropped, so racing it
/// against a cancellation signal stops the process.
#[derive(Debug, Clone)]
pub struct CommandTool {
    program: String,
    description: String,
}

impl CommandTool {
    /// Tool running `program`.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            description: format!("Run {}", program),
            program,
        }
    }

    /// Tool running command lines through `sh -c`.
    pub fn shell() -> Self {
        Self {
            program: "sh".to_string(),
            description: "POSIX shell".to_string(),
        }
    }

    /// Input running `line` with [`CommandTool::shell`].
    pub fn shell_input(line: &str) -> ToolInput {
        ToolInput::new(["-c", line])
    }

    fn spawn_error(&self, source: std::io::Error) -> ToolError {
        ToolError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    async fn run(&self, input: &ToolInput) -> Result<ToolOutput, ToolError> {
        let start = std::time::Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&input.args)
            .envs(&input.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &input.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(if input.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        debug!(program = %self.program, args = ?input.args, "Spawning");
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        // Feed stdin from a task so a chatty child cannot fill its pipes
        // while we are still writing.
        if let (Some(data), Some(mut stdin)) = (input.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(data.as_bytes()).await {
                    debug!(error = %e, "Child closed stdin early");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        })
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        &self.program
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput, ToolError> {
        match input.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.run(input))
                .await
                .map_err(|_| ToolError::Timeout {
                    program: self.program.clone(),
                    timeout,
                })?,
            None => self.run(input).await,
        }
    }
}
