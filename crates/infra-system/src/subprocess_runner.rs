// Subprocess runner for compiled model executables
// reason: tokio::process with a hard timeout, stdout/stderr captured separately
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use omlink_core::domain::ExecutionDescriptor;
use omlink_core::port::model_runner::{ExecutionError, ExecutionOutcome, ModelRunner};
use omlink_core::port::TimeProvider;

/// Search-path separator of the host
const PATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// Runs an [`ExecutionDescriptor`] as a child process
///
/// The child inherits this process's environment; a resolved library path is
/// prepended to `PATH`. Any stderr output counts as failure, even with exit
/// code 0.
pub struct SubprocessRunner {
    time_provider: Arc<dyn TimeProvider>,
}

impl SubprocessRunner {
    /// # Example
    /// ```ignore
    /// let runner = SubprocessRunner::new(Arc::new(SystemTimeProvider));
    /// let exit_code = descriptor.run(&runner).await?;
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { time_provider }
    }

    fn build_command(&self, descriptor: &ExecutionDescriptor) -> Result<Command, ExecutionError> {
        // Only a local executable can be checked before spawning
        if descriptor.cwd_local.is_some() && !Path::new(&descriptor.executable).is_file() {
            return Err(ExecutionError::ExecutableNotFound(
                descriptor.executable.clone(),
            ));
        }

        let argv = descriptor.command();
        let (program, args) = argv.split_first().ok_or_else(|| ExecutionError::SpawnFailed {
            command: String::new(),
            reason: "empty command line".to_string(),
        })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &descriptor.cwd_local {
            command.current_dir(cwd);
        }
        if let Some(library_path) = &descriptor.library_path {
            command.env("PATH", prepend_search_path(library_path, std::env::var_os("PATH")));
        }

        Ok(command)
    }

    async fn spawn_and_wait(
        &self,
        descriptor: &ExecutionDescriptor,
        command_line: &str,
    ) -> Result<std::process::Output, ExecutionError> {
        let child = self
            .build_command(descriptor)?
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed {
                command: command_line.to_string(),
                reason: e.to_string(),
            })?;

        // Dropping the child on timeout kills it (kill_on_drop)
        match timeout(descriptor.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ExecutionError::IoError(e.to_string())),
            Err(_) => Err(ExecutionError::Timeout {
                command: command_line.to_string(),
                timeout_ms: descriptor.timeout.as_millis() as u64,
            }),
        }
    }
}

/// Turn raw process output into an outcome or the matching failure
fn classify(
    command_line: &str,
    output: std::process::Output,
    duration_ms: i64,
) -> Result<ExecutionOutcome, ExecutionError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ExecutionError::NonZeroExit {
            command: command_line.to_string(),
            code: output.status.code(),
            stderr,
        });
    }
    // Whitespace alone is not diagnostic output
    if !stderr.trim().is_empty() {
        return Err(ExecutionError::Stderr {
            command: command_line.to_string(),
            stderr,
        });
    }

    Ok(ExecutionOutcome {
        exit_code: output.status.code().unwrap_or_default(),
        duration_ms,
        stdout,
    })
}

fn prepend_search_path(prefix: &str, existing: Option<OsString>) -> OsString {
    let mut path = OsString::from(prefix);
    if let Some(existing) = existing.filter(|p| !p.is_empty()) {
        path.push(PATH_SEPARATOR);
        path.push(existing);
    }
    path
}

#[async_trait]
impl ModelRunner for SubprocessRunner {
    async fn run(
        &self,
        descriptor: &ExecutionDescriptor,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let command_line = descriptor.command().join(" ");
        let start_time = self.time_provider.now_millis();

        info!(
            command = %command_line,
            cwd = ?descriptor.cwd_local,
            timeout_ms = descriptor.timeout.as_millis() as u64,
            "Starting model executable"
        );

        let output = self.spawn_and_wait(descriptor, &command_line).await?;
        let duration_ms = self.time_provider.now_millis() - start_time;

        match classify(&command_line, output, duration_ms) {
            Ok(outcome) => {
                info!(
                    command = %command_line,
                    duration_ms = %duration_ms,
                    exit_code = outcome.exit_code,
                    "Model executable completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(command = %command_line, error = %e, "Model executable failed");
                Err(e)
            }
        }
    }
}
