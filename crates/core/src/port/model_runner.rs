// Model Runner Port
// Abstraction for executing a compiled model described by an ExecutionDescriptor

use crate::domain::ExecutionDescriptor;
use async_trait::async_trait;
use thiserror::Error;

/// Result of a successful model run
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub duration_ms: i64,
    pub stdout: String,
}

/// Model execution errors
///
/// Every variant carries enough context (command, stderr, exit code) to
/// diagnose the failure without re-running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Model executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Batch file (*.bat) does not exist: {0}")]
    BatchFileNotFound(String),

    #[error("Spawn failed for {command}: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Timeout after {timeout_ms}ms running model executable {command}")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Model executable {command} exited with code {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Error running model executable {command}: {stderr}")]
    Stderr { command: String, stderr: String },

    #[error("IO error: {0}")]
    IoError(String),
}

/// Model Runner trait
///
/// Implementations:
/// - SubprocessRunner: spawns the executable as a child process
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Run the described executable to completion
    ///
    /// # Errors
    /// - ExecutionError::ExecutableNotFound if a local executable is missing
    /// - ExecutionError::Timeout if the run exceeds the descriptor's timeout
    /// - ExecutionError::NonZeroExit / Stderr if the executable reports a failure
    async fn run(
        &self,
        descriptor: &ExecutionDescriptor,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always exit with code 0
        Success,
        /// Always fail with the given error
        Fail(ExecutionError),
    }

    /// Mock Model Runner for testing
    pub struct MockModelRunner {
        behavior: MockBehavior,
        call_count: Arc<Mutex<usize>>,
        last_command: Arc<Mutex<Option<Vec<String>>>>,
    }

    impl MockModelRunner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                call_count: Arc::new(Mutex::new(0)),
                last_command: Arc::new(Mutex::new(None)),
            }
        }
        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }
        pub fn new_fail(error: ExecutionError) -> Self {
            Self::new(MockBehavior::Fail(error))
        }
        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
        pub fn last_command(&self) -> Option<Vec<String>> {
            self.last_command.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelRunner for MockModelRunner {
        async fn run(
            &self,
            descriptor: &ExecutionDescriptor,
        ) -> Result<ExecutionOutcome, ExecutionError> {
            *self.call_count.lock().unwrap() += 1;
            *self.last_command.lock().unwrap() = Some(descriptor.command());

            match &self.behavior {
                MockBehavior::Success => Ok(ExecutionOutcome {
                    exit_code: 0,
                    duration_ms: 5,
                    stdout: "mock output".to_string(),
                }),
                MockBehavior::Fail(e) => Err(e.clone()),
            }
        }
    }
}
