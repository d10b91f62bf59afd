// Engine Host Port
// Starts the engine and reads what it writes, per execution environment

use crate::domain::{ExecutionEnvironment, HostIdentity, SessionFiles, SessionToken};
use crate::error::Result;
use crate::port::engine_log::EngineLog;
use crate::port::engine_process::EngineProcess;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Everything needed to start one engine
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub token: SessionToken,
    pub command: Vec<String>,
    pub files: SessionFiles,
    /// Budget for container id and process id resolution
    pub timeout: Duration,
}

/// A started engine
pub struct LaunchedEngine {
    pub process: Box<dyn EngineProcess>,
    pub log: Arc<dyn EngineLog>,
    /// Container the engine runs in, if any
    pub container_id: Option<String>,
    /// Substitute for an unspecified address in the rendezvous endpoint
    pub reachable_address: String,
}

/// Engine host trait
///
/// Implementations:
/// - SystemEngineHost: real processes, docker and wsl
///
/// `start` owns the log on failure: an error always quotes the log and the
/// log is closed before returning.
#[async_trait]
pub trait EngineHost: Send + Sync {
    /// Facts about this machine
    fn identity(&self) -> &HostIdentity;

    /// Engine executable for a local session
    fn local_engine(&self) -> Result<String>;

    /// Start the engine and resolve its process handle
    async fn start(
        &self,
        environment: &ExecutionEnvironment,
        request: LaunchRequest,
    ) -> Result<LaunchedEngine>;

    /// Read the rendezvous file once
    ///
    /// Returns `Ok(None)` while the file does not exist yet. A local file is
    /// deleted after a non-empty read.
    async fn read_rendezvous(
        &self,
        environment: &ExecutionEnvironment,
        path: &str,
        container_id: Option<&str>,
    ) -> Result<Option<String>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{HostPlatform, LOOPBACK_ADDRESS};
    use crate::error::AppError;
    use crate::port::engine_log::mocks::MockEngineLog;
    use crate::port::engine_process::mocks::{MockEngineProcess, MockProcessState};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Observable state of a [`MockEngineHost`]
    #[derive(Debug, Default)]
    pub struct MockHostState {
        pub launched: Vec<Vec<String>>,
        pub rendezvous_reads: usize,
        pub rendezvous_paths: Vec<String>,
    }

    /// Scripted host
    ///
    /// The rendezvous file appears after `rendezvous_after` reads, or never.
    pub struct MockEngineHost {
        identity: HostIdentity,
        rendezvous: Option<String>,
        rendezvous_after: usize,
        fail_start: bool,
        log: Arc<MockEngineLog>,
        process: Mutex<Option<MockEngineProcess>>,
        process_state: Arc<Mutex<MockProcessState>>,
        state: Arc<Mutex<MockHostState>>,
    }

    impl MockEngineHost {
        pub fn new(rendezvous: Option<&str>) -> Self {
            let process = MockEngineProcess::new(4242);
            let process_state = process.state();
            Self {
                identity: HostIdentity {
                    user: "tester".to_string(),
                    uid: 1000,
                    platform: HostPlatform::Posix,
                    temp_dir: PathBuf::from("/tmp"),
                },
                rendezvous: rendezvous.map(str::to_string),
                rendezvous_after: 0,
                fail_start: false,
                log: Arc::new(MockEngineLog::new("engine log line")),
                process: Mutex::new(Some(process)),
                process_state,
                state: Arc::new(Mutex::new(MockHostState::default())),
            }
        }

        pub fn with_process(self, process: MockEngineProcess) -> Self {
            let process_state = process.state();
            Self {
                process: Mutex::new(Some(process)),
                process_state,
                ..self
            }
        }

        pub fn rendezvous_after(mut self, reads: usize) -> Self {
            self.rendezvous_after = reads;
            self
        }

        pub fn failing_start(mut self) -> Self {
            self.fail_start = true;
            self
        }

        pub fn log(&self) -> Arc<MockEngineLog> {
            Arc::clone(&self.log)
        }

        pub fn process_state(&self) -> Arc<Mutex<MockProcessState>> {
            Arc::clone(&self.process_state)
        }

        pub fn state(&self) -> Arc<Mutex<MockHostState>> {
            Arc::clone(&self.state)
        }
    }

    #[async_trait]
    impl EngineHost for MockEngineHost {
        fn identity(&self) -> &HostIdentity {
            &self.identity
        }

        fn local_engine(&self) -> Result<String> {
            Ok("/opt/openmodelica/bin/omc".to_string())
        }

        async fn start(
            &self,
            environment: &ExecutionEnvironment,
            request: LaunchRequest,
        ) -> Result<LaunchedEngine> {
            self.state.lock().unwrap().launched.push(request.command);
            if self.fail_start {
                self.log.close();
                return Err(AppError::launch("engine failed to start", self.log.contents()));
            }

            let process = self
                .process
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| AppError::InvalidState("mock engine already started".into()))?;

            Ok(LaunchedEngine {
                process: Box::new(process),
                log: self.log.clone(),
                container_id: environment.is_containerized().then(|| "c0ffee".to_string()),
                reachable_address: LOOPBACK_ADDRESS.to_string(),
            })
        }

        async fn read_rendezvous(
            &self,
            _environment: &ExecutionEnvironment,
            path: &str,
            _container_id: Option<&str>,
        ) -> Result<Option<String>> {
            let mut state = self.state.lock().unwrap();
            state.rendezvous_reads += 1;
            state.rendezvous_paths.push(path.to_string());
            if state.rendezvous_reads <= self.rendezvous_after {
                return Ok(None);
            }
            Ok(self.rendezvous.clone())
        }
    }
}
