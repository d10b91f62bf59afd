// Engine Process Port
// Handle to the running engine, direct child or discovered by pid

use async_trait::async_trait;
use std::time::Duration;

/// Engine process handle trait
///
/// Implementations:
/// - ChildProcess: process spawned by this client
/// - HostPidProcess: process found by pid (e.g. inside a container)
#[async_trait]
pub trait EngineProcess: Send {
    /// OS process id, if known
    fn id(&self) -> Option<u32>;

    /// Non-blocking liveness poll
    fn is_running(&mut self) -> bool;

    /// Wait up to `grace` for the process to exit; true if it exited
    async fn wait_timeout(&mut self, grace: Duration) -> bool;

    /// Force kill
    async fn kill(&mut self) -> std::io::Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Observable state of a [`MockEngineProcess`]
    #[derive(Debug, Default)]
    pub struct MockProcessState {
        pub running: bool,
        /// Process exits when waited on (e.g. after `quit()`)
        pub exits_on_wait: bool,
        pub killed: bool,
    }

    pub struct MockEngineProcess {
        pid: u32,
        state: Arc<Mutex<MockProcessState>>,
    }

    impl MockEngineProcess {
        pub fn new(pid: u32) -> Self {
            Self {
                pid,
                state: Arc::new(Mutex::new(MockProcessState {
                    running: true,
                    exits_on_wait: true,
                    killed: false,
                })),
            }
        }

        /// Process that ignores `quit()` and must be killed
        pub fn stubborn(pid: u32) -> Self {
            let process = Self::new(pid);
            process.state.lock().unwrap().exits_on_wait = false;
            process
        }

        pub fn state(&self) -> Arc<Mutex<MockProcessState>> {
            Arc::clone(&self.state)
        }
    }

    #[async_trait]
    impl EngineProcess for MockEngineProcess {
        fn id(&self) -> Option<u32> {
            Some(self.pid)
        }

        fn is_running(&mut self) -> bool {
            self.state.lock().unwrap().running
        }

        async fn wait_timeout(&mut self, _grace: Duration) -> bool {
            let mut state = self.state.lock().unwrap();
            if state.exits_on_wait {
                state.running = false;
            }
            !state.running
        }

        async fn kill(&mut self) -> std::io::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.killed = true;
            state.running = false;
            Ok(())
        }
    }
}
