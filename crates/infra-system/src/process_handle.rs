// Engine process handles
// reason: tokio::process for spawned engines, sysinfo/nix for pids found inside containers
use async_trait::async_trait;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tokio::process::Child;
use tracing::{debug, info};

use omlink_core::port::EngineProcess;

/// Poll interval while waiting for a pid-only process to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Engine spawned directly by this client
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl EngineProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn wait_timeout(&mut self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(status = %status, "Engine process exited");
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

/// Engine known only by its host pid (e.g. a process inside a container)
///
/// The container client that started it (`docker run`/`docker exec`) is kept
/// alongside and killed with it.
pub struct HostPidProcess {
    pid: u32,
    system: System,
    client: Option<Child>,
}

impl HostPidProcess {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            system: System::new(),
            client: None,
        }
    }

    pub fn with_client(mut self, client: Child) -> Self {
        self.client = Some(client);
        self
    }

    fn refresh(&mut self) -> bool {
        self.system.refresh_process(Pid::from_u32(self.pid))
    }
}

#[async_trait]
impl EngineProcess for HostPidProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_running(&mut self) -> bool {
        self.refresh()
    }

    async fn wait_timeout(&mut self, grace: Duration) -> bool {
        let started = Instant::now();
        while self.refresh() {
            if started.elapsed() >= grace {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
        true
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        info!(pid = self.pid, "Killing engine process");
        let result = self.kill_pid();
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.kill().await {
                debug!(error = %e, "Container client already gone");
            }
        }
        result
    }
}

impl HostPidProcess {
    fn kill_pid(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid as UnixPid;

            let pid = i32::try_from(self.pid).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range")
            })?;
            kill(UnixPid::from_raw(pid), Signal::SIGKILL)
                .map_err(std::io::Error::from)
        }

        #[cfg(not(unix))]
        {
            self.refresh();
            match self.system.process(Pid::from_u32(self.pid)) {
                Some(process) if process.kill() => Ok(()),
                Some(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "failed to kill engine process",
                )),
                None => Ok(()),
            }
        }
    }
}
