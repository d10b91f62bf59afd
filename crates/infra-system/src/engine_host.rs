// System engine host
// reason: tokio::process to start the engine, docker/wsl CLIs for containerized and remote engines
use async_trait::async_trait;
use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use omlink_core::application::constants::CONTAINER_POLL_ATTEMPTS;
use omlink_core::application::RetryPolicy;
use omlink_core::domain::{
    DockerNetwork, ExecutionEnvironment, HostIdentity, HostPlatform, CONTAINER_RUNTIME,
    LOOPBACK_ADDRESS,
};
use omlink_core::error::{AppError, Result};
use omlink_core::port::{EngineHost, EngineLog, EngineProcess, LaunchRequest, LaunchedEngine};

use crate::log_file::EngineLogFile;
use crate::process_handle::{ChildProcess, HostPidProcess};

/// Environment variable naming the engine installation
pub const ENGINE_HOME_VAR: &str = "OPENMODELICAHOME";

/// Starts engines on this machine, in docker containers or through wsl
pub struct SystemEngineHost {
    identity: HostIdentity,
    engine_home: Option<PathBuf>,
}

impl SystemEngineHost {
    /// Resolve host facts and the engine home
    ///
    /// Engine home: `engine_home`, then `$OPENMODELICAHOME`, then two levels
    /// above `omc` on `PATH`.
    pub fn new(engine_home: Option<PathBuf>) -> Self {
        Self::with_identity(host_identity(), resolve_engine_home(engine_home))
    }

    pub fn with_identity(identity: HostIdentity, engine_home: Option<PathBuf>) -> Self {
        Self {
            identity,
            engine_home,
        }
    }

    pub fn engine_home(&self) -> Option<&Path> {
        self.engine_home.as_deref()
    }

    fn spawn(
        &self,
        environment: &ExecutionEnvironment,
        command: &[String],
        log: &EngineLogFile,
    ) -> std::io::Result<Child> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "empty command"))?;
        let (stdout, stderr) = log.stdio()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);

        if environment.is_local() {
            if self.identity.platform.is_windows() {
                if let Some(home) = &self.engine_home {
                    let mut path = home.join("bin").into_os_string();
                    if let Some(existing) = env::var_os("PATH") {
                        path.push(";");
                        path.push(existing);
                    }
                    cmd.env("PATH", path);
                }
            } else {
                cmd.env("USER", &self.identity.user);
            }
        }

        cmd.spawn()
    }

    /// Wait for `docker run --cidfile` to write the container id, then delete the file
    async fn container_id_from_file(&self, request: &LaunchRequest) -> Result<Option<String>> {
        let path = request.files.container_id.as_path();
        let policy = RetryPolicy::from_timeout(request.timeout, CONTAINER_POLL_ATTEMPTS);

        let cid = policy
            .poll(|| async move {
                match tokio::fs::read_to_string(path).await {
                    Ok(content) if !content.trim().is_empty() => {
                        Ok(Some(content.trim().to_string()))
                    }
                    Ok(_) => Ok(None),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(AppError::Io(e)),
                }
            })
            .await?;

        if cid.is_some() {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), error = %e, "Failed to delete container id file");
            }
        }
        Ok(cid)
    }

    /// Poll `docker top` until a process carrying the session token shows up
    ///
    /// Returns the pid, or the last listing seen when the budget runs out.
    async fn engine_pid_in_container(
        &self,
        request: &LaunchRequest,
        container_id: &str,
    ) -> Result<std::result::Result<u32, String>> {
        let policy = RetryPolicy::from_timeout(request.timeout, CONTAINER_POLL_ATTEMPTS);
        let token = request.token.as_str();
        let last_listing = Mutex::new(String::new());
        let last_listing_ref = &last_listing;

        let pid = policy
            .poll(move || async move {
                let output = command_output(&[
                    CONTAINER_RUNTIME.to_string(),
                    "top".to_string(),
                    container_id.to_string(),
                ])
                .await?;
                let listing = String::from_utf8_lossy(&output.stdout).into_owned();
                let pid = find_pid_in_listing(&listing, token);
                *last_listing_ref.lock().unwrap_or_else(|e| e.into_inner()) = listing;
                Ok(pid)
            })
            .await?;

        Ok(pid.ok_or_else(|| last_listing.into_inner().unwrap_or_else(|e| e.into_inner())))
    }

    async fn container_address(&self, container_id: &str) -> Result<Option<String>> {
        let output = command_output(&[
            CONTAINER_RUNTIME.to_string(),
            "inspect".to_string(),
            container_id.to_string(),
        ])
        .await?;
        Ok(parse_container_address(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Container id, reachable address and engine pid of a containerized engine
    async fn resolve_container(
        &self,
        environment: &ExecutionEnvironment,
        request: &LaunchRequest,
    ) -> std::result::Result<(String, String, u32), String> {
        let container_id = match environment {
            ExecutionEnvironment::DockerExec { container, .. } => container.clone(),
            _ => match self.container_id_from_file(request).await {
                Ok(Some(cid)) => cid,
                Ok(None) => {
                    return Err(format!(
                        "container id file {} was not written",
                        request.files.container_id.display()
                    ))
                }
                Err(e) => return Err(e.to_string()),
            },
        };

        let reachable_address = match environment {
            ExecutionEnvironment::DockerRun {
                network: DockerNetwork::Separate,
                ..
            } => match self.container_address(&container_id).await {
                Ok(Some(address)) => address,
                Ok(None) => {
                    return Err(format!(
                        "could not resolve the address of container {}",
                        container_id
                    ))
                }
                Err(e) => return Err(e.to_string()),
            },
            _ => LOOPBACK_ADDRESS.to_string(),
        };

        match self.engine_pid_in_container(request, &container_id).await {
            Ok(Ok(pid)) => Ok((container_id, reachable_address, pid)),
            Ok(Err(listing)) => Err(format!(
                "could not find the engine process in container {}; docker top says:\n{}",
                container_id, listing
            )),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait]
impl EngineHost for SystemEngineHost {
    fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    fn local_engine(&self) -> Result<String> {
        let home = self.engine_home.as_ref().ok_or_else(|| {
            AppError::Config(format!(
                "cannot find the engine installation; set {} or put omc on PATH",
                ENGINE_HOME_VAR
            ))
        })?;
        let name = if self.identity.platform.is_windows() {
            "omc.exe"
        } else {
            "omc"
        };
        Ok(home.join("bin").join(name).to_string_lossy().into_owned())
    }

    async fn start(
        &self,
        environment: &ExecutionEnvironment,
        request: LaunchRequest,
    ) -> Result<LaunchedEngine> {
        let log = EngineLogFile::create(&request.files.log).map_err(|e| {
            AppError::launch(
                format!("cannot create log file {}: {}", request.files.log.display(), e),
                "",
            )
        })?;

        let mut child = match self.spawn(environment, &request.command, &log) {
            Ok(child) => child,
            Err(e) => {
                log.close();
                return Err(AppError::launch(
                    format!("failed to start {}: {}", request.command.join(" "), e),
                    log.contents(),
                ));
            }
        };
        info!(
            token = %request.token,
            pid = ?child.id(),
            environment = %environment,
            "Engine process started"
        );

        let (process, container_id, reachable_address) =
            if environment.is_containerized() {
                match self.resolve_container(environment, &request).await {
                    Ok((cid, address, pid)) => {
                        info!(container_id = %cid, pid = pid, "Engine found in container");
                        (
                            Box::new(HostPidProcess::new(pid).with_client(child))
                                as Box<dyn EngineProcess>,
                            Some(cid),
                            address,
                        )
                    }
                    Err(message) => {
                        if let Err(e) = child.kill().await {
                            warn!(error = %e, "Failed to stop container client");
                        }
                        log.close();
                        return Err(AppError::launch(message, log.contents()));
                    }
                }
            } else {
                (
                    Box::new(ChildProcess::new(child)) as Box<dyn EngineProcess>,
                    None,
                    LOOPBACK_ADDRESS.to_string(),
                )
            };

        Ok(LaunchedEngine {
            process,
            log: Arc::new(log),
            container_id,
            reachable_address,
        })
    }

    async fn read_rendezvous(
        &self,
        environment: &ExecutionEnvironment,
        path: &str,
        container_id: Option<&str>,
    ) -> Result<Option<String>> {
        match environment.read_file_command(path, container_id) {
            None if environment.is_local() => read_local_rendezvous(Path::new(path)).await,
            // Container id not known yet
            None => Ok(None),
            Some(command) => {
                let output = command_output(&command).await?;
                if !output.status.success() {
                    return Ok(None);
                }
                let content = String::from_utf8_lossy(&output.stdout).into_owned();
                Ok((!content.trim().is_empty()).then_some(content))
            }
        }
    }
}

/// Read and delete a local rendezvous file
async fn read_local_rendezvous(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if !content.trim().is_empty() => {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete rendezvous file");
            }
            Ok(Some(content))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

async fn command_output(command: &[String]) -> Result<std::process::Output> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| AppError::InvalidArgument("empty command".to_string()))?;
    Ok(Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?)
}

/// Pid column of the `docker top` line mentioning `token`
pub fn find_pid_in_listing(listing: &str, token: &str) -> Option<u32> {
    listing
        .lines()
        .filter(|line| line.contains(token))
        .find_map(|line| line.split_whitespace().nth(1)?.parse().ok())
}

/// `NetworkSettings.IPAddress` of the first container in `docker inspect` output
pub fn parse_container_address(inspect: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(inspect).ok()?;
    value
        .get(0)?
        .get("NetworkSettings")?
        .get("IPAddress")?
        .as_str()
        .filter(|address| !address.is_empty())
        .map(str::to_string)
}

fn host_identity() -> HostIdentity {
    HostIdentity {
        user: current_user(),
        uid: current_uid(),
        platform: HostPlatform::current(),
        temp_dir: env::temp_dir(),
    }
}

fn current_user() -> String {
    #[cfg(unix)]
    {
        use nix::unistd::{getuid, User};
        if let Ok(Some(user)) = User::from_uid(getuid()) {
            return user.name;
        }
    }

    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "nobody".to_string())
}

fn current_uid() -> u32 {
    #[cfg(unix)]
    {
        nix::unistd::getuid().as_raw()
    }

    #[cfg(not(unix))]
    {
        1000
    }
}

fn resolve_engine_home(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| env::var_os(ENGINE_HOME_VAR).map(PathBuf::from))
        .or_else(|| {
            let omc = which::which("omc").ok()?;
            Some(omc.parent()?.parent()?.to_path_buf())
        })
}
