// Execution environments of the engine process
//
// Closed set of variants selected once per session. The pure parts (command
// lines, paths) live here; reading files and resolving process handles is the
// job of the EngineHost port.

use crate::domain::identity::{HostIdentity, SessionToken};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Container runtime binary
pub const CONTAINER_RUNTIME: &str = "docker";

/// Remote shell binary
pub const REMOTE_SHELL: &str = "wsl";

/// Default engine executable name inside containers and remote shells
pub const DEFAULT_ENGINE_NAME: &str = "omc";

/// Directory of the rendezvous file as seen by a non-local engine
pub const REMOTE_RENDEZVOUS_DIR: &str = "/tmp";

/// Lets the engine accept connections from outside its network namespace
pub const ANY_HOST_FLAG: &str = "-d=zmqDangerousAcceptConnectionsFromAnywhere";

/// Network mode of a freshly started container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockerNetwork {
    #[default]
    Host,
    /// Own network namespace; the engine address must be resolved via inspect
    Separate,
}

impl FromStr for DockerNetwork {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "host" => Ok(DockerNetwork::Host),
            "separate" => Ok(DockerNetwork::Separate),
            other => Err(AppError::Config(format!(
                "docker network was set to '{}', but only 'host' or 'separate' is allowed",
                other
            ))),
        }
    }
}

/// Where and how the engine runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionEnvironment {
    /// Engine process on this host
    #[default]
    Local,
    /// New container started from an image
    DockerRun {
        image: String,
        extra_args: Vec<String>,
        network: DockerNetwork,
        engine_path: String,
    },
    /// Engine started inside an already running container
    DockerExec {
        container: String,
        extra_args: Vec<String>,
        engine_path: String,
    },
    /// Engine started through a remote shell (WSL style)
    RemoteShell {
        distribution: Option<String>,
        user: Option<String>,
        engine_path: String,
    },
}

/// Inputs for building the engine start command
#[derive(Debug, Clone)]
pub struct LaunchContext<'a> {
    pub token: &'a SessionToken,
    pub host: &'a HostIdentity,
    /// Engine executable for a local session
    pub local_engine: &'a str,
    pub container_id_file: &'a Path,
    pub interactive_port: Option<u16>,
}

impl ExecutionEnvironment {
    pub fn docker_run(image: impl Into<String>) -> Self {
        ExecutionEnvironment::DockerRun {
            image: image.into(),
            extra_args: Vec::new(),
            network: DockerNetwork::Host,
            engine_path: DEFAULT_ENGINE_NAME.to_string(),
        }
    }

    pub fn docker_exec(container: impl Into<String>) -> Self {
        ExecutionEnvironment::DockerExec {
            container: container.into(),
            extra_args: Vec::new(),
            engine_path: DEFAULT_ENGINE_NAME.to_string(),
        }
    }

    pub fn remote_shell(distribution: Option<String>, user: Option<String>) -> Self {
        ExecutionEnvironment::RemoteShell {
            distribution,
            user,
            engine_path: DEFAULT_ENGINE_NAME.to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ExecutionEnvironment::Local)
    }

    pub fn is_containerized(&self) -> bool {
        matches!(
            self,
            ExecutionEnvironment::DockerRun { .. } | ExecutionEnvironment::DockerExec { .. }
        )
    }

    /// Directory the engine writes its rendezvous file to, `None` for the local temp dir
    pub fn rendezvous_dir(&self) -> Option<&'static str> {
        match self {
            ExecutionEnvironment::Local => None,
            _ => Some(REMOTE_RENDEZVOUS_DIR),
        }
    }

    /// Full command line that starts the engine
    ///
    /// # Errors
    /// `AppError::Config` for a container on a Windows host without an explicit port.
    pub fn launch_command(&self, ctx: &LaunchContext<'_>) -> Result<Vec<String>> {
        let windows = ctx.host.platform.is_windows();
        let mut extra_flags: Vec<String> = Vec::new();

        if self.is_containerized() && windows {
            extra_flags.push(ANY_HOST_FLAG.to_string());
            if ctx.interactive_port.is_none() {
                return Err(AppError::Config(
                    "docker on Windows requires knowing which port to connect to; \
                     the container needs to publish it (-p 127.0.0.1:n:n)"
                        .to_string(),
                ));
            }
        }

        let mut command: Vec<String> = match self {
            ExecutionEnvironment::Local => vec![ctx.local_engine.to_string()],
            ExecutionEnvironment::DockerRun {
                image,
                extra_args,
                network,
                engine_path,
            } => {
                let network_args = match (windows, ctx.interactive_port, network) {
                    (true, Some(port), _) => {
                        vec!["-p".to_string(), format!("127.0.0.1:{}:{}", port, port)]
                    }
                    (_, _, DockerNetwork::Separate) => {
                        extra_flags = vec![ANY_HOST_FLAG.to_string()];
                        Vec::new()
                    }
                    _ => vec!["--network=host".to_string()],
                };

                let mut cmd = vec![
                    CONTAINER_RUNTIME.to_string(),
                    "run".to_string(),
                    "--cidfile".to_string(),
                    ctx.container_id_file.to_string_lossy().into_owned(),
                    "--rm".to_string(),
                    "--env".to_string(),
                    format!("USER={}", ctx.host.user),
                    "--user".to_string(),
                    ctx.host.uid.to_string(),
                ];
                cmd.extend(extra_args.iter().cloned());
                cmd.extend(network_args);
                cmd.push(image.clone());
                cmd.push(engine_path.clone());
                cmd
            }
            ExecutionEnvironment::DockerExec {
                container,
                extra_args,
                engine_path,
            } => {
                let mut cmd = vec![
                    CONTAINER_RUNTIME.to_string(),
                    "exec".to_string(),
                    "--env".to_string(),
                    format!("USER={}", ctx.host.user),
                    "--user".to_string(),
                    ctx.host.uid.to_string(),
                ];
                cmd.extend(extra_args.iter().cloned());
                cmd.push(container.clone());
                cmd.push(engine_path.clone());
                cmd
            }
            ExecutionEnvironment::RemoteShell {
                distribution,
                user,
                engine_path,
            } => {
                let mut cmd = remote_shell_base(distribution.as_deref(), user.as_deref());
                cmd.push("--".to_string());
                cmd.push(engine_path.clone());
                cmd
            }
        };

        command.push("--interactive=zmq".to_string());
        command.push("--locale=C".to_string());
        command.push(format!("-z={}", ctx.token));
        command.extend(extra_flags);
        if let Some(port) = ctx.interactive_port {
            command.push(format!("--interactivePort={}", port));
        }

        Ok(command)
    }

    /// Prefix tokens for running a command next to the engine (e.g. a compiled model)
    pub fn execution_prefix(&self, cwd: &str, container_id: Option<&str>, uid: u32) -> Vec<String> {
        match self {
            ExecutionEnvironment::Local => Vec::new(),
            ExecutionEnvironment::DockerRun { .. } | ExecutionEnvironment::DockerExec { .. } => {
                let mut prefix = vec![
                    CONTAINER_RUNTIME.to_string(),
                    "exec".to_string(),
                    "--user".to_string(),
                    uid.to_string(),
                    "--workdir".to_string(),
                    cwd.to_string(),
                ];
                if let Some(cid) = container_id {
                    prefix.push(cid.to_string());
                }
                prefix
            }
            ExecutionEnvironment::RemoteShell {
                distribution, user, ..
            } => {
                let mut prefix = remote_shell_base(distribution.as_deref(), user.as_deref());
                prefix.push("--cd".to_string());
                prefix.push(cwd.to_string());
                prefix.push("--".to_string());
                prefix
            }
        }
    }

    /// Command that prints a file as seen by the engine, `None` for local sessions
    pub fn read_file_command(&self, path: &str, container_id: Option<&str>) -> Option<Vec<String>> {
        match self {
            ExecutionEnvironment::Local => None,
            ExecutionEnvironment::DockerRun { .. } | ExecutionEnvironment::DockerExec { .. } => {
                let cid = container_id?;
                Some(vec![
                    CONTAINER_RUNTIME.to_string(),
                    "exec".to_string(),
                    cid.to_string(),
                    "cat".to_string(),
                    path.to_string(),
                ])
            }
            ExecutionEnvironment::RemoteShell {
                distribution, user, ..
            } => {
                let mut cmd = remote_shell_base(distribution.as_deref(), user.as_deref());
                cmd.push("--".to_string());
                cmd.push("cat".to_string());
                cmd.push(path.to_string());
                Some(cmd)
            }
        }
    }
}

fn remote_shell_base(distribution: Option<&str>, user: Option<&str>) -> Vec<String> {
    let mut cmd = vec![REMOTE_SHELL.to_string()];
    if let Some(distribution) = distribution {
        cmd.push("--distribution".to_string());
        cmd.push(distribution.to_string());
    }
    if let Some(user) = user {
        cmd.push("--user".to_string());
        cmd.push(user.to_string());
    }
    cmd
}

impl fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionEnvironment::Local => write!(f, "local"),
            ExecutionEnvironment::DockerRun { image, .. } => write!(f, "docker-run({})", image),
            ExecutionEnvironment::DockerExec { container, .. } => {
                write!(f, "docker-exec({})", container)
            }
            ExecutionEnvironment::RemoteShell { distribution, .. } => write!(
                f,
                "remote-shell({})",
                distribution.as_deref().unwrap_or("default")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::HostPlatform;
    use std::path::PathBuf;

    fn host(platform: HostPlatform) -> HostIdentity {
        HostIdentity {
            user: "bob".to_string(),
            uid: 1001,
            platform,
            temp_dir: PathBuf::from("/tmp"),
        }
    }

    fn ctx<'a>(
        token: &'a SessionToken,
        host: &'a HostIdentity,
        cid: &'a Path,
        port: Option<u16>,
    ) -> LaunchContext<'a> {
        LaunchContext {
            token,
            host,
            local_engine: "/opt/om/bin/omc",
            container_id_file: cid,
            interactive_port: port,
        }
    }

    #[test]
    fn test_local_command() {
        let token = SessionToken::new("tok");
        let host = host(HostPlatform::Posix);
        let cid = PathBuf::from("/tmp/x.cid");
        let cmd = ExecutionEnvironment::Local
            .launch_command(&ctx(&token, &host, &cid, None))
            .unwrap();

        assert_eq!(
            cmd,
            vec!["/opt/om/bin/omc", "--interactive=zmq", "--locale=C", "-z=tok"]
        );
    }

    #[test]
    fn test_docker_run_host_network() {
        let token = SessionToken::new("tok");
        let host = host(HostPlatform::Posix);
        let cid = PathBuf::from("/tmp/x.cid");
        let env = ExecutionEnvironment::docker_run("openmodelica/openmodelica:v1.22.0");
        let cmd = env.launch_command(&ctx(&token, &host, &cid, None)).unwrap();

        assert_eq!(
            cmd,
            vec![
                "docker",
                "run",
                "--cidfile",
                "/tmp/x.cid",
                "--rm",
                "--env",
                "USER=bob",
                "--user",
                "1001",
                "--network=host",
                "openmodelica/openmodelica:v1.22.0",
                "omc",
                "--interactive=zmq",
                "--locale=C",
                "-z=tok",
            ]
        );
    }

    #[test]
    fn test_docker_run_separate_network() {
        let token = SessionToken::new("tok");
        let host = host(HostPlatform::Posix);
        let cid = PathBuf::from("/tmp/x.cid");
        let env = ExecutionEnvironment::DockerRun {
            image: "img".to_string(),
            extra_args: vec!["--memory=1g".to_string()],
            network: DockerNetwork::Separate,
            engine_path: "omc".to_string(),
        };
        let cmd = env
            .launch_command(&ctx(&token, &host, &cid, Some(13027)))
            .unwrap();

        assert!(!cmd.contains(&"--network=host".to_string()));
        assert!(cmd.contains(&"--memory=1g".to_string()));
        assert!(cmd.contains(&ANY_HOST_FLAG.to_string()));
        assert_eq!(cmd.last().unwrap(), "--interactivePort=13027");
    }

    #[test]
    fn test_docker_on_windows_requires_port() {
        let token = SessionToken::new("tok");
        let host = host(HostPlatform::Windows);
        let cid = PathBuf::from("x.cid");
        let env = ExecutionEnvironment::docker_exec("c1");

        let result = env.launch_command(&ctx(&token, &host, &cid, None));
        assert!(matches!(result, Err(AppError::Config(_))));

        let run = ExecutionEnvironment::docker_run("img")
            .launch_command(&ctx(&token, &host, &cid, Some(4000)))
            .unwrap();
        assert!(run.contains(&"127.0.0.1:4000:4000".to_string()));
    }

    #[test]
    fn test_docker_exec_command() {
        let token = SessionToken::new("tok");
        let host = host(HostPlatform::Posix);
        let cid = PathBuf::from("/tmp/x.cid");
        let cmd = ExecutionEnvironment::docker_exec("c1")
            .launch_command(&ctx(&token, &host, &cid, None))
            .unwrap();

        assert_eq!(&cmd[..8], &["docker", "exec", "--env", "USER=bob", "--user", "1001", "c1", "omc"]);
    }

    #[test]
    fn test_remote_shell_prefix() {
        let env = ExecutionEnvironment::remote_shell(Some("Ubuntu".to_string()), None);
        assert_eq!(
            env.execution_prefix("/work", None, 0),
            vec!["wsl", "--distribution", "Ubuntu", "--cd", "/work", "--"]
        );
        assert_eq!(
            env.read_file_command("/tmp/f", None).unwrap(),
            vec!["wsl", "--distribution", "Ubuntu", "--", "cat", "/tmp/f"]
        );
    }

    #[test]
    fn test_network_parse() {
        assert_eq!("host".parse::<DockerNetwork>().unwrap(), DockerNetwork::Host);
        assert_eq!(
            "separate".parse::<DockerNetwork>().unwrap(),
            DockerNetwork::Separate
        );
        assert!("bridge".parse::<DockerNetwork>().is_err());
    }
}
