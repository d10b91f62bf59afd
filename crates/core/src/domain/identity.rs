// Session identity and per-session file naming

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Random token identifying one session for its whole lifetime
///
/// Disambiguates rendezvous and log files of concurrent sessions and lets the
/// launcher recognise the engine among container processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform family of the machine running this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Posix,
    Windows,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Posix
        }
    }

    pub fn is_windows(self) -> bool {
        self == HostPlatform::Windows
    }
}

/// Facts about the local host needed to name files and build commands
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub user: String,
    pub uid: u32,
    pub platform: HostPlatform,
    pub temp_dir: PathBuf,
}

/// Names of the files a session creates or waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFiles {
    /// Written by the engine once its transport is ready
    pub rendezvous: String,
    /// Engine stdout/stderr
    pub log: PathBuf,
    /// Written by `docker run --cidfile`
    pub container_id: PathBuf,
}

impl SessionFiles {
    /// Derive all file names of a session
    ///
    /// The user segment is omitted for a bare local engine on Windows.
    /// `rendezvous_dir` is the directory as seen by the engine (it may live
    /// inside a container).
    pub fn resolve(
        token: &SessionToken,
        host: &HostIdentity,
        rendezvous_dir: Option<&str>,
        kind: &str,
    ) -> Self {
        let with_user = !host.platform.is_windows() || rendezvous_dir.is_some();
        let rendezvous_name = if with_user {
            format!("openmodelica.{}.port.{}", host.user, token)
        } else {
            format!("openmodelica.port.{}", token)
        };
        let rendezvous = match rendezvous_dir {
            Some(dir) => format!("{}/{}", dir.trim_end_matches('/'), rendezvous_name),
            None => posix_string(&host.temp_dir.join(&rendezvous_name)),
        };

        let log_name = if host.platform.is_windows() {
            format!("openmodelica.{}.{}.log", kind, token)
        } else {
            format!("openmodelica.{}.{}.{}.log", host.user, kind, token)
        };
        let log = host.temp_dir.join(log_name);
        let container_id = PathBuf::from(format!("{}.docker.cid", log.display()));

        Self {
            rendezvous,
            log,
            container_id,
        }
    }
}

/// Path with forward slashes, as the engine expects it
pub fn posix_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(platform: HostPlatform) -> HostIdentity {
        HostIdentity {
            user: "alice".to_string(),
            uid: 1000,
            platform,
            temp_dir: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn test_posix_local_files() {
        let token = SessionToken::new("abc123");
        let files = SessionFiles::resolve(&token, &host(HostPlatform::Posix), None, "port");

        assert_eq!(files.rendezvous, "/tmp/openmodelica.alice.port.abc123");
        assert_eq!(
            files.log,
            PathBuf::from("/tmp/openmodelica.alice.port.abc123.log")
        );
        assert_eq!(
            files.container_id,
            PathBuf::from("/tmp/openmodelica.alice.port.abc123.log.docker.cid")
        );
    }

    #[test]
    fn test_windows_local_omits_user() {
        let token = SessionToken::new("abc123");
        let files = SessionFiles::resolve(&token, &host(HostPlatform::Windows), None, "port");

        assert!(files.rendezvous.ends_with("openmodelica.port.abc123"));
        assert!(files.log.ends_with("openmodelica.port.abc123.log"));
    }

    #[test]
    fn test_container_rendezvous_keeps_user() {
        let token = SessionToken::new("t");
        let files =
            SessionFiles::resolve(&token, &host(HostPlatform::Windows), Some("/tmp/"), "port");
        assert_eq!(files.rendezvous, "/tmp/openmodelica.alice.port.t");
    }
}
