// Session configuration

use crate::application::constants::DEFAULT_SESSION_TIMEOUT;
use crate::domain::ExecutionEnvironment;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings fixed for the lifetime of one engine session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Budget for launch, discovery and each request
    pub timeout: Duration,
    /// Replies may be memoized
    pub readonly: bool,
    pub environment: ExecutionEnvironment,
    /// Fixed engine port instead of an ephemeral one
    pub interactive_port: Option<u16>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SESSION_TIMEOUT,
            readonly: false,
            environment: ExecutionEnvironment::Local,
            interactive_port: None,
        }
    }
}

impl SessionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn with_environment(mut self, environment: ExecutionEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_interactive_port(mut self, port: u16) -> Self {
        self.interactive_port = Some(port);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(!config.readonly);
        assert!(config.environment.is_local());
        assert_eq!(config.interactive_port, None);
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::default()
            .with_timeout(Duration::from_secs(3))
            .with_readonly(true)
            .with_environment(ExecutionEnvironment::docker_exec("abc"))
            .with_interactive_port(13027);

        assert_eq!(config.timeout, Duration::from_secs(3));
        assert!(config.readonly);
        assert!(config.environment.is_containerized());
        assert_eq!(config.interactive_port, Some(13027));
    }
}
