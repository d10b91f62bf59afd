// Transport endpoint announced through the rendezvous file

use std::fmt;

/// Address the engine reports when it listens on every interface
pub const UNSPECIFIED_ADDRESS: &str = "0.0.0.0";

/// Default reachable address of a local or host-network engine
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

/// Connection string of the engine's request/reply socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    /// Parse rendezvous file content
    ///
    /// Only the first line is used. An unspecified address is rewritten to
    /// `reachable_address`. Returns `None` for empty content (file not fully written).
    pub fn from_rendezvous(content: &str, reachable_address: &str) -> Option<Self> {
        let line = content.lines().next()?.trim();
        if line.is_empty() {
            return None;
        }
        Some(Self(line.replace(UNSPECIFIED_ADDRESS, reachable_address)))
    }

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_unspecified_address() {
        let ep = Endpoint::from_rendezvous("tcp://0.0.0.0:45123\n", "172.17.0.2").unwrap();
        assert_eq!(ep.as_str(), "tcp://172.17.0.2:45123");
    }

    #[test]
    fn test_keeps_concrete_address() {
        let ep = Endpoint::from_rendezvous("tcp://127.0.0.1:1234", LOOPBACK_ADDRESS).unwrap();
        assert_eq!(ep.to_string(), "tcp://127.0.0.1:1234");
    }

    #[test]
    fn test_empty_content() {
        assert!(Endpoint::from_rendezvous("", LOOPBACK_ADDRESS).is_none());
        assert!(Endpoint::from_rendezvous("  \n", LOOPBACK_ADDRESS).is_none());
    }
}
