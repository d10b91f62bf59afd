// Session constants (no magic values)
use std::time::Duration;

/// Default budget for launch, discovery and each request (10s)
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Rendezvous file polls per timeout
pub const DISCOVERY_ATTEMPTS: u32 = 80;

/// Non-blocking send attempts per timeout
pub const SEND_ATTEMPTS: u32 = 50;

/// Container id file and container process listing polls per timeout
pub const CONTAINER_POLL_ATTEMPTS: u32 = 40;

/// Time the engine gets to exit after `quit()` before it is killed (2s)
pub const QUIT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Reserved control message; no reply follows
pub const QUIT_COMMAND: &str = "quit()";

/// Stateful query that is never served from the response cache
pub const ERROR_STRING_QUESTION: &str = "getErrorString";

/// Log file kind of an interactive engine session
pub const SESSION_LOG_KIND: &str = "port";
