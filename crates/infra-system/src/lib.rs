// omlink Infrastructure - System Adapters
// Implements: EngineHost, EngineProcess, EngineLog, ModelRunner

pub mod engine_host;
pub mod log_file;
pub mod process_handle;
pub mod subprocess_runner;

pub use engine_host::SystemEngineHost;
pub use log_file::EngineLogFile;
pub use process_handle::{ChildProcess, HostPidProcess};
pub use subprocess_runner::SubprocessRunner;
