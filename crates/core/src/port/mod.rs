// Port Layer - Interfaces for external dependencies

pub mod engine_channel;
pub mod engine_host;
pub mod engine_log;
pub mod engine_process;
pub mod id_provider; // For deterministic testing
pub mod model_runner;
pub mod response_decoder;
pub mod time_provider;

// Re-exports
pub use engine_channel::{ChannelError, EngineChannel, SendStatus};
pub use engine_host::{EngineHost, LaunchRequest, LaunchedEngine};
pub use engine_log::EngineLog;
pub use engine_process::EngineProcess;
pub use id_provider::{IdProvider, UuidProvider};
pub use model_runner::{ExecutionError, ExecutionOutcome, ModelRunner};
pub use response_decoder::{DecodeError, ResponseDecoder};
pub use time_provider::{SystemTimeProvider, TimeProvider};
