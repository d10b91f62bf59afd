// Domain Layer - Pure types and rules

pub mod args;
pub mod endpoint;
pub mod environment;
pub mod execution;
pub mod identity;
pub mod response;

// Re-exports
pub use args::{ArgInput, ArgValue, ArgumentSet, OverrideValue, OVERRIDE_KEY, RESULT_FILE_KEY};
pub use endpoint::{Endpoint, LOOPBACK_ADDRESS, UNSPECIFIED_ADDRESS};
pub use environment::{DockerNetwork, ExecutionEnvironment, LaunchContext, CONTAINER_RUNTIME};
pub use execution::{ExecutionDescriptor, ExecutionTarget, ModelExecution};
pub use identity::{HostIdentity, HostPlatform, SessionFiles, SessionToken};
pub use response::Response;
