// Application Layer - Session services and use cases

pub mod cache;
pub mod config;
pub mod constants;
pub mod decode;
pub mod discovery;
pub mod retry;
pub mod session;
pub mod transport;

// Re-exports
pub use cache::ResponseCache;
pub use config::SessionConfig;
pub use decode::{DecoderChain, LooseDecoder, TypedDecoder};
pub use discovery::{EndpointDiscovery, RendezvousTarget};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::OmcSession;
pub use transport::{Transport, TransportState};
