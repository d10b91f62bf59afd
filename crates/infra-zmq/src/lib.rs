// omlink Infrastructure - ZeroMQ Adapter
// Implements: EngineChannel

pub mod channel;

pub use channel::ZmqChannel;
