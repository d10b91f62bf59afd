// Engine Channel Port
// One request/reply socket to one engine

use crate::domain::Endpoint;
use async_trait::async_trait;
use thiserror::Error;

/// Outcome of a non-blocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    /// The peer is not accepting yet; try again later
    WouldBlock,
}

/// Channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Channel is closed")]
    Closed,
}

/// Request/reply channel trait
///
/// Implementations:
/// - ZmqChannel: ZeroMQ REQ socket
///
/// Exactly one `recv` must follow every successful `try_send`.
#[async_trait]
pub trait EngineChannel: Send {
    /// Connect to the engine endpoint
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), ChannelError>;

    /// Attempt to send one message without waiting for the peer
    async fn try_send(&mut self, message: &str) -> Result<SendStatus, ChannelError>;

    /// Block until the single reply arrives
    async fn recv(&mut self) -> Result<String, ChannelError>;

    /// Drop the socket, discarding unsent messages
    fn close(&mut self);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Observable state of a [`MockChannel`]
    #[derive(Debug, Default)]
    pub struct MockChannelState {
        pub endpoint: Option<String>,
        pub send_attempts: usize,
        pub sent: Vec<String>,
        pub closed: bool,
    }

    /// Scripted channel
    ///
    /// Reports `WouldBlock` for the first `blocked_sends` attempts (or forever),
    /// then answers each sent message with the next queued reply.
    pub struct MockChannel {
        blocked_sends: Option<usize>,
        replies: VecDeque<String>,
        state: Arc<Mutex<MockChannelState>>,
    }

    impl MockChannel {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                blocked_sends: Some(0),
                replies: replies.into_iter().map(Into::into).collect(),
                state: Arc::new(Mutex::new(MockChannelState::default())),
            }
        }

        /// Peer that never accepts a message
        pub fn never_ready() -> Self {
            let mut channel = Self::new(Vec::<String>::new());
            channel.blocked_sends = None;
            channel
        }

        pub fn blocked_for(mut self, attempts: usize) -> Self {
            self.blocked_sends = Some(attempts);
            self
        }

        pub fn state(&self) -> Arc<Mutex<MockChannelState>> {
            Arc::clone(&self.state)
        }
    }

    #[async_trait]
    impl EngineChannel for MockChannel {
        async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), ChannelError> {
            self.state.lock().unwrap().endpoint = Some(endpoint.to_string());
            Ok(())
        }

        async fn try_send(&mut self, message: &str) -> Result<SendStatus, ChannelError> {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(ChannelError::Closed);
            }
            state.send_attempts += 1;

            match self.blocked_sends {
                None => Ok(SendStatus::WouldBlock),
                Some(n) if state.send_attempts <= n => Ok(SendStatus::WouldBlock),
                Some(_) => {
                    state.sent.push(message.to_string());
                    Ok(SendStatus::Sent)
                }
            }
        }

        async fn recv(&mut self) -> Result<String, ChannelError> {
            self.replies
                .pop_front()
                .ok_or_else(|| ChannelError::Receive("no scripted reply".to_string()))
        }

        fn close(&mut self) {
            self.state.lock().unwrap().closed = true;
        }
    }
}
