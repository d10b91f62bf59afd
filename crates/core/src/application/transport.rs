// Request/reply transport
//
// Owns the channel to one engine. Every method that talks to the engine takes
// `&mut self`, so at most one request is ever in flight.

use crate::application::constants::{QUIT_COMMAND, QUIT_GRACE_PERIOD, SEND_ATTEMPTS};
use crate::application::decode::DecoderChain;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{Endpoint, Response};
use crate::error::{AppError, Result};
use crate::port::{EngineChannel, EngineLog, EngineProcess, SendStatus};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Transport lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connected,
    Sending,
    AwaitingReply,
    Closed,
}

pub struct Transport {
    channel: Box<dyn EngineChannel>,
    /// `None` when attached to an engine this client did not start
    process: Option<Box<dyn EngineProcess>>,
    log: Option<Arc<dyn EngineLog>>,
    decoders: DecoderChain,
    send_policy: RetryPolicy,
    state: TransportState,
    /// Send `quit()` on shutdown
    quit_on_shutdown: bool,
}

impl Transport {
    pub fn new(
        channel: Box<dyn EngineChannel>,
        process: Option<Box<dyn EngineProcess>>,
        log: Option<Arc<dyn EngineLog>>,
        timeout: Duration,
    ) -> Self {
        Self {
            channel,
            process,
            log,
            decoders: DecoderChain::standard(),
            send_policy: RetryPolicy::from_timeout(timeout, SEND_ATTEMPTS),
            state: TransportState::Disconnected,
            quit_on_shutdown: true,
        }
    }

    pub fn with_decoders(mut self, decoders: DecoderChain) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn with_send_policy(mut self, policy: RetryPolicy) -> Self {
        self.send_policy = policy;
        self
    }

    /// Whether `shutdown` asks the engine to exit (default: yes)
    pub fn set_quit_on_shutdown(&mut self, quit: bool) {
        self.quit_on_shutdown = quit;
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub async fn connect(&mut self, endpoint: &Endpoint) -> Result<()> {
        if self.state != TransportState::Disconnected {
            return Err(AppError::InvalidState(format!(
                "cannot connect a transport in state {:?}",
                self.state
            )));
        }

        self.channel
            .connect(endpoint)
            .await
            .map_err(|e| AppError::transport(e.to_string(), self.log_contents()))?;
        self.state = TransportState::Connected;
        info!(endpoint = %endpoint, "Connected to engine");
        Ok(())
    }

    /// Send one command and wait for its reply
    ///
    /// `parsed` selects decoding; the raw reply is returned otherwise.
    /// `quit()` closes the transport and returns `null` without waiting.
    ///
    /// # Errors
    /// `AppError::Transport` if the engine is gone, never accepts the message
    /// within the send budget, or the reply cannot be received. The transport
    /// is unusable afterwards.
    pub async fn send(&mut self, command: &str, parsed: bool) -> Result<Response> {
        match self.state {
            TransportState::Connected => {}
            TransportState::Closed => {
                return Err(AppError::InvalidState("transport is closed".to_string()))
            }
            other => {
                return Err(AppError::InvalidState(format!(
                    "transport is not ready for a request (state {:?})",
                    other
                )))
            }
        }

        if let Some(process) = self.process.as_mut() {
            if !process.is_running() {
                return Err(AppError::transport(
                    "engine process is not running",
                    self.log_contents(),
                ));
            }
        }

        self.state = TransportState::Sending;
        self.send_with_retry(command).await?;

        if command.trim() == QUIT_COMMAND {
            self.channel.close();
            self.state = TransportState::Closed;
            info!("Engine asked to quit, transport closed");
            return Ok(Response::Value(Value::Null));
        }

        self.state = TransportState::AwaitingReply;
        let reply = self
            .channel
            .recv()
            .await
            .map_err(|e| AppError::transport(e.to_string(), self.log_contents()))?;
        self.state = TransportState::Connected;

        debug!(command = %command, bytes = reply.len(), "Received engine reply");

        if parsed {
            Ok(self.decoders.decode(&reply))
        } else {
            Ok(Response::Raw(reply))
        }
    }

    async fn send_with_retry(&mut self, command: &str) -> Result<()> {
        let mut failures = 0;
        loop {
            let status = self
                .channel
                .try_send(command)
                .await
                .map_err(|e| AppError::transport(e.to_string(), self.log_contents()))?;

            if status == SendStatus::Sent {
                return Ok(());
            }

            failures += 1;
            match self.send_policy.decide(failures) {
                RetryDecision::Retry(delay) => {
                    debug!(attempt = failures, "Engine not accepting requests yet, retrying");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    return Err(AppError::transport(
                        format!(
                            "no connection with the engine after {} attempts; \
                             the engine process may have died or hung",
                            failures
                        ),
                        self.log_contents(),
                    ));
                }
            }
        }
    }

    /// Stop the engine and release everything the transport owns
    ///
    /// Sends `quit()` best-effort unless disabled, closes the log, waits a
    /// short grace period and kills the engine if it is still running. Safe to
    /// call repeatedly.
    pub async fn shutdown(&mut self) {
        if self.quit_on_shutdown && self.state == TransportState::Connected {
            if let Err(e) = self.send(QUIT_COMMAND, false).await {
                debug!(error = %e, "quit() failed during shutdown");
            }
        }
        if self.state != TransportState::Closed {
            self.channel.close();
            self.state = TransportState::Closed;
        }

        if let Some(log) = self.log.take() {
            log.close();
        }

        if let Some(mut process) = self.process.take() {
            if process.wait_timeout(QUIT_GRACE_PERIOD).await {
                info!(pid = ?process.id(), "Engine exited");
            } else {
                warn!(pid = ?process.id(), "Engine still running after quit(), killing it");
                if let Err(e) = process.kill().await {
                    warn!(pid = ?process.id(), error = %e, "Failed to kill engine");
                }
            }
        }
    }

    fn log_contents(&self) -> String {
        self.log
            .as_ref()
            .map(|log| log.contents())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::engine_channel::mocks::MockChannel;
    use crate::port::engine_log::mocks::MockEngineLog;
    use crate::port::engine_process::mocks::MockEngineProcess;
    use serde_json::json;

    async fn connected(channel: MockChannel) -> Transport {
        let mut transport = Transport::new(
            Box::new(channel),
            Some(Box::new(MockEngineProcess::new(7))),
            Some(Arc::new(MockEngineLog::new("engine log"))),
            Duration::from_millis(50),
        );
        transport
            .connect(&Endpoint::new("tcp://127.0.0.1:1"))
            .await
            .unwrap();
        transport
    }

    #[tokio::test]
    async fn test_send_decodes_reply() {
        let mut transport = connected(MockChannel::new(["{1, 2}\n"])).await;

        let response = transport.send("getVersion()", true).await.unwrap();
        assert_eq!(response, Response::Value(json!([1, 2])));
        assert_eq!(transport.state(), TransportState::Connected);
    }

    #[tokio::test]
    async fn test_send_raw() {
        let mut transport = connected(MockChannel::new(["\"v1.22\"\n"])).await;

        let response = transport.send("getVersion()", false).await.unwrap();
        assert_eq!(response, Response::Raw("\"v1.22\"\n".to_string()));
    }

    #[tokio::test]
    async fn test_retries_would_block_then_sends() {
        let channel = MockChannel::new(["true"]).blocked_for(3);
        let state = channel.state();
        let mut transport = connected(channel).await;

        transport.send("loadModel(M)", true).await.unwrap();
        let state = state.lock().unwrap();
        assert_eq!(state.send_attempts, 4);
        assert_eq!(state.sent, vec!["loadModel(M)".to_string()]);
    }

    #[tokio::test]
    async fn test_never_ready_exhausts_budget() {
        let channel = MockChannel::never_ready();
        let state = channel.state();
        let mut transport = connected(channel).await;

        let err = transport.send("getVersion()", true).await.unwrap_err();
        assert!(matches!(err, AppError::Transport { ref log, .. } if log == "engine log"));
        assert_eq!(state.lock().unwrap().send_attempts, SEND_ATTEMPTS as usize);

        // A failed call leaves the transport unusable
        assert!(matches!(
            transport.send("getVersion()", true).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_dead_engine_fails_fast() {
        let channel = MockChannel::new(["true"]);
        let state = channel.state();
        let process = MockEngineProcess::new(7);
        process.state().lock().unwrap().running = false;

        let mut transport = Transport::new(
            Box::new(channel),
            Some(Box::new(process)),
            None,
            Duration::from_millis(50),
        );
        transport
            .connect(&Endpoint::new("tcp://127.0.0.1:1"))
            .await
            .unwrap();

        let err = transport.send("getVersion()", true).await.unwrap_err();
        assert!(matches!(err, AppError::Transport { .. }));
        assert_eq!(state.lock().unwrap().send_attempts, 0);
    }

    #[tokio::test]
    async fn test_quit_closes_without_reply() {
        let channel = MockChannel::new(Vec::<String>::new());
        let state = channel.state();
        let mut transport = connected(channel).await;

        let response = transport.send("quit()", true).await.unwrap();
        assert_eq!(response, Response::Value(Value::Null));
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(state.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn test_shutdown_closes_log_once_and_kills_stubborn_engine() {
        let process = MockEngineProcess::stubborn(9);
        let process_state = process.state();
        let log = Arc::new(MockEngineLog::new(""));
        let mut transport = Transport::new(
            Box::new(MockChannel::new(Vec::<String>::new())),
            Some(Box::new(process)),
            Some(log.clone()),
            Duration::from_millis(50),
        );
        transport
            .connect(&Endpoint::new("tcp://127.0.0.1:1"))
            .await
            .unwrap();

        transport.shutdown().await;
        transport.shutdown().await;

        assert_eq!(log.close_calls(), 1);
        assert!(process_state.lock().unwrap().killed);
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_without_quit_leaves_engine_alone() {
        let channel = MockChannel::new(Vec::<String>::new());
        let channel_state = channel.state();
        let mut transport = Transport::new(Box::new(channel), None, None, Duration::from_millis(50));
        transport.set_quit_on_shutdown(false);
        transport
            .connect(&Endpoint::new("tcp://127.0.0.1:1"))
            .await
            .unwrap();

        transport.shutdown().await;

        let channel_state = channel_state.lock().unwrap();
        assert!(channel_state.sent.is_empty());
        assert!(channel_state.closed);
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_lets_cooperative_engine_exit() {
        let process = MockEngineProcess::new(9);
        let process_state = process.state();
        let mut transport = Transport::new(
            Box::new(MockChannel::new(Vec::<String>::new())),
            Some(Box::new(process)),
            None,
            Duration::from_millis(50),
        );

        // Never connected: no quit() is attempted
        transport.shutdown().await;
        let process_state = process_state.lock().unwrap();
        assert!(!process_state.killed);
        assert!(!process_state.running);
    }
}
