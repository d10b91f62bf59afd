// ZeroMQ request/reply channel
// reason: zeromq (pure Rust, tokio-native) REQ socket, one peer, one request in flight
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage};

use omlink_core::application::constants::DEFAULT_SESSION_TIMEOUT;
use omlink_core::domain::Endpoint;
use omlink_core::port::{ChannelError, EngineChannel, SendStatus};

/// REQ socket connected to one engine
///
/// Closing drops the socket immediately, discarding anything not yet sent.
pub struct ZmqChannel {
    socket: Option<ReqSocket>,
    send_timeout: Duration,
}

impl ZmqChannel {
    pub fn new() -> Self {
        Self {
            socket: None,
            send_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Upper bound for flushing one accepted request to the engine
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    fn socket(&mut self) -> Result<&mut ReqSocket, ChannelError> {
        self.socket.as_mut().ok_or(ChannelError::Closed)
    }
}

impl Default for ZmqChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineChannel for ZmqChannel {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), ChannelError> {
        let mut socket = ReqSocket::new();
        socket
            .connect(endpoint.as_str())
            .await
            .map_err(|e| ChannelError::Connect(format!("{}: {}", endpoint, e)))?;
        debug!(endpoint = %endpoint, "REQ socket connected");
        self.socket = Some(socket);
        Ok(())
    }

    /// `WouldBlock` only when the socket refused the request up front.
    ///
    /// A send that was accepted is awaited to completion: cancelling it midway
    /// may still deliver the frame, so a retry would duplicate the request.
    async fn try_send(&mut self, message: &str) -> Result<SendStatus, ChannelError> {
        let send_timeout = self.send_timeout;
        let socket = self.socket()?;
        let message = ZmqMessage::from(message.to_string());

        match tokio::time::timeout(send_timeout, socket.send(message)).await {
            Ok(Ok(())) => Ok(SendStatus::Sent),
            // No peer connected yet, or a request already in flight
            Ok(Err(ZmqError::ReturnToSender { reason, .. })) => {
                debug!(reason = %reason, "Send would block");
                Ok(SendStatus::WouldBlock)
            }
            Ok(Err(e)) => Err(ChannelError::Send(e.to_string())),
            Err(_) => {
                // Delivery state unknown; the socket can no longer pair replies
                warn!(
                    timeout_ms = send_timeout.as_millis() as u64,
                    "Send timed out, closing socket"
                );
                self.socket = None;
                Err(ChannelError::Send(format!(
                    "request not flushed within {}ms",
                    send_timeout.as_millis()
                )))
            }
        }
    }

    async fn recv(&mut self) -> Result<String, ChannelError> {
        let socket = self.socket()?;
        let reply = socket
            .recv()
            .await
            .map_err(|e| ChannelError::Receive(e.to_string()))?;
        String::try_from(reply).map_err(|e| ChannelError::Receive(e.to_string()))
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("REQ socket closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeromq::RepSocket;

    async fn bound_server() -> (RepSocket, Endpoint) {
        let mut server = RepSocket::new();
        let endpoint = server.bind("tcp://127.0.0.1:0").await.unwrap();
        (server, Endpoint::new(endpoint.to_string()))
    }

    async fn send_until_sent(channel: &mut ZmqChannel, message: &str) {
        for _ in 0..100 {
            if channel.try_send(message).await.unwrap() == SendStatus::Sent {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("request was never accepted");
    }

    #[tokio::test]
    async fn test_request_reply_roundtrip() {
        let (mut server, endpoint) = bound_server().await;

        let server_task = tokio::spawn(async move {
            let request = server.recv().await.unwrap();
            assert_eq!(String::try_from(request).unwrap(), "getVersion()");
            server
                .send(ZmqMessage::from("\"v1.22.0\"".to_string()))
                .await
                .unwrap();
        });

        let mut channel = ZmqChannel::new();
        channel.connect(&endpoint).await.unwrap();

        send_until_sent(&mut channel, "getVersion()").await;
        assert_eq!(channel.recv().await.unwrap(), "\"v1.22.0\"");

        server_task.await.unwrap();
        channel.close();
        assert!(matches!(
            channel.try_send("quit()").await,
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_large_request_delivered_once() {
        let (mut server, endpoint) = bound_server().await;

        let server_task = tokio::spawn(async move {
            let mut lengths = Vec::new();
            for n in 1..=2 {
                let request = server.recv().await.unwrap();
                lengths.push(String::try_from(request).unwrap().len());
                server
                    .send(ZmqMessage::from(format!("reply{}", n)))
                    .await
                    .unwrap();
            }
            lengths
        });

        let mut channel = ZmqChannel::new();
        channel.connect(&endpoint).await.unwrap();

        let big = "x".repeat(8 * 1024 * 1024);
        send_until_sent(&mut channel, &big).await;
        assert_eq!(channel.recv().await.unwrap(), "reply1");

        send_until_sent(&mut channel, "next()").await;
        assert_eq!(channel.recv().await.unwrap(), "reply2");

        let lengths = server_task.await.unwrap();
        assert_eq!(lengths, vec![big.len(), "next()".len()]);
    }

    #[tokio::test]
    async fn test_second_request_in_flight_would_block() {
        let (mut server, endpoint) = bound_server().await;
        let server_task = tokio::spawn(async move {
            server.recv().await.unwrap();
            server
        });

        let mut channel = ZmqChannel::new();
        channel.connect(&endpoint).await.unwrap();
        send_until_sent(&mut channel, "first()").await;

        let status = channel.try_send("second()").await.unwrap();
        assert_eq!(status, SendStatus::WouldBlock);
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_unconnected_channel_is_closed() {
        let mut channel = ZmqChannel::new();
        assert!(matches!(channel.recv().await, Err(ChannelError::Closed)));
    }
}
