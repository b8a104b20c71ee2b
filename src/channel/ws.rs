//! WebSocket transport backed by tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::types::{HearthError, Result};

use super::transport::{ChannelConnection, ChannelTransport, Frame};

/// WebSocket channel transport.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn ChannelConnection>> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| HearthError::Transport(format!("Failed to connect to {}: {e}", self.url)))?;

        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// Close codes that indicate the server will not accept a reconnect
/// (policy rejection, protocol mismatch).
fn close_is_retryable(code: CloseCode) -> bool {
    !matches!(
        code,
        CloseCode::Policy | CloseCode::Protocol | CloseCode::Unsupported
    )
}

#[async_trait]
impl ChannelConnection for WsConnection {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => {
                    return Err(HearthError::Transport(format!("WebSocket read failed: {e}")))
                }
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Event(text))),
                Some(Ok(Message::Pong(_))) => return Ok(Some(Frame::Pong)),
                Some(Ok(Message::Ping(payload))) => {
                    self.stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| HearthError::Transport(format!("Pong send failed: {e}")))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let retryable = frame
                        .map(|f| close_is_retryable(f.code))
                        .unwrap_or(true);
                    return Ok(Some(Frame::Close { retryable }));
                }
                // Binary frames are not part of the channel protocol
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.stream
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| HearthError::Transport(format!("Ping send failed: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.stream.close(None).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_retryability() {
        assert!(close_is_retryable(CloseCode::Normal));
        assert!(close_is_retryable(CloseCode::Away));
        assert!(!close_is_retryable(CloseCode::Policy));
        assert!(!close_is_retryable(CloseCode::Protocol));
    }
}
