//! Transport seam for the live channel.
//!
//! The client state machine drives any duplex endpoint through these traits.
//! Production uses the WebSocket transport in [`crate::channel::ws`]; tests
//! drive the state machine with the scripted transport in
//! [`crate::channel::mock`].

use async_trait::async_trait;

use crate::types::Result;

/// A single inbound frame from the channel endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON event payload
    Event(String),
    /// Heartbeat response
    Pong,
    /// Server closed the connection
    Close { retryable: bool },
}

/// Connects to the channel endpoint.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ChannelConnection>>;
}

/// One established connection.
#[async_trait]
pub trait ChannelConnection: Send {
    /// Next inbound frame. `Ok(None)` when the stream ended without a close
    /// frame; errors are transport failures.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Send a heartbeat ping.
    async fn send_ping(&mut self) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}
