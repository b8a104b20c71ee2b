//! Scripted transport for exercising the channel state machine in tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::types::{HearthError, Result};

use super::transport::{ChannelConnection, ChannelTransport, Frame};

/// One scripted connect outcome.
#[derive(Debug, Clone)]
pub enum ScriptedConnect {
    /// The connect attempt fails
    Fail,
    /// The connect succeeds and the connection serves these frames in order.
    /// After the last frame the connection stays open (pending) until torn
    /// down, unless the script ends with a close.
    Serve(Vec<Frame>),
}

/// Transport that plays back a fixed script of connect outcomes.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedConnect>>,
    connect_attempts: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ScriptedConnect>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            connect_attempts: AtomicU32::new(0),
        }
    }

    /// How many connect attempts were made.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelTransport for ScriptedTransport {
    async fn connect(&self) -> Result<Box<dyn ChannelConnection>> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            Some(ScriptedConnect::Serve(frames)) => Ok(Box::new(ScriptedConnection {
                frames: frames.into(),
                pongs_owed: 0,
            })),
            Some(ScriptedConnect::Fail) => {
                Err(HearthError::Transport("scripted connect failure".to_string()))
            }
            None => Err(HearthError::Transport("script exhausted".to_string())),
        }
    }
}

struct ScriptedConnection {
    frames: VecDeque<Frame>,
    /// Pings received but not yet answered; answered before serving frames,
    /// like a real endpoint that responds to pings promptly
    pongs_owed: u32,
}

#[async_trait]
impl ChannelConnection for ScriptedConnection {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.pongs_owed > 0 {
            self.pongs_owed -= 1;
            return Ok(Some(Frame::Pong));
        }
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            // Stay connected until the client tears the connection down.
            None => std::future::pending::<Result<Option<Frame>>>().await,
        }
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.pongs_owed += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.frames.clear();
        Ok(())
    }
}
