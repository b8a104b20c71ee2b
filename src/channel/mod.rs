//! Live channel client.
//!
//! Owns the persistent connection lifecycle: connect, heartbeat,
//! fixed-interval reconnect, teardown. Inbound frames decode into
//! [`LiveEvent`]s and go straight to the router; the connection state is owned
//! here and read-only everywhere else.
//!
//! State machine: `connecting -> connected -> disconnected -> connecting
//! (after the retry interval) -> ...`. A non-retryable server close reaches
//! `error`, then settles at `disconnected` so the host can request a manual
//! reconnect. Once the attempt cap is hit the client stays `disconnected`
//! until [`LiveChannelClient::reconnect`].

pub mod mock;
pub mod transport;
pub mod ws;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::events::router::EventRouter;
use crate::events::LiveEvent;

use transport::{ChannelConnection, ChannelTransport, Frame};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

type StateListener = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// Why a read loop ended.
enum ReadOutcome {
    /// Transport-level drop; schedule a reconnect
    Retryable,
    /// Server refused the connection for good
    Fatal,
    /// Host tore the client down
    Shutdown,
}

/// Live channel client handle.
#[derive(Clone)]
pub struct LiveChannelClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn ChannelTransport>,
    router: Arc<EventRouter>,
    config: ChannelConfig,
    state: Mutex<ConnectionState>,
    listeners: Mutex<Vec<StateListener>>,
    shutdown_tx: watch::Sender<bool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LiveChannelClient {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        router: Arc<EventRouter>,
        config: ChannelConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ClientInner {
                transport,
                router,
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                listeners: Mutex::new(Vec::new()),
                shutdown_tx,
                task: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener invoked synchronously on every state transition,
    /// before any further inbound message is processed.
    pub fn on_state_change(&self, listener: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    fn set_state(&self, next: ConnectionState) {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *state = next;
        }
        debug!("Channel state: {next}");
        let listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(next);
        }
    }

    /// Start connecting. At most one connection is active per client; a
    /// pending or established connection is torn down first.
    pub async fn connect(&self) {
        let mut task = self.inner.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
            debug!("Tore down previous channel connection task");
        }
        let _ = self.inner.shutdown_tx.send(false);

        let client = self.clone();
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(async move {
            client.run(shutdown_rx).await;
        }));
    }

    /// Explicit reconnect request, e.g. after the attempt cap was reached.
    pub async fn reconnect(&self) {
        info!("Explicit reconnect requested");
        self.connect().await;
    }

    /// Tear the client down and cancel any pending reconnect.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        if let Some(handle) = self.inner.task.lock().await.take() {
            handle.abort();
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Channel client shut down");
    }

    /// Connection loop: connect, read until the connection drops, retry at
    /// the configured interval up to the attempt cap.
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let retry_interval = Duration::from_millis(self.inner.config.retry_interval_ms);
        let connect_timeout = Duration::from_millis(self.inner.config.connect_timeout_ms);
        let mut attempts: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return;
            }

            self.set_state(ConnectionState::Connecting);
            attempts += 1;

            match tokio::time::timeout(connect_timeout, self.inner.transport.connect()).await {
                Ok(Ok(conn)) => {
                    attempts = 0;
                    info!("Channel connected");
                    self.set_state(ConnectionState::Connected);

                    match self.read_loop(conn, &mut shutdown).await {
                        ReadOutcome::Retryable => {
                            self.set_state(ConnectionState::Disconnected);
                        }
                        ReadOutcome::Fatal => {
                            self.set_state(ConnectionState::Error);
                            self.set_state(ConnectionState::Disconnected);
                            return;
                        }
                        ReadOutcome::Shutdown => {
                            self.set_state(ConnectionState::Disconnected);
                            return;
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("Channel connect failed: {e}");
                }
                Err(_) => {
                    warn!(
                        "Channel connect timed out after {}ms",
                        self.inner.config.connect_timeout_ms
                    );
                }
            }

            if attempts >= self.inner.config.max_reconnect_attempts {
                warn!(
                    "Reconnect cap ({}) reached, staying disconnected until requested",
                    self.inner.config.max_reconnect_attempts
                );
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(retry_interval) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Read frames until the connection ends. Events are routed in the order
    /// received; a missed heartbeat pong drops the connection.
    async fn read_loop(
        &self,
        mut conn: Box<dyn ChannelConnection>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ReadOutcome {
        let period = Duration::from_secs(self.inner.config.heartbeat_interval_secs);
        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut awaiting_pong = false;

        enum Step {
            Frame(crate::types::Result<Option<Frame>>),
            Heartbeat,
            Shutdown,
        }

        loop {
            let step = tokio::select! {
                biased;
                _ = shutdown.changed() => Step::Shutdown,
                frame = conn.next_frame() => Step::Frame(frame),
                _ = heartbeat.tick() => Step::Heartbeat,
            };

            match step {
                Step::Shutdown => {
                    let _ = conn.close().await;
                    return ReadOutcome::Shutdown;
                }
                Step::Heartbeat => {
                    if awaiting_pong {
                        warn!("Heartbeat pong missed, dropping connection");
                        return ReadOutcome::Retryable;
                    }
                    if let Err(e) = conn.send_ping().await {
                        warn!("Heartbeat ping failed: {e}");
                        return ReadOutcome::Retryable;
                    }
                    awaiting_pong = true;
                }
                Step::Frame(Ok(Some(Frame::Event(raw)))) => match LiveEvent::from_wire(&raw) {
                    Ok(event) => self.inner.router.route(event),
                    Err(e) => warn!("Dropping malformed channel message: {e}"),
                },
                Step::Frame(Ok(Some(Frame::Pong))) => {
                    awaiting_pong = false;
                }
                Step::Frame(Ok(Some(Frame::Close { retryable: false }))) => {
                    warn!("Channel closed with non-retryable code");
                    return ReadOutcome::Fatal;
                }
                Step::Frame(Ok(Some(Frame::Close { retryable: true }))) | Step::Frame(Ok(None)) => {
                    info!("Channel closed by server");
                    return ReadOutcome::Retryable;
                }
                Step::Frame(Err(e)) => {
                    warn!("Channel read failed: {e}");
                    return ReadOutcome::Retryable;
                }
            }
        }
    }
}
