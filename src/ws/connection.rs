#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt::{self, Debug};
use std::io;
use std::iter;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config, tungstenite::Message,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use super::config::{Config, Heartbeat, ReconnectConfig};
use super::error::WsError;
use super::traits::MessageParser;
use crate::{Result, error::Error};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Broadcast channel capacity for incoming messages.
const BROADCAST_CAPACITY: usize = 1024;

/// Upper bound on the opening handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the peer to answer our close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest inbound message accepted before the connection is dropped.
const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Connection state tracking.
///
/// ```text
/// Idle --connect()--> Connecting --open--> Open --close(1001)--> Closed (terminal)
///                                           Open --close(other)--> Closed --timer--> Connecting
///                                           Open --disconnect()--> Closing --> Closed (terminal)
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Idle,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// `disconnect()` sent a close frame; waiting for the peer to answer
    Closing,
    /// The last connection (or connection attempt) ended
    Closed {
        event: CloseEvent,
        /// A reconnect timer is pending
        reconnecting: bool,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Closed with no reconnect scheduled. Only [`ConnectionManager::connect`]
    /// leaves this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed {
                reconnecting: false,
                ..
            }
        )
    }

    /// The event that ended the last connection, if the state is [`ConnectionState::Closed`].
    #[must_use]
    pub const fn close_event(&self) -> Option<&CloseEvent> {
        match self {
            Self::Closed { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Close code and reason reported when a connection ends.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

impl CloseEvent {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away. The session ended on purpose and is not retried.
    pub const GOING_AWAY: u16 = 1001;
    /// Close frame without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;

    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub(crate) fn abnormal<S: Into<String>>(reason: S) -> Self {
        Self::new(Self::ABNORMAL, reason)
    }

    pub(crate) fn going_away() -> Self {
        Self::new(Self::GOING_AWAY, "Going away")
    }

    /// Whether this close ends the session for good.
    #[must_use]
    pub const fn is_going_away(&self) -> bool {
        self.code == Self::GOING_AWAY
    }
}

impl From<Option<CloseFrame>> for CloseEvent {
    fn from(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self::new(u16::from(frame.code), frame.reason.as_str()),
            None => Self::new(Self::NO_STATUS, ""),
        }
    }
}

impl fmt::Display for CloseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.reason)
    }
}

/// Frames handed from the public API to the driver task.
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// Manages WebSocket connection lifecycle, reconnection, and heartbeat.
///
/// This generic connection manager handles all WebSocket connection concerns:
/// - Establishing connections on request via [`ConnectionManager::connect`]
/// - Deciding whether to reconnect from the close code (1001 is terminal)
/// - Heartbeat monitoring via PING/PONG frames
/// - Broadcasting parsed messages to multiple subscribers
///
/// One background task drives the transport; every open, close, message and
/// timer event is handled inside it, one at a time.
///
/// # Type Parameters
///
/// - `M`: Message type that implements [`DeserializeOwned`] among other "helper" types
/// - `P`: Parser type that implements [`MessageParser<M>`]
///
/// # Example
///
/// ```ignore
/// let connection = ConnectionManager::new(
///     "wss://example.com/planes".to_owned(),
///     config,
///     parser,
/// )?;
/// connection.connect()?;
///
/// // Subscribe to messages
/// let mut rx = connection.subscribe();
/// while let Ok(msg) = rx.recv().await {
///     println!("Received: {:?}", msg);
/// }
/// ```
#[derive(Clone)]
pub struct ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Clone + Send + 'static,
    P: MessageParser<M>,
{
    /// Watch channel sender for state changes (enables reconnection detection)
    state_tx: watch::Sender<ConnectionState>,
    /// Watch channel receiver for state changes (for use in checking the current state)
    state_rx: watch::Receiver<ConnectionState>,
    /// Sender channel for outgoing frames
    sender_tx: mpsc::UnboundedSender<Outgoing>,
    /// Broadcast sender for incoming messages
    broadcast_tx: broadcast::Sender<M>,
    /// Stops the driver task once the last handle is dropped
    _shutdown: Arc<DropGuard>,
    /// Phantom data for unused type parameters
    _phantom: PhantomData<P>,
}

impl<M, P> ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Clone + Send + 'static,
    P: MessageParser<M>,
{
    /// Create a new connection manager in the [`ConnectionState::Idle`] state.
    ///
    /// The `parser` is used to deserialize incoming WebSocket messages. The
    /// driver task is spawned immediately but does not dial until
    /// [`ConnectionManager::connect`] is called. Must be called from within a
    /// Tokio runtime.
    pub fn new(endpoint: String, config: Config, parser: P) -> Result<Self> {
        // Fail fast on a bad endpoint or subprotocol instead of on every dial
        _ = client_request(&endpoint, &config.subprotocol)?;

        let (sender_tx, sender_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let shutdown = CancellationToken::new();

        let driver = Driver {
            endpoint,
            config,
            parser,
            sender_rx,
            broadcast_tx: broadcast_tx.clone(),
            state_tx: state_tx.clone(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(driver.run());

        Ok(Self {
            state_tx,
            state_rx,
            sender_tx,
            broadcast_tx,
            _shutdown: Arc::new(shutdown.drop_guard()),
            _phantom: PhantomData,
        })
    }

    /// Start connecting.
    ///
    /// Valid from [`ConnectionState::Idle`] and [`ConnectionState::Closed`]. A
    /// pending reconnect timer is superseded: the dial happens now and the
    /// timer is discarded.
    pub fn connect(&self) -> Result<()> {
        let mut outcome = Ok(());
        self.state_tx.send_if_modified(|state| match state {
            ConnectionState::Idle | ConnectionState::Closed { .. } => {
                *state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Connecting => {
                outcome = Err(WsError::AlreadyConnecting);
                false
            }
            ConnectionState::Open { .. } | ConnectionState::Closing => {
                outcome = Err(WsError::AlreadyOpen);
                false
            }
        });
        outcome.map_err(Error::from)
    }

    /// Close the open connection with code 1001 ("going away").
    ///
    /// The state moves to [`ConnectionState::Closing`] at once, so later sends
    /// fail with [`WsError::NotConnected`]. The session ends in a terminal
    /// [`ConnectionState::Closed`]; no reconnect is scheduled. Call
    /// [`ConnectionManager::connect`] to start over.
    pub fn disconnect(&self) -> Result<()> {
        let closing = self.state_tx.send_if_modified(|state| {
            if state.is_open() {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        });
        if !closing {
            return Err(WsError::NotConnected.into());
        }

        self.sender_tx
            .send(Outgoing::Close)
            .map_err(|_e| WsError::NotConnected)?;
        Ok(())
    }

    /// Serialize `request` and send it as a text frame.
    ///
    /// Fails with [`WsError::NotConnected`] unless the connection is open.
    /// Nothing is buffered for later delivery.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        if !self.is_open() {
            return Err(WsError::NotConnected.into());
        }
        let json = serde_json::to_string(request)?;
        self.sender_tx
            .send(Outgoing::Text(json))
            .map_err(|_e| WsError::NotConnected)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state_rx.borrow().is_open()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to incoming messages.
    ///
    /// Each call returns a new independent receiver. Multiple subscribers can
    /// receive messages concurrently without blocking each other.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<M> {
        self.broadcast_tx.subscribe()
    }

    /// Subscribe to connection state changes.
    ///
    /// Returns a receiver that notifies when the connection state changes.
    /// This is useful for detecting reconnections and re-establishing subscriptions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

/// Build the opening handshake request, advertising `subprotocol`.
fn client_request(endpoint: &str, subprotocol: &str) -> Result<Request> {
    let url = Url::parse(endpoint)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(Error::validation(format!(
            "endpoint {endpoint} must use the ws:// or wss:// scheme"
        )));
    }
    if subprotocol.is_empty() {
        return Err(Error::validation("subprotocol cannot be empty"));
    }

    let mut request = endpoint.into_client_request()?;
    _ = request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(subprotocol)?);
    Ok(request)
}

/// Decides whether and when to dial again after a close.
struct ReconnectPolicy {
    backoff: Box<dyn Backoff + Send>,
    max_attempts: Option<u32>,
    /// Consecutive attempts that never reached [`ConnectionState::Open`]
    failures: u32,
}

impl ReconnectPolicy {
    fn new(config: &ReconnectConfig) -> Self {
        Self {
            backoff: config.strategy.into(),
            max_attempts: config.max_attempts,
            failures: 0,
        }
    }

    fn reset(&mut self) {
        self.failures = 0;
        self.backoff.reset();
    }

    /// Delay before the next attempt, or `None` when the session is over.
    fn next_delay(&mut self, close: &CloseEvent, opened: bool) -> Option<Duration> {
        if close.is_going_away() {
            return None;
        }
        if !opened {
            self.failures = self.failures.saturating_add(1);
        }
        if let Some(max) = self.max_attempts
            && self.failures >= max
        {
            return None;
        }
        self.backoff.next_backoff()
    }
}

enum HeartbeatAction {
    Ping,
    Expired,
}

/// PING schedule and PONG deadline for one connection.
struct HeartbeatTimer {
    ping: Option<Interval>,
    timeout: Duration,
    deadline: Option<time::Instant>,
}

impl HeartbeatTimer {
    fn new(heartbeat: Heartbeat) -> Self {
        match heartbeat {
            Heartbeat::Enabled { interval, timeout } => {
                let mut ping = time::interval_at(time::Instant::now() + interval, interval);
                ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Self {
                    ping: Some(ping),
                    timeout,
                    deadline: None,
                }
            }
            Heartbeat::Disabled => Self {
                ping: None,
                timeout: Duration::ZERO,
                deadline: None,
            },
        }
    }

    /// Resolves when a PING is due or the outstanding PONG is overdue. Cancel safe.
    async fn next(&mut self) -> HeartbeatAction {
        let Some(ping) = self.ping.as_mut() else {
            return std::future::pending().await;
        };

        if let Some(deadline) = self.deadline {
            time::sleep_until(deadline).await;
            HeartbeatAction::Expired
        } else {
            _ = ping.tick().await;
            self.deadline = Some(time::Instant::now() + self.timeout);
            HeartbeatAction::Ping
        }
    }

    fn pong_received(&mut self) {
        self.deadline = None;
    }
}

/// The single task that owns the transport.
struct Driver<M, P> {
    endpoint: String,
    config: Config,
    parser: P,
    sender_rx: mpsc::UnboundedReceiver<Outgoing>,
    broadcast_tx: broadcast::Sender<M>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl<M, P> Driver<M, P>
where
    M: DeserializeOwned + Debug + Clone + Send + 'static,
    P: MessageParser<M>,
{
    /// Main connection loop with conditional reconnection.
    async fn run(mut self) {
        let mut state_rx = self.state_tx.subscribe();
        let mut policy = ReconnectPolicy::new(&self.config.reconnect);
        // Set when the reconnect timer, not connect(), started this attempt
        let mut retrying = false;

        loop {
            if !retrying {
                // Idle, or closed for good: wait for someone to call connect()
                tokio::select! {
                    connecting = wait_for_connecting(&mut state_rx) => {
                        if !connecting {
                            break;
                        }
                    }
                    () = self.shutdown.cancelled() => break,
                }
                // Every manual connect gets the full attempt budget
                policy.reset();
            }
            retrying = false;

            let (close, opened) = match self.dial().await {
                Ok(ws_stream) => {
                    policy.reset();
                    _ = self.state_tx.send(ConnectionState::Open {
                        since: Instant::now(),
                    });

                    #[cfg(feature = "tracing")]
                    tracing::info!(endpoint = %self.endpoint, "WebSocket connected");

                    (self.handle_connection(ws_stream).await, true)
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(endpoint = %self.endpoint, "Unable to connect: {e:?}");

                    (CloseEvent::abnormal(dial_failure_reason(&e)), false)
                }
            };

            // The peer may have closed first while our own close was queued
            let disconnecting = matches!(*self.state_tx.borrow(), ConnectionState::Closing);
            let delay = if disconnecting {
                None
            } else {
                policy.next_delay(&close, opened)
            };

            #[cfg(feature = "tracing")]
            match delay {
                Some(delay) => tracing::warn!(
                    code = close.code,
                    reason = %close.reason,
                    "WebSocket closed, reconnecting in {delay:?}"
                ),
                None => tracing::info!(
                    code = close.code,
                    reason = %close.reason,
                    "WebSocket closed, not reconnecting"
                ),
            }

            _ = self.state_tx.send(ConnectionState::Closed {
                event: close,
                reconnecting: delay.is_some(),
            });
            self.discard_pending();

            if self.shutdown.is_cancelled() {
                break;
            }

            let Some(delay) = delay else {
                continue;
            };

            // At most one timer: either it fires, or a manual connect() beats it
            tokio::select! {
                () = time::sleep(delay) => {
                    retrying = self.state_tx.send_if_modified(|state| {
                        if state.is_closed() {
                            *state = ConnectionState::Connecting;
                            true
                        } else {
                            false
                        }
                    });
                }
                connecting = wait_for_connecting(&mut state_rx) => {
                    if !connecting {
                        break;
                    }
                    policy.reset();
                    retrying = true;
                }
                () = self.shutdown.cancelled() => break,
            }
        }
    }

    async fn dial(&self) -> Result<WsStream> {
        let request = client_request(&self.endpoint, &self.config.subprotocol)?;

        let ws_config = WebSocketConfig::default().max_message_size(Some(MAX_MESSAGE_SIZE));
        let handshake = connect_async_with_config(request, Some(ws_config), false);

        match time::timeout(CONNECT_TIMEOUT, handshake).await {
            Ok(Ok((ws_stream, _))) => Ok(ws_stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_elapsed) => Err(WsError::Connection(
                io::Error::from(io::ErrorKind::TimedOut).into(),
            )
            .into()),
        }
    }

    /// Handle an active WebSocket connection until it closes.
    async fn handle_connection(&mut self, ws_stream: WsStream) -> CloseEvent {
        let (mut write, mut read) = ws_stream.split();
        let mut heartbeat = HeartbeatTimer::new(self.config.heartbeat);

        // Set once we have sent our own close frame
        let mut closing: Option<CloseEvent> = None;
        let close_deadline = time::sleep(CLOSE_HANDSHAKE_TIMEOUT);
        tokio::pin!(close_deadline);

        loop {
            tokio::select! {
                // Handle incoming messages
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                        Some(Ok(Message::Binary(bytes))) => {
                            let error = WsError::ProtocolViolation(format!(
                                "unexpected binary frame of {} bytes",
                                bytes.len()
                            ));
                            #[cfg(feature = "tracing")]
                            tracing::warn!(%error, "Dropping WebSocket frame");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &error;
                        }
                        Some(Ok(Message::Pong(_))) => heartbeat.pong_received(),
                        Some(Ok(Message::Close(frame))) => {
                            return closing.unwrap_or_else(|| CloseEvent::from(frame));
                        }
                        Some(Ok(_)) => {
                            // PINGs are answered by tungstenite itself
                        }
                        Some(Err(e)) => {
                            return closing.unwrap_or_else(|| CloseEvent::abnormal(e.to_string()));
                        }
                        None => {
                            return closing.unwrap_or_else(|| {
                                CloseEvent::abnormal("connection ended without a close frame")
                            });
                        }
                    }
                }

                // Handle outgoing frames from the public API
                Some(outgoing) = self.sender_rx.recv(), if closing.is_none() => {
                    match outgoing {
                        Outgoing::Text(text) => {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                return CloseEvent::abnormal(e.to_string());
                            }
                        }
                        Outgoing::Close => {
                            let event = CloseEvent::going_away();
                            let frame = CloseFrame {
                                code: CloseCode::Away,
                                reason: event.reason.clone().into(),
                            };
                            if write.send(Message::Close(Some(frame))).await.is_err() {
                                return event;
                            }
                            close_deadline
                                .as_mut()
                                .reset(time::Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);
                            closing = Some(event);
                        }
                    }
                }

                // Peer never answered our close frame
                () = &mut close_deadline, if closing.is_some() => {
                    return closing.unwrap_or_else(CloseEvent::going_away);
                }

                action = heartbeat.next() => {
                    match action {
                        HeartbeatAction::Ping => {
                            if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                                return CloseEvent::abnormal(e.to_string());
                            }
                        }
                        HeartbeatAction::Expired => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!("Heartbeat timeout: no PONG received in time");
                            return CloseEvent::abnormal("heartbeat timeout");
                        }
                    }
                }

                () = self.shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "Going away".into(),
                    };
                    _ = write.send(Message::Close(Some(frame))).await;
                    return CloseEvent::going_away();
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received WebSocket text message");

        // Parse messages using the provided parser
        match self.parser.parse(text.as_bytes()) {
            Ok(messages) => {
                for message in messages {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(?message, "Parsed WebSocket message");
                    _ = self.broadcast_tx.send(message);
                }
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %e, "Dropping malformed WebSocket message");
                #[cfg(not(feature = "tracing"))]
                let _ = (&text, &e);
            }
        }
    }

    /// Drop frames that were queued for a connection that no longer exists.
    fn discard_pending(&mut self) {
        let dropped = iter::from_fn(|| self.sender_rx.try_recv().ok()).count();

        #[cfg(feature = "tracing")]
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded frames queued for a closed connection");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = dropped;
    }
}

/// Close reason for a failed dial: the transport error itself, without the
/// layers of context [`Error`] adds around it.
fn dial_failure_reason(error: &Error) -> String {
    match error.websocket() {
        Some(WsError::Connection(e)) => e.to_string(),
        Some(other) => other.to_string(),
        None => error
            .inner()
            .map_or_else(|| error.to_string(), ToString::to_string),
    }
}

async fn wait_for_connecting(state_rx: &mut watch::Receiver<ConnectionState>) -> bool {
    state_rx.wait_for(ConnectionState::is_connecting).await.is_ok()
}
