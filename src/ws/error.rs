#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// Why a session operation or a single frame failed.
///
/// `NotConnected`, `AlreadyConnecting` and `AlreadyOpen` are returned
/// synchronously by the state machine. `ProtocolViolation` describes one dropped
/// frame and never ends the session.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// A send or disconnect was attempted while the channel is not open
    NotConnected,
    /// `connect` was called while a connection attempt is already in flight
    AlreadyConnecting,
    /// `connect` was called while the channel is already open
    AlreadyOpen,
    /// The peer sent a frame this protocol does not allow (e.g. a binary frame)
    ProtocolViolation(String),
    /// Subscription stream lagged and missed messages
    Lagged {
        /// Number of messages that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::NotConnected => write!(f, "WebSocket is not connected"),
            Self::AlreadyConnecting => write!(f, "WebSocket connection attempt already in progress"),
            Self::AlreadyOpen => write!(f, "WebSocket connection already open"),
            Self::ProtocolViolation(msg) => write!(f, "WebSocket protocol violation: {msg}"),
            Self::Lagged { count } => write!(f, "Subscription lagged, missed {count} messages"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
