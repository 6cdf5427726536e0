//! Protocol-agnostic WebSocket session.
//!
//! [`ConnectionManager`] owns one logical session: an explicit
//! [`ConnectionState`] machine, close-code driven reconnects, an optional
//! PING/PONG heartbeat and broadcast fan-out of decoded frames. What a frame
//! means is left to a [`MessageParser`]; the `planes` protocol plugs in through
//! [`crate::planes::PlanesParser`].
//!
//! ```ignore
//! let connection = ConnectionManager::new(endpoint, Config::default(), PlanesParser)?;
//! let mut rx = connection.subscribe();
//!
//! connection.connect()?;
//! while let Ok(message) = rx.recv().await {
//!     println!("{}", message.kind());
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;

pub use connection::{CloseEvent, ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
