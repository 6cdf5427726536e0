#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Client for the plane.watch websocket broker (`planes` subprotocol).
//!
//! The broker streams aircraft positions per geographic grid tile. A session
//! subscribes to tiles and receives `plane-location` updates for aircraft
//! inside them, and can ask for a tile's current occupants or an aircraft's
//! recorded track.
//!
//! # Reconnection
//!
//! Every close except code 1001 ("going away") schedules one reconnect after
//! the configured delay (one second by default). A 1001 close, including one
//! sent by [`Client::disconnect`], ends the session until the next
//! [`Client::connect`]. Tiles subscribed before a reconnect are re-sent unless
//! [`crate::ws::config::Config::resubscribe_on_reconnect`] is turned off.
//!
//! # Example
//!
//! ```rust, no_run
//! use futures::StreamExt as _;
//! use planewatch_client::planes::Client;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::default();
//!     let mut locations = Box::pin(client.locations());
//!
//!     client.connect()?;
//!     client.wait_until_open().await?;
//!     client.subscribe("all_high")?;
//!
//!     while let Some(location) = locations.next().await {
//!         let location = location?;
//!         println!("{:?} {:?}", location.call_sign(), location.lat_lon());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod dispatch;
pub mod subscription;
pub mod types;

// Re-export commonly used types
pub use client::{Client, DEFAULT_ENDPOINT};
pub use dispatch::Acknowledgement;
pub use subscription::PlanesParser;
pub use types::request::OutboundMessage;
pub use types::response::{
    Airport, BackendError, FlightPath, HistoryPoint, InboundMessage, Info, LocationBatch,
    LocationUpdate, PlaneLocation, SearchResult, SearchResults, TileList,
};
