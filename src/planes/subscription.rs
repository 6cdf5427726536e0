#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;

use super::types::request::OutboundMessage;
use super::types::response::{InboundMessage, parse_messages};
use crate::Result;
use crate::types::GridTile;
use crate::ws::ConnectionManager;
use crate::ws::connection::ConnectionState;
use crate::ws::traits::MessageParser;

/// Decodes `planes` text frames into [`InboundMessage`]s.
#[non_exhaustive]
#[derive(Clone, Debug, Default)]
pub struct PlanesParser;

impl MessageParser<InboundMessage> for PlanesParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<InboundMessage>> {
        parse_messages(bytes)
    }
}

/// Connection speaking the `planes` subprotocol.
pub type PlanesConnection = ConnectionManager<InboundMessage, PlanesParser>;

/// Sends tile requests and remembers which tiles this session asked for.
///
/// The set is optimistic: a tile is recorded as soon as its `sub` frame is
/// handed to an open connection, without waiting for the broker's `ack-sub`.
pub struct SubscriptionManager {
    connection: PlanesConnection,
    tiles: DashSet<GridTile>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(connection: PlanesConnection) -> Self {
        Self {
            connection,
            tiles: DashSet::new(),
        }
    }

    /// Start the reconnection handler that re-subscribes on connection recovery.
    ///
    /// Every transition into [`ConnectionState::Open`] after the first replays
    /// one `sub` per recorded tile. The task ends with the connection.
    pub fn start_reconnection_handler(self: &Arc<Self>) {
        let this = Arc::downgrade(self);
        let mut state_rx = self.connection.state_receiver();

        tokio::spawn(async move {
            // Identifies the current connection; states can coalesce in the
            // watch channel, so a changed timestamp is what marks a reconnect
            let mut last_open: Option<Instant> = None;

            loop {
                let opened = match &*state_rx.borrow_and_update() {
                    ConnectionState::Open { since } => Some(*since),
                    _ => None,
                };

                if let Some(since) = opened
                    && last_open != Some(since)
                {
                    if last_open.is_some() {
                        let Some(this) = this.upgrade() else {
                            break;
                        };
                        this.resubscribe_all();
                    }
                    last_open = Some(since);
                }

                if state_rx.changed().await.is_err() {
                    // Connection manager is gone
                    break;
                }
            }
        });
    }

    /// Re-send `sub` for every recorded tile.
    fn resubscribe_all(&self) {
        let tiles = self.tiles();
        if tiles.is_empty() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(count = tiles.len(), "Reconnected, re-subscribing to tiles");

        for tile in tiles {
            if let Err(e) = self.connection.send(&OutboundMessage::sub(tile)) {
                // The new connection is already gone; the next open retries
                #[cfg(feature = "tracing")]
                tracing::warn!(%e, "Failed to re-subscribe to tiles");
                #[cfg(not(feature = "tracing"))]
                let _: &crate::error::Error = &e;
                return;
            }
        }
    }

    /// Send `sub` for `tile` and record it.
    pub fn subscribe(&self, tile: GridTile) -> Result<()> {
        self.connection.send(&OutboundMessage::sub(tile.clone()))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%tile, "Subscribed to tile");

        self.tiles.insert(tile);
        Ok(())
    }

    /// Send `unsub` for `tile` and forget it.
    pub fn unsubscribe(&self, tile: GridTile) -> Result<()> {
        self.connection.send(&OutboundMessage::unsub(tile.clone()))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%tile, "Unsubscribed from tile");

        self.tiles.remove(&tile);
        Ok(())
    }

    /// Snapshot of the recorded tiles, sorted.
    #[must_use]
    pub fn tiles(&self) -> Vec<GridTile> {
        let mut tiles: Vec<GridTile> = self.tiles.iter().map(|tile| tile.key().clone()).collect();
        tiles.sort_unstable();
        tiles
    }

    #[must_use]
    pub fn contains(&self, tile: &str) -> bool {
        self.tiles.contains(tile)
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.tiles.len()
    }
}
