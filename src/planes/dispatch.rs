//! Fan-out of decoded envelopes to typed observer streams.

use async_stream::stream;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use super::subscription::PlanesConnection;
use super::types::response::{
    BackendError, FlightPath, Info, InboundMessage, LocationBatch, PlaneLocation, SearchResult,
};
use crate::Result;
use crate::types::GridTile;
use crate::ws::WsError;

/// Broker confirmation of a tile request.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acknowledgement {
    Subscribed(Vec<GridTile>),
    Unsubscribed(Vec<GridTile>),
}

/// Routes envelopes from one connection to per-kind streams.
///
/// Each stream owns its own broadcast receiver, so a slow observer only
/// delays itself. When it falls too far behind, it receives one
/// [`WsError::Lagged`] item and then carries on with the newest envelopes.
#[derive(Clone)]
pub struct Dispatcher {
    connection: PlanesConnection,
}

impl Dispatcher {
    #[must_use]
    pub fn new(connection: PlanesConnection) -> Self {
        Self { connection }
    }

    /// Stream of whatever `select` extracts from each envelope; `None` skips it.
    pub fn route<T, F>(&self, mut select: F) -> impl Stream<Item = Result<T>> + use<T, F>
    where
        T: Send + 'static,
        F: FnMut(InboundMessage) -> Option<T> + Send + 'static,
    {
        let mut rx = self.connection.subscribe();

        stream! {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if let Some(item) = select(message) {
                            yield Ok(item);
                        }
                    }
                    Err(RecvError::Lagged(count)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Observer lagged, missed {count} messages");
                        yield Err(WsError::Lagged { count }.into());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Every decoded envelope, unfiltered.
    pub fn messages(&self) -> impl Stream<Item = Result<InboundMessage>> + use<> {
        self.route(Some)
    }

    pub fn errors(&self) -> impl Stream<Item = Result<BackendError>> + use<> {
        self.route(|message| match message {
            InboundMessage::Error(error) => Some(error),
            _ => None,
        })
    }

    pub fn info(&self) -> impl Stream<Item = Result<Info>> + use<> {
        self.route(|message| match message {
            InboundMessage::Info(info) => Some(info),
            _ => None,
        })
    }

    /// Single position updates. Envelopes without a record are skipped.
    pub fn locations(&self) -> impl Stream<Item = Result<PlaneLocation>> + use<> {
        self.route(|message| match message {
            InboundMessage::PlaneLocation(update) => update.location,
            _ => None,
        })
    }

    pub fn location_batches(&self) -> impl Stream<Item = Result<LocationBatch>> + use<> {
        self.route(|message| match message {
            InboundMessage::PlaneLocationList(batch) => Some(batch),
            _ => None,
        })
    }

    pub fn histories(&self) -> impl Stream<Item = Result<FlightPath>> + use<> {
        self.route(|message| match message {
            InboundMessage::PlaneLocationHistory(path) => Some(path),
            _ => None,
        })
    }

    /// Tiles reported by `sub-list` replies.
    pub fn subscribed_tiles(&self) -> impl Stream<Item = Result<Vec<GridTile>>> + use<> {
        self.route(|message| match message {
            InboundMessage::SubList(list) => Some(list.tiles),
            _ => None,
        })
    }

    pub fn acknowledgements(&self) -> impl Stream<Item = Result<Acknowledgement>> + use<> {
        self.route(|message| match message {
            InboundMessage::AckSub(list) => Some(Acknowledgement::Subscribed(list.tiles)),
            InboundMessage::AckUnsub(list) => Some(Acknowledgement::Unsubscribed(list.tiles)),
            _ => None,
        })
    }

    /// Search replies that carry results.
    pub fn search_results(&self) -> impl Stream<Item = Result<SearchResult>> + use<> {
        self.route(|message| match message {
            InboundMessage::SearchResults(results) => results.results,
            _ => None,
        })
    }
}
