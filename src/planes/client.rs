use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;

use super::dispatch::{Acknowledgement, Dispatcher};
use super::subscription::{PlanesConnection, PlanesParser, SubscriptionManager};
use super::types::request::OutboundMessage;
use super::types::response::{
    BackendError, FlightPath, Info, InboundMessage, LocationBatch, PlaneLocation, SearchResult,
};
use crate::Result;
use crate::types::GridTile;
use crate::ws::config::Config;
use crate::ws::connection::ConnectionState;

/// Production broker endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://plane.watch/planes";

/// Session with the plane.watch websocket broker.
///
/// The client starts idle; call [`Client::connect`] to dial. Cloning is cheap
/// and every clone drives the same session. The session stops once the last
/// clone is dropped.
///
/// Requests are fire-and-forget: each one fails immediately with
/// [`crate::ws::WsError::NotConnected`] unless the connection is open, and
/// replies arrive on the matching stream.
///
/// # Examples
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use planewatch_client::planes::Client;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::default();
///     let mut batches = Box::pin(client.location_batches());
///
///     client.connect()?;
///     client.wait_until_open().await?;
///     client.current_occupants("tile23_low")?;
///
///     while let Some(batch) = batches.next().await {
///         for location in &batch? {
///             println!("{:?} at {:?}", location.icao(), location.lat_lon());
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, Config::default())
            .expect("plane.watch client with default endpoint should succeed")
    }
}

struct ClientInner {
    /// Configuration for the broker connection
    config: Config,
    /// Broker endpoint for the WebSocket
    endpoint: String,
    /// Connection manager for the WebSocket
    connection: PlanesConnection,
    /// Tiles this session asked for
    subscriptions: Arc<SubscriptionManager>,
    /// Typed views over inbound envelopes
    dispatcher: Dispatcher,
}

impl Client {
    /// Create an idle client for `endpoint`. Must be called from within a Tokio runtime.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        let connection = PlanesConnection::new(endpoint.to_owned(), config.clone(), PlanesParser)?;
        let subscriptions = Arc::new(SubscriptionManager::new(connection.clone()));
        let dispatcher = Dispatcher::new(connection.clone());

        if config.resubscribe_on_reconnect {
            subscriptions.start_reconnection_handler();
        }

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                endpoint: endpoint.to_owned(),
                connection,
                subscriptions,
                dispatcher,
            }),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Start connecting. See [`crate::ws::ConnectionManager::connect`].
    pub fn connect(&self) -> Result<()> {
        self.inner.connection.connect()
    }

    /// Close the session with code 1001. No reconnect follows.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.connection.disconnect()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Receiver that is notified on every connection state change.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.state_receiver()
    }

    /// Resolve once the connection is open.
    ///
    /// Waits through reconnects. Fails with [`crate::ws::WsError::NotConnected`]
    /// once the session is closed with no reconnect pending: after a 1001 close,
    /// a `disconnect()` or when the reconnect attempt budget is used up.
    pub async fn wait_until_open(&self) -> Result<()> {
        let mut state_rx = self.state_receiver();

        loop {
            let (open, terminal) = {
                let state = state_rx.borrow_and_update();
                (state.is_open(), state.is_terminal())
            };
            if open {
                return Ok(());
            }
            if terminal || state_rx.changed().await.is_err() {
                return Err(crate::ws::WsError::NotConnected.into());
            }
        }
    }

    /// Ask the broker which tiles this session is subscribed to.
    ///
    /// The reply arrives on [`Client::subscribed_tiles`].
    pub fn list_tiles(&self) -> Result<()> {
        self.inner.connection.send(&OutboundMessage::SubList)
    }

    /// Start streaming updates for `tile`.
    pub fn subscribe<T: Into<GridTile>>(&self, tile: T) -> Result<()> {
        self.inner.subscriptions.subscribe(tile.into())
    }

    /// Stop streaming updates for `tile`.
    pub fn unsubscribe<T: Into<GridTile>>(&self, tile: T) -> Result<()> {
        self.inner.subscriptions.unsubscribe(tile.into())
    }

    /// Ask for the aircraft currently inside `tile`; the empty tile means all.
    ///
    /// The reply arrives on [`Client::location_batches`].
    pub fn current_occupants<T: Into<GridTile>>(&self, tile: T) -> Result<()> {
        self.inner
            .connection
            .send(&OutboundMessage::grid_planes(tile))
    }

    /// Ask for the recorded track of an aircraft. Either argument may be empty.
    ///
    /// The reply arrives on [`Client::histories`].
    pub fn history(&self, icao: &str, call_sign: &str) -> Result<()> {
        self.inner
            .connection
            .send(&OutboundMessage::plane_location_history(icao, call_sign))
    }

    /// Change how often the broker flushes updates to this session.
    pub fn adjust_tick(&self, tick: Duration) -> Result<()> {
        self.inner
            .connection
            .send(&OutboundMessage::adjust_tick(tick))
    }

    /// Search aircraft, airports and routes.
    ///
    /// The reply arrives on [`Client::search_results`].
    pub fn search(&self, query: &str) -> Result<()> {
        self.inner.connection.send(&OutboundMessage::search(query))
    }

    /// Tiles this session believes it is subscribed to, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<GridTile> {
        self.inner.subscriptions.tiles()
    }

    #[must_use]
    pub fn is_subscribed(&self, tile: &str) -> bool {
        self.inner.subscriptions.contains(tile)
    }

    /// Every decoded envelope, unfiltered.
    pub fn messages(&self) -> impl Stream<Item = Result<InboundMessage>> + use<> {
        self.inner.dispatcher.messages()
    }

    /// Errors reported by the broker. They never change the connection state.
    pub fn errors(&self) -> impl Stream<Item = Result<BackendError>> + use<> {
        self.inner.dispatcher.errors()
    }

    pub fn info(&self) -> impl Stream<Item = Result<Info>> + use<> {
        self.inner.dispatcher.info()
    }

    /// Single aircraft updates for subscribed tiles.
    pub fn locations(&self) -> impl Stream<Item = Result<PlaneLocation>> + use<> {
        self.inner.dispatcher.locations()
    }

    /// Batches of aircraft, e.g. replies to [`Client::current_occupants`].
    pub fn location_batches(&self) -> impl Stream<Item = Result<LocationBatch>> + use<> {
        self.inner.dispatcher.location_batches()
    }

    pub fn histories(&self) -> impl Stream<Item = Result<FlightPath>> + use<> {
        self.inner.dispatcher.histories()
    }

    /// Replies to [`Client::list_tiles`].
    pub fn subscribed_tiles(&self) -> impl Stream<Item = Result<Vec<GridTile>>> + use<> {
        self.inner.dispatcher.subscribed_tiles()
    }

    pub fn acknowledgements(&self) -> impl Stream<Item = Result<Acknowledgement>> + use<> {
        self.inner.dispatcher.acknowledgements()
    }

    pub fn search_results(&self) -> impl Stream<Item = Result<SearchResult>> + use<> {
        self.inner.dispatcher.search_results()
    }
}
