//! Client for the broker's tile catalogue.
//!
//! **Feature flag:** `grid` (required to use this module)
//!
//! `GET /grid` returns a JSON object keyed by grid cell, with each cell's
//! bounds as the value. The keys are what the websocket tile names are built
//! from: `<key>_low` and `<key>_high`.
//!
//! # Example
//!
//! ```no_run
//! use planewatch_client::grid::Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::default();
//!
//! for tile in client.subscribable_tiles().await? {
//!     println!("{tile}");
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;

use reqwest::{
    Client as ReqwestClient, Method,
    header::{HeaderMap, HeaderValue},
};
use serde_json::Value;
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::types::GridTile;

/// Production HTTP endpoint of the broker.
pub const DEFAULT_HOST: &str = "https://plane.watch";

/// HTTP client for the tile catalogue.
#[derive(Clone, Debug)]
pub struct Client {
    host: Url,
    client: ReqwestClient,
}

impl Default for Client {
    fn default() -> Self {
        Client::new(DEFAULT_HOST).expect("Client with default endpoint should succeed")
    }
}

impl Client {
    /// Creates a catalogue client for `host`.
    ///
    /// The catalogue is resolved as `grid` relative to `host`, so a host with a
    /// path prefix needs a trailing slash (`https://example.com/pw/`).
    pub fn new(host: &str) -> Result<Client> {
        let mut headers = HeaderMap::new();

        headers.insert("User-Agent", HeaderValue::from_static("planewatch_client"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = ReqwestClient::builder().default_headers(headers).build()?;

        Ok(Self {
            host: Url::parse(host)?,
            client,
        })
    }

    /// Returns the base URL of the API.
    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Keys of every grid cell the broker knows about.
    pub async fn tiles(&self) -> Result<BTreeSet<GridTile>> {
        let request = self
            .client
            .request(Method::GET, self.host.join("grid")?)
            .build()?;
        let catalogue: Value = crate::request(&self.client, request).await?;

        match catalogue {
            Value::Object(cells) => Ok(cells
                .into_iter()
                .map(|(key, _bounds)| GridTile::from(key))
                .collect()),
            other => Err(Error::validation(format!(
                "grid catalogue must be a JSON object, got {other}"
            ))),
        }
    }

    /// Every tile name the websocket accepts: both altitude feeds of each cell
    /// plus [`GridTile::ALL_LOW`] and [`GridTile::ALL_HIGH`].
    pub async fn subscribable_tiles(&self) -> Result<BTreeSet<GridTile>> {
        Ok(altitude_feeds(&self.tiles().await?))
    }
}

fn altitude_feeds(cells: &BTreeSet<GridTile>) -> BTreeSet<GridTile> {
    cells
        .iter()
        .flat_map(|cell| [GridTile::low(cell.as_str()), GridTile::high(cell.as_str())])
        .chain([GridTile::all_low(), GridTile::all_high()])
        .collect()
}
