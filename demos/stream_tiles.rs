//! Live aircraft positions for a handful of tiles.
//!
//! Connects to the public broker, subscribes to the tiles given on the command
//! line (`all_low` and `all_high` when none are given), asks for the aircraft
//! already in them, then prints every update for a minute.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example stream_tiles --features tracing -- tile23_low tile23_high
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use planewatch_client::planes::Client;
use planewatch_client::types::GridTile;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const RUN_FOR: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut tiles: Vec<GridTile> = std::env::args().skip(1).map(GridTile::from).collect();
    if tiles.is_empty() {
        tiles = vec![GridTile::all_low(), GridTile::all_high()];
    }

    let client = Client::default();
    info!(endpoint = client.endpoint(), state = ?client.connection_state());

    // Observers first, so nothing sent right after the subscribe is missed
    let mut batches = Box::pin(client.location_batches());
    let mut locations = Box::pin(client.locations());
    let mut errors = Box::pin(client.errors());

    client.connect()?;
    timeout(Duration::from_secs(10), client.wait_until_open()).await??;
    info!(state = ?client.connection_state(), "connected");

    for tile in &tiles {
        client.subscribe(tile.clone())?;
        client.current_occupants(tile.clone())?;
    }
    info!(tiles = ?client.subscriptions(), "subscribed");

    let deadline = Instant::now() + RUN_FOR;
    let mut updates = 0_usize;

    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            Some(batch) = batches.next() => match batch {
                Ok(batch) => info!(stream = "occupants", aircraft = batch.len()),
                Err(e) => debug!(stream = "occupants", error = %e),
            },
            Some(location) = locations.next() => match location {
                Ok(location) => {
                    updates += 1;
                    info!(
                        stream = "locations",
                        icao = location.icao().unwrap_or("?"),
                        call_sign = location.call_sign().unwrap_or(""),
                        position = ?location.lat_lon(),
                        altitude = ?location.altitude(),
                    );
                }
                Err(e) => debug!(stream = "locations", error = %e),
            },
            Some(error) = errors.next() => match error {
                Ok(error) => warn!(stream = "errors", %error),
                Err(e) => debug!(stream = "errors", error = %e),
            },
        }
    }

    info!(stream = "locations", received = updates);
    client.disconnect()?;

    Ok(())
}
