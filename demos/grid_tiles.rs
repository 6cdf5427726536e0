//! Lists the tile catalogue, then counts the aircraft in one tile.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example grid_tiles --features grid,tracing
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use planewatch_client::{grid, planes};
use tokio::time::timeout;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let catalogue = grid::Client::default();

    let cells = catalogue.tiles().await?;
    info!(endpoint = "grid", host = %catalogue.host(), cells = cells.len());

    let feeds = catalogue.subscribable_tiles().await?;
    info!(endpoint = "grid", feeds = feeds.len());

    let Some(tile) = feeds.iter().find(|tile| tile.as_str().ends_with("_high")) else {
        info!(endpoint = "grid", "catalogue is empty");
        return Ok(());
    };

    let client = planes::Client::default();
    let mut batches = Box::pin(client.location_batches());

    client.connect()?;
    timeout(Duration::from_secs(10), client.wait_until_open()).await??;
    client.current_occupants(tile.clone())?;

    match timeout(Duration::from_secs(10), batches.next()).await {
        Ok(Some(Ok(batch))) => info!(stream = "occupants", %tile, aircraft = batch.len()),
        Ok(Some(Err(e))) => debug!(stream = "occupants", error = %e),
        Ok(None) | Err(_) => debug!(stream = "occupants", %tile, "no reply within timeout"),
    }

    client.disconnect()?;

    Ok(())
}
