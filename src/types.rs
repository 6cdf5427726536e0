//! Shared value types, plus re-exports from external crates for convenience.

use std::borrow::Borrow;
use std::fmt;

/// Date and time types for timestamps in broker payloads.
pub use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a geographic grid tile, e.g. `tile23_low`.
///
/// Tiles are opaque to the client. The empty tile is valid and means
/// "unscoped"; a `grid-planes` request for it asks about every tile.
///
/// The broker publishes each grid cell twice, once for low flying traffic and
/// once for high, named `<key>_low` and `<key>_high`. Two more feeds carry the
/// whole world: [`GridTile::ALL_LOW`] and [`GridTile::ALL_HIGH`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridTile(String);

impl GridTile {
    /// Every low flying aircraft, regardless of cell.
    pub const ALL_LOW: &'static str = "all_low";
    /// Every high flying aircraft, regardless of cell.
    pub const ALL_HIGH: &'static str = "all_high";

    #[must_use]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// The unscoped tile.
    #[must_use]
    pub const fn unscoped() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn all_low() -> Self {
        Self::new(Self::ALL_LOW)
    }

    #[must_use]
    pub fn all_high() -> Self {
        Self::new(Self::ALL_HIGH)
    }

    /// Low altitude feed for the grid cell `key`.
    #[must_use]
    pub fn low(key: &str) -> Self {
        Self(format!("{key}_low"))
    }

    /// High altitude feed for the grid cell `key`.
    #[must_use]
    pub fn high(key: &str) -> Self {
        Self(format!("{key}_high"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_unscoped(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GridTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GridTile {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for GridTile {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<GridTile> for String {
    fn from(tile: GridTile) -> Self {
        tile.0
    }
}

impl AsRef<str> for GridTile {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for GridTile {
    fn borrow(&self) -> &str {
        &self.0
    }
}
