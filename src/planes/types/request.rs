use std::time::Duration;

use serde::Serialize;

use crate::types::GridTile;

/// Envelope sent to the broker.
///
/// Serialized as a flat JSON object whose `type` field names the kind, e.g.
/// `{"type":"sub","gridTile":"tile23_low"}`. Every field a kind declares is
/// always written, even when empty.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, strum_macros::IntoStaticStr)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
#[strum(serialize_all = "kebab-case")]
pub enum OutboundMessage {
    /// Ask which tiles this session is subscribed to
    SubList,
    /// Start streaming updates for a tile
    Sub { grid_tile: GridTile },
    /// Stop streaming updates for a tile
    Unsub { grid_tile: GridTile },
    /// Ask for the aircraft currently inside a tile
    GridPlanes { grid_tile: GridTile },
    /// Ask for the recorded track of one aircraft
    PlaneLocationHistory { icao: String, call_sign: String },
    /// Change how often the broker flushes updates, in milliseconds
    AdjustTick { tick: u64 },
    /// Free text search over aircraft, airports and routes
    Search { query: String },
}

impl OutboundMessage {
    #[must_use]
    pub fn sub<T: Into<GridTile>>(grid_tile: T) -> Self {
        Self::Sub {
            grid_tile: grid_tile.into(),
        }
    }

    #[must_use]
    pub fn unsub<T: Into<GridTile>>(grid_tile: T) -> Self {
        Self::Unsub {
            grid_tile: grid_tile.into(),
        }
    }

    #[must_use]
    pub fn grid_planes<T: Into<GridTile>>(grid_tile: T) -> Self {
        Self::GridPlanes {
            grid_tile: grid_tile.into(),
        }
    }

    #[must_use]
    pub fn plane_location_history<I: Into<String>, C: Into<String>>(icao: I, call_sign: C) -> Self {
        Self::PlaneLocationHistory {
            icao: icao.into(),
            call_sign: call_sign.into(),
        }
    }

    /// Saturates at `u64::MAX` milliseconds.
    #[must_use]
    pub fn adjust_tick(tick: Duration) -> Self {
        Self::AdjustTick {
            tick: u64::try_from(tick.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn search<Q: Into<String>>(query: Q) -> Self {
        Self::Search {
            query: query.into(),
        }
    }

    /// Wire name of this kind, the value of the `type` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn to_json(message: &OutboundMessage) -> serde_json::Value {
        serde_json::to_value(message).unwrap()
    }

    #[test]
    fn sub_list_has_no_fields() {
        assert_eq!(to_json(&OutboundMessage::SubList), json!({ "type": "sub-list" }));
    }

    #[test]
    fn tile_requests_carry_grid_tile() {
        assert_eq!(
            to_json(&OutboundMessage::sub("T1")),
            json!({ "type": "sub", "gridTile": "T1" })
        );
        assert_eq!(
            to_json(&OutboundMessage::unsub("T1")),
            json!({ "type": "unsub", "gridTile": "T1" })
        );
        assert_eq!(
            to_json(&OutboundMessage::grid_planes("A1")),
            json!({ "type": "grid-planes", "gridTile": "A1" })
        );
    }

    #[test]
    fn empty_fields_are_still_written() {
        assert_eq!(
            to_json(&OutboundMessage::grid_planes(GridTile::unscoped())),
            json!({ "type": "grid-planes", "gridTile": "" })
        );
        assert_eq!(
            to_json(&OutboundMessage::plane_location_history("7C6B2D", "")),
            json!({ "type": "plane-location-history", "icao": "7C6B2D", "callSign": "" })
        );
    }

    #[test]
    fn adjust_tick_is_whole_milliseconds() {
        assert_eq!(
            to_json(&OutboundMessage::adjust_tick(Duration::from_micros(1_500_900))),
            json!({ "type": "adjust-tick", "tick": 1500 })
        );
        assert_eq!(
            OutboundMessage::adjust_tick(Duration::MAX),
            OutboundMessage::AdjustTick { tick: u64::MAX }
        );
    }

    #[test]
    fn search_carries_query() {
        assert_eq!(
            to_json(&OutboundMessage::search("QFA")),
            json!({ "type": "search", "query": "QFA" })
        );
    }

    #[test]
    fn kind_matches_type_field() {
        let messages = [
            OutboundMessage::SubList,
            OutboundMessage::sub("T1"),
            OutboundMessage::unsub("T1"),
            OutboundMessage::grid_planes("T1"),
            OutboundMessage::plane_location_history("", ""),
            OutboundMessage::adjust_tick(Duration::from_secs(1)),
            OutboundMessage::search(""),
        ];

        for message in messages {
            assert_eq!(to_json(&message)["type"], message.kind());
        }
    }
}
