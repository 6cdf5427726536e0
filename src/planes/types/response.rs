use std::error::Error as StdError;
use std::fmt;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnNull, serde_as};

use crate::serde_helpers::deserialize_with_warnings;
use crate::types::{DateTime, GridTile, Utc};
use crate::ws::WsError;

/// Envelope received from the broker, keyed by its `type` field.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Deserialize, strum_macros::IntoStaticStr)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InboundMessage {
    /// The broker rejected a request
    Error(BackendError),
    /// Informational notice
    Info(Info),
    /// A `sub` was accepted
    AckSub(TileList),
    /// An `unsub` was accepted
    AckUnsub(TileList),
    /// Reply to `sub-list`
    SubList(TileList),
    /// A single aircraft moved
    PlaneLocation(LocationUpdate),
    /// Several aircraft at once, e.g. the reply to `grid-planes`
    PlaneLocationList(LocationBatch),
    /// Reply to `plane-location-history`
    PlaneLocationHistory(FlightPath),
    /// Reply to `search`
    SearchResults(SearchResults),
}

impl InboundMessage {
    /// Every `type` value this client understands.
    pub const KINDS: &'static [&'static str] = &[
        "error",
        "info",
        "ack-sub",
        "ack-unsub",
        "sub-list",
        "plane-location",
        "plane-location-list",
        "plane-location-history",
        "search-results",
    ];

    /// Wire name of this kind, the value of the `type` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// Error reported by the broker in an `error` envelope.
///
/// This is a value delivered on [`crate::planes::Client::errors`], not a
/// failure of the session; the connection state is unaffected.
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendError {
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plane.watch error: {}", self.message)
    }
}

impl StdError for BackendError {}

#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Info {
    #[serde(default)]
    pub message: String,
}

/// Tiles named by an acknowledgement or a `sub-list` reply.
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TileList {
    #[serde(default)]
    pub tiles: Vec<GridTile>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LocationUpdate {
    #[serde(default)]
    pub location: Option<PlaneLocation>,
}

/// Ordered list of aircraft positions.
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LocationBatch {
    #[serde(default)]
    pub locations: Vec<PlaneLocation>,
}

impl LocationBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlaneLocation> {
        self.locations.iter()
    }
}

impl IntoIterator for LocationBatch {
    type Item = PlaneLocation;
    type IntoIter = std::vec::IntoIter<PlaneLocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.locations.into_iter()
    }
}

impl<'batch> IntoIterator for &'batch LocationBatch {
    type Item = &'batch PlaneLocation;
    type IntoIter = std::slice::Iter<'batch, PlaneLocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.locations.iter()
    }
}

/// Aircraft position record, passed through as the broker sent it.
///
/// The record is large and grows over time, so it is kept as raw JSON. The
/// accessors read the commonly used fields and return `None` when a field is
/// missing or has an unexpected shape.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PlaneLocation(Value);

impl PlaneLocation {
    #[must_use]
    pub const fn new(record: Value) -> Self {
        Self(record)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn f64_field(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// 24-bit ICAO address as hex, e.g. `7C6B2D`.
    #[must_use]
    pub fn icao(&self) -> Option<&str> {
        self.str_field("Icao")
    }

    #[must_use]
    pub fn call_sign(&self) -> Option<&str> {
        self.str_field("CallSign")
    }

    #[must_use]
    pub fn registration(&self) -> Option<&str> {
        self.str_field("Registration")
    }

    /// Tile the aircraft is currently in.
    #[must_use]
    pub fn tile_location(&self) -> Option<&str> {
        self.str_field("TileLocation")
    }

    /// Latitude and longitude in degrees, absent until a position was decoded.
    #[must_use]
    pub fn lat_lon(&self) -> Option<(f64, f64)> {
        if self.0.get("HasLocation").and_then(Value::as_bool) == Some(false) {
            return None;
        }
        Some((self.f64_field("Lat")?, self.f64_field("Lon")?))
    }

    #[must_use]
    pub fn heading(&self) -> Option<f64> {
        self.f64_field("Heading")
    }

    #[must_use]
    pub fn velocity(&self) -> Option<f64> {
        self.f64_field("Velocity")
    }

    #[must_use]
    pub fn altitude(&self) -> Option<i64> {
        self.0.get("Altitude").and_then(Value::as_i64)
    }

    /// When the aircraft was last heard from.
    #[must_use]
    pub fn last_msg(&self) -> Option<DateTime<Utc>> {
        let raw = self.str_field("LastMsg")?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc))
    }

    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Recorded track of one aircraft.
#[serde_as]
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct FlightPath {
    #[serde(default)]
    #[builder(into, default)]
    pub icao: String,
    #[serde(default)]
    #[builder(into, default)]
    pub call_sign: String,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[builder(default)]
    pub history: Vec<HistoryPoint>,
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    #[builder(default)]
    pub heading: f64,
    #[serde(default)]
    #[builder(default)]
    pub velocity: f64,
    /// Missing when the aircraft did not report altitude at that point
    #[serde(default)]
    pub altitude: Option<i32>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SearchResults {
    #[serde(default)]
    pub results: Option<SearchResult>,
}

/// Matches for one `search` query.
#[serde_as]
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResult {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub aircraft: Vec<PlaneLocation>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub airport: Vec<Airport>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub route: Vec<String>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "PascalCase")]
pub struct Airport {
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub icao: String,
    #[builder(into)]
    pub iata: String,
    pub lat: f64,
    pub lon: f64,
}

/// Decode one text frame.
///
/// Returns an empty vector for blank frames, frames without a string `type`,
/// and kinds this client does not know. Invalid JSON and known kinds with the
/// wrong shape are [`WsError::ProtocolViolation`]s; the caller drops the frame.
pub fn parse_messages(bytes: &[u8]) -> crate::Result<Vec<InboundMessage>> {
    let trimmed = bytes.trim_ascii();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_slice(trimmed)
        .map_err(|e| WsError::ProtocolViolation(format!("invalid JSON: {e}")))?;

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        #[cfg(feature = "tracing")]
        tracing::trace!("Ignoring frame without a message type");
        return Ok(Vec::new());
    };

    if !InboundMessage::KINDS.contains(&kind) {
        #[cfg(feature = "tracing")]
        tracing::trace!(kind, "Ignoring unknown message kind");
        return Ok(Vec::new());
    }

    let kind = kind.to_owned();
    let message: InboundMessage = deserialize_with_warnings(value)
        .map_err(|e| WsError::ProtocolViolation(format!("malformed {kind} message: {e}")))?;

    Ok(vec![message])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse_one(json: &str) -> InboundMessage {
        let mut messages = parse_messages(json.as_bytes()).unwrap();
        assert_eq!(messages.len(), 1, "expected a single message from {json}");
        messages.remove(0)
    }

    #[test]
    fn parse_error_message() {
        let message = parse_one(r#"{"type":"error","message":"boom"}"#);

        assert_eq!(message.kind(), "error");
        let InboundMessage::Error(error) = message else {
            panic!("unexpected message");
        };
        assert_eq!(error.message, "boom");
        assert_eq!(error.to_string(), "plane.watch error: boom");
    }

    #[test]
    fn parse_empty_location_list() {
        let message = parse_one(r#"{"type":"plane-location-list","locations":[]}"#);

        let InboundMessage::PlaneLocationList(batch) = message else {
            panic!("unexpected message");
        };
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn omitted_locations_default_to_empty() {
        let message = parse_one(r#"{"type":"plane-location-list"}"#);

        assert_eq!(
            message,
            InboundMessage::PlaneLocationList(LocationBatch::default())
        );
    }

    #[test]
    fn parse_plane_location() {
        let message = parse_one(
            r#"{
                "type": "plane-location",
                "location": {
                    "New": false,
                    "Removed": false,
                    "Icao": "7C6B2D",
                    "Lat": -31.94,
                    "Lon": 115.96,
                    "Heading": 212.4,
                    "Velocity": 431.2,
                    "Altitude": 36000,
                    "HasLocation": true,
                    "CallSign": "QFA583",
                    "TileLocation": "tile23",
                    "LastMsg": "2024-03-09T04:12:55.123Z",
                    "SignalRssi": null
                }
            }"#,
        );

        let InboundMessage::PlaneLocation(LocationUpdate {
            location: Some(location),
        }) = message
        else {
            panic!("unexpected message");
        };
        assert_eq!(location.icao(), Some("7C6B2D"));
        assert_eq!(location.call_sign(), Some("QFA583"));
        assert_eq!(location.tile_location(), Some("tile23"));
        assert_eq!(location.lat_lon(), Some((-31.94, 115.96)));
        assert_eq!(location.altitude(), Some(36000));
        assert_eq!(location.registration(), None);
        assert_eq!(
            location.last_msg().map(|t| t.to_rfc3339()),
            Some("2024-03-09T04:12:55.123+00:00".to_owned())
        );
        // Unmodelled fields survive untouched
        assert_eq!(location.as_value()["SignalRssi"], Value::Null);
    }

    #[test]
    fn location_without_fix_has_no_position() {
        let location = PlaneLocation::new(json!({ "Icao": "7C6B2D", "Lat": 0, "Lon": 0, "HasLocation": false }));
        assert_eq!(location.lat_lon(), None);

        let location = PlaneLocation::new(json!({ "Icao": 7 }));
        assert_eq!(location.icao(), None);
        assert_eq!(location.lat_lon(), None);
        assert_eq!(location.last_msg(), None);
    }

    #[test]
    fn plane_location_without_record() {
        let message = parse_one(r#"{"type":"plane-location"}"#);

        assert_eq!(
            message,
            InboundMessage::PlaneLocation(LocationUpdate { location: None })
        );
    }

    #[test]
    fn parse_tile_lists() {
        let message = parse_one(r#"{"type":"sub-list","tiles":["tile1_low","all_high"]}"#);
        assert_eq!(
            message,
            InboundMessage::SubList(TileList {
                tiles: vec![GridTile::low("tile1"), GridTile::all_high()]
            })
        );

        let message = parse_one(r#"{"type":"ack-sub","tiles":["T1"]}"#);
        assert_eq!(message.kind(), "ack-sub");

        let message = parse_one(r#"{"type":"ack-unsub"}"#);
        assert_eq!(message, InboundMessage::AckUnsub(TileList::default()));
    }

    #[test]
    fn parse_history() {
        let message = parse_one(
            r#"{
                "type": "plane-location-history",
                "icao": "7C6B2D",
                "callSign": "QFA583",
                "history": [
                    {"Lat": -31.9, "Lon": 115.9, "Heading": 10.0, "Velocity": 120.5, "Altitude": 1200},
                    {"Lat": -31.8, "Lon": 115.8, "Heading": 12.0, "Velocity": 140.0, "Altitude": null}
                ]
            }"#,
        );

        let InboundMessage::PlaneLocationHistory(path) = message else {
            panic!("unexpected message");
        };
        assert_eq!(path.icao, "7C6B2D");
        assert_eq!(path.call_sign, "QFA583");
        assert_eq!(path.history.len(), 2);
        assert_eq!(path.history[0].altitude, Some(1200));
        assert_eq!(path.history[1].altitude, None);
    }

    #[test]
    fn parse_search_results_with_null_lists() {
        let message = parse_one(
            r#"{
                "type": "search-results",
                "results": {
                    "Query": "PER",
                    "Aircraft": null,
                    "Airport": [{"Name": "Perth", "Icao": "YPPH", "Iata": "PER", "Lat": -31.94, "Lon": 115.97}],
                    "Route": null
                }
            }"#,
        );

        let InboundMessage::SearchResults(SearchResults {
            results: Some(results),
        }) = message
        else {
            panic!("unexpected message");
        };
        assert_eq!(results.query, "PER");
        assert!(results.aircraft.is_empty());
        assert!(results.route.is_empty());
        assert_eq!(
            results.airport,
            vec![
                Airport::builder()
                    .name("Perth")
                    .icao("YPPH")
                    .iata("PER")
                    .lat(-31.94)
                    .lon(115.97)
                    .build()
            ]
        );
    }

    #[test]
    fn frames_without_known_type_are_ignored() {
        for frame in [
            "",
            "   \n",
            r#"{"message":"no type"}"#,
            r#"{"type":42}"#,
            r#"{"type":"plane-teleport","location":{}}"#,
            "[1, 2, 3]",
            r#""just a string""#,
        ] {
            assert!(
                parse_messages(frame.as_bytes()).unwrap().is_empty(),
                "{frame:?} should be ignored"
            );
        }
    }

    #[test]
    fn invalid_json_is_a_violation() {
        let err = parse_messages(b"{not json").unwrap_err();

        assert_eq!(err.kind(), crate::error::Kind::WebSocket);
        assert!(matches!(
            err.downcast_ref::<WsError>(),
            Some(WsError::ProtocolViolation(reason)) if reason.starts_with("invalid JSON")
        ));
    }

    #[test]
    fn wrong_shape_for_known_kind_is_a_violation() {
        let err = parse_messages(br#"{"type":"plane-location-list","locations":{"a":1}}"#)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<WsError>(),
            Some(WsError::ProtocolViolation(reason)) if reason.contains("plane-location-list")
        ));
    }

    #[test]
    fn kinds_cover_every_variant() {
        let samples = [
            InboundMessage::Error(BackendError::default()),
            InboundMessage::Info(Info::default()),
            InboundMessage::AckSub(TileList::default()),
            InboundMessage::AckUnsub(TileList::default()),
            InboundMessage::SubList(TileList::default()),
            InboundMessage::PlaneLocation(LocationUpdate::default()),
            InboundMessage::PlaneLocationList(LocationBatch::default()),
            InboundMessage::PlaneLocationHistory(FlightPath::default()),
            InboundMessage::SearchResults(SearchResults::default()),
        ];

        let kinds: Vec<&str> = samples.iter().map(InboundMessage::kind).collect();
        assert_eq!(kinds, InboundMessage::KINDS);
    }
}
