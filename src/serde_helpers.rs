//! Serde helpers for decoding broker frames.
//!
//! With the `tracing` feature enabled, fields the target type does not capture
//! are logged at debug level, and a failed decode logs the JSON path that broke
//! it. Both help spot broker-side protocol changes.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize a decoded frame into `T`, reporting fields `T` ignores.
///
/// Unknown fields never fail the decode.
///
/// ```ignore
/// let json = serde_json::json!({ "type": "error", "message": "boom", "code": 7 });
/// let message: InboundMessage = deserialize_with_warnings(json)?;
/// // Logs: DEBUG unknown field in broker frame field="code" value=7
/// ```
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    use std::any::type_name;

    // Kept so unknown field values and failing paths can be shown
    let original = value.clone();
    let mut unknown_paths: Vec<String> = Vec::new();

    let result = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    });

    let decoded: T = match result {
        Ok(decoded) => decoded,
        Err(e) => {
            // serde_ignored loses the location of the failure; decode again to find it
            if let Err(path_err) = serde_path_to_error::deserialize::<_, T>(&original) {
                let path = path_err.path().to_string();
                tracing::warn!(
                    type_name = %type_name::<T>(),
                    path = %path,
                    value = %describe(lookup_value(&original, &path)),
                    error = %path_err.inner(),
                    "broker frame does not match its declared type"
                );
            }
            return Err(e.into());
        }
    };

    for path in unknown_paths {
        tracing::debug!(
            type_name = %type_name::<T>(),
            field = %path,
            value = %describe(lookup_value(&original, &path)),
            "unknown field in broker frame"
        );
    }

    Ok(decoded)
}

/// Pass-through deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Resolve a serde path against `value`.
///
/// Accepts both the dotted form from `serde_ignored` (`locations.0.Icao`, with
/// `?` marking an `Option`) and the bracketed form from `serde_path_to_error`
/// (`locations[0].Icao`).
#[cfg(feature = "tracing")]
fn lookup_value<'value>(value: &'value Value, path: &str) -> Option<&'value Value> {
    let pointer: String = path
        .split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty() && *segment != "?")
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect();

    value.pointer(&pointer)
}

#[cfg(feature = "tracing")]
fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "<missing>".to_owned(), Value::to_string)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Track {
        icao: String,
        #[serde(default)]
        call_sign: Option<String>,
        points: Vec<Point>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "PascalCase")]
    struct Point {
        lat: f64,
        lon: f64,
    }

    #[test]
    fn unknown_fields_do_not_fail() {
        let json = json!({
            "icao": "7C6B2D",
            "squawk": "1200",
            "points": [{ "Lat": -31.9, "Lon": 115.9, "Heading": 90 }]
        });

        let track: Track = deserialize_with_warnings(json).unwrap();
        assert_eq!(track.icao, "7C6B2D");
        assert_eq!(track.call_sign, None);
        assert_eq!(track.points.len(), 1);
        assert!((track.points[0].lat + 31.9).abs() < f64::EPSILON);
        assert!((track.points[0].lon - 115.9).abs() < f64::EPSILON);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let json = json!({ "icao": "7C6B2D", "points": [{ "Lat": "north", "Lon": 1.0 }] });

        let err = deserialize_with_warnings::<Track>(json).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Internal);
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn lookup_handles_both_path_styles() {
        let json = json!({ "points": [{ "Lat": 1.5 }, { "Lat": 2.5 }] });

        assert_eq!(lookup_value(&json, "points.1.Lat"), Some(&json!(2.5)));
        assert_eq!(lookup_value(&json, "points[0].Lat"), Some(&json!(1.5)));
        assert_eq!(lookup_value(&json, "?.points.?.0.Lat"), Some(&json!(1.5)));
        assert_eq!(lookup_value(&json, ""), Some(&json));
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn lookup_misses_return_none() {
        let json = json!({ "icao": "7C6B2D", "points": [] });

        assert_eq!(lookup_value(&json, "points.3"), None);
        assert_eq!(lookup_value(&json, "icao.inner"), None);
        assert_eq!(describe(None), "<missing>");
    }

    /// Captures log output to prove unknown fields are reported.
    #[cfg(feature = "tracing")]
    #[test]
    fn unknown_field_is_logged() {
        use std::io;
        use std::sync::{Arc, Mutex};

        use tracing_subscriber::layer::SubscriberExt as _;

        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_writer(move || writer.clone())
                .with_ansi(false),
        );

        tracing::subscriber::with_default(subscriber, || {
            let json = json!({ "icao": "7C6B2D", "points": [], "squawk": "7700" });
            let _track: Track = deserialize_with_warnings(json).unwrap();
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("unknown field"), "got: {output}");
        assert!(output.contains("squawk"), "got: {output}");
    }
}
