//! GeoJSON catalog response parsing.
//!
//! Catalog data is noisy: records without a magnitude or a full
//! `[lon, lat, depth]` coordinate are skipped, not reported as errors.

use crate::error::FetchError;
use crate::models::Event;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

/// Parse a catalog response body into events.
pub fn parse_events(body: &str) -> Result<Vec<Event>, FetchError> {
    let json: Value = serde_json::from_str(body).map_err(|e| FetchError::Decode {
        message: format!("invalid JSON: {}", e),
    })?;

    parse_feature_collection(&json)
}

/// Parse an already-decoded GeoJSON feature collection.
pub fn parse_feature_collection(json: &Value) -> Result<Vec<Event>, FetchError> {
    let features = json["features"]
        .as_array()
        .ok_or_else(|| FetchError::Decode {
            message: "no features array in GeoJSON response".to_string(),
        })?;

    let events: Vec<Event> = features.iter().filter_map(feature_to_event).collect();

    let skipped = features.len() - events.len();
    if skipped > 0 {
        debug!(
            "Skipped {} of {} catalog records with missing fields",
            skipped,
            features.len()
        );
    }

    Ok(events)
}

/// Convert one GeoJSON feature into an event, if it is complete enough.
pub fn feature_to_event(feature: &Value) -> Option<Event> {
    let props = &feature["properties"];
    let coords = feature["geometry"]["coordinates"].as_array()?;
    if coords.len() < 3 {
        return None;
    }

    let magnitude = props["mag"].as_f64()?;
    let longitude = coords[0].as_f64()?;
    let latitude = coords[1].as_f64()?;
    let depth_km = coords[2].as_f64()?;

    let millis = props["time"]
        .as_i64()
        .or_else(|| props["time"].as_f64().map(|t| t as i64))?;
    let time = Utc.timestamp_millis_opt(millis).single()?;

    Some(Event {
        id: feature["id"].as_str().map(String::from),
        time,
        magnitude,
        depth_km,
        latitude,
        longitude,
        station_count: station_count(&props["nst"]),
        gap: props["gap"].as_f64().unwrap_or(0.0),
        min_distance: props["dmin"].as_f64().unwrap_or(0.0),
        rms: props["rms"].as_f64().unwrap_or(0.0),
        place: props["place"].as_str().map(String::from),
    })
}

/// `nst` is an integer in most feeds but some send it as a float.
fn station_count(value: &Value) -> u32 {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n.round() as u64)
        })
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_round_trip() {
        // 2023-02-06T01:17:34Z
        let feature = json!({
            "type": "Feature",
            "id": "us6000jllz",
            "properties": {
                "mag": 7.8,
                "place": "Pazarcik earthquake, Kahramanmaras",
                "time": 1675646254342_i64,
                "nst": 142,
                "gap": 18.0,
                "dmin": 1.2,
                "rms": 0.84
            },
            "geometry": {
                "type": "Point",
                "coordinates": [37.0143, 37.2256, 10.0]
            }
        });

        let event = feature_to_event(&feature).unwrap();
        assert_eq!(event.id.as_deref(), Some("us6000jllz"));
        assert_eq!(event.magnitude, 7.8);
        assert_eq!(event.longitude, 37.0143);
        assert_eq!(event.latitude, 37.2256);
        assert_eq!(event.depth_km, 10.0);
        assert_eq!(event.station_count, 142);
        assert_eq!(event.gap, 18.0);
        assert_eq!(event.min_distance, 1.2);
        assert_eq!(event.rms, 0.84);
        assert_eq!(
            event.time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "2023-02-06T01:17:34"
        );
    }

    #[test]
    fn test_optional_fields_default_to_zero() {
        let feature = json!({
            "properties": { "mag": 2.1, "time": 0, "nst": null, "gap": null },
            "geometry": { "coordinates": [30.0, 40.0, 5.5] }
        });

        let event = feature_to_event(&feature).unwrap();
        assert_eq!(event.station_count, 0);
        assert_eq!(event.gap, 0.0);
        assert_eq!(event.min_distance, 0.0);
        assert_eq!(event.rms, 0.0);
        assert!(event.place.is_none());
        assert!(event.id.is_none());
    }

    #[test]
    fn test_float_station_count() {
        let feature = json!({
            "properties": { "mag": 2.1, "time": 0, "nst": 12.0 },
            "geometry": { "coordinates": [30.0, 40.0, 5.5] }
        });
        assert_eq!(feature_to_event(&feature).unwrap().station_count, 12);

        let feature = json!({
            "properties": { "mag": 2.1, "time": 0, "nst": -3.0 },
            "geometry": { "coordinates": [30.0, 40.0, 5.5] }
        });
        assert_eq!(feature_to_event(&feature).unwrap().station_count, 0);
    }

    #[test]
    fn test_incomplete_records_are_skipped() {
        let body = json!({
            "type": "FeatureCollection",
            "features": [
                { "properties": { "mag": null, "time": 1 }, "geometry": { "coordinates": [30.0, 40.0, 5.0] } },
                { "properties": { "mag": 3.0, "time": 1 }, "geometry": { "coordinates": [30.0, 40.0] } },
                { "properties": { "mag": 3.0, "time": 1 }, "geometry": null },
                { "properties": { "mag": 3.0 }, "geometry": { "coordinates": [30.0, 40.0, 5.0] } },
                { "properties": { "mag": 4.2, "time": 1 }, "geometry": { "coordinates": [30.0, 40.0, 5.0] } }
            ]
        })
        .to_string();

        let events = parse_events(&body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].magnitude, 4.2);
    }

    #[test]
    fn test_missing_features_is_decode_error() {
        assert!(matches!(
            parse_events(r#"{"type": "FeatureCollection"}"#),
            Err(FetchError::Decode { .. })
        ));
        assert!(matches!(
            parse_events("<html>busy</html>"),
            Err(FetchError::Decode { .. })
        ));
    }

    #[test]
    fn test_empty_collection() {
        let events = parse_events(r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
        assert!(events.is_empty());
    }
}
