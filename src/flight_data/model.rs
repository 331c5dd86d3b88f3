use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::FlightDataError;

/// Geodetic position of an aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// Degrees
    pub longitude: f64,
    /// Degrees
    pub latitude: f64,
    /// Meters; barometric when known, geometric otherwise
    pub altitude: f64,
}

/// One sample of an aircraft's historical path.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub time: Option<DateTime<Utc>>,
    pub longitude: f64,
    pub latitude: f64,
    /// Barometric altitude in meters
    pub altitude: Option<f64>,
    /// True track in degrees
    pub heading: Option<f64>,
    pub on_ground: bool,
}

/// One tracked aircraft at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftState {
    /// ICAO 24-bit address (hex string)
    pub id: String,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub position: Position,
    /// True track in degrees (0-360)
    pub heading: f64,
    /// Ground speed in m/s
    pub velocity: f64,
    pub on_ground: bool,
    /// m/s, positive when climbing
    pub vertical_rate: Option<f64>,
    pub squawk: Option<String>,
    pub last_contact: Option<DateTime<Utc>>,
    /// Historical positions, empty until a track has been fetched
    pub track: Vec<TrackPoint>,
}

impl AircraftState {
    /// Callsign for display, "N/A" when unknown.
    pub fn display_callsign(&self) -> &str {
        match self.callsign.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => "N/A",
        }
    }
}

// State vector column indices
const COL_ICAO24: usize = 0;
const COL_CALLSIGN: usize = 1;
const COL_ORIGIN_COUNTRY: usize = 2;
const COL_LAST_CONTACT: usize = 4;
const COL_LONGITUDE: usize = 5;
const COL_LATITUDE: usize = 6;
const COL_BARO_ALTITUDE: usize = 7;
const COL_ON_GROUND: usize = 8;
const COL_VELOCITY: usize = 9;
const COL_TRUE_TRACK: usize = 10;
const COL_VERTICAL_RATE: usize = 11;
const COL_GEO_ALTITUDE: usize = 13;
const COL_SQUAWK: usize = 14;

fn column<'a>(row: &'a [Value], idx: usize) -> Option<&'a Value> {
    row.get(idx).filter(|v| !v.is_null())
}

fn f64_at(row: &[Value], idx: usize) -> Option<f64> {
    column(row, idx).and_then(Value::as_f64)
}

fn string_at(row: &[Value], idx: usize) -> Option<String> {
    column(row, idx)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn timestamp(secs: Option<f64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s as i64, 0).single())
}

/// Parse a `/states/all` response body into aircraft states.
///
/// `states: null` means nothing is in the box. Rows without a position are
/// skipped since there is nothing to place in the scene.
pub fn parse_states(body: &Value) -> Result<Vec<AircraftState>, FlightDataError> {
    let states = body
        .get("states")
        .ok_or_else(|| FlightDataError::Data("response has no `states` field".to_string()))?;

    let rows = match states {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        other => {
            return Err(FlightDataError::Data(format!(
                "`states` is not an array: {}",
                other
            )))
        }
    };

    let mut aircraft = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(state) = parse_state_row(row)? {
            aircraft.push(state);
        }
    }
    Ok(aircraft)
}

/// Parse one state vector. `Ok(None)` for rows that carry no position.
pub fn parse_state_row(row: &Value) -> Result<Option<AircraftState>, FlightDataError> {
    let row = row
        .as_array()
        .ok_or_else(|| FlightDataError::Data("state vector is not an array".to_string()))?;

    let id = column(row, COL_ICAO24)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| FlightDataError::Data("state vector has no icao24".to_string()))?;

    let (Some(longitude), Some(latitude)) =
        (f64_at(row, COL_LONGITUDE), f64_at(row, COL_LATITUDE))
    else {
        return Ok(None);
    };

    let altitude = f64_at(row, COL_BARO_ALTITUDE)
        .or_else(|| f64_at(row, COL_GEO_ALTITUDE))
        .unwrap_or(0.0);

    Ok(Some(AircraftState {
        id,
        callsign: string_at(row, COL_CALLSIGN),
        origin_country: string_at(row, COL_ORIGIN_COUNTRY),
        position: Position {
            longitude,
            latitude,
            altitude,
        },
        heading: f64_at(row, COL_TRUE_TRACK).unwrap_or(0.0),
        velocity: f64_at(row, COL_VELOCITY).unwrap_or(0.0),
        on_ground: column(row, COL_ON_GROUND)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        vertical_rate: f64_at(row, COL_VERTICAL_RATE),
        squawk: string_at(row, COL_SQUAWK),
        last_contact: timestamp(f64_at(row, COL_LAST_CONTACT)),
        track: Vec::new(),
    }))
}

/// Parse a `/tracks/all` response body. A missing `path` is an empty track.
pub fn parse_track(body: &Value) -> Result<Vec<TrackPoint>, FlightDataError> {
    let rows = match body.get("path") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(FlightDataError::Data("`path` is not an array".to_string())),
    };

    // Waypoint columns: time, latitude, longitude, baro_altitude, true_track, on_ground
    Ok(rows
        .iter()
        .filter_map(Value::as_array)
        .filter_map(|w| {
            Some(TrackPoint {
                time: timestamp(f64_at(w, 0)),
                latitude: f64_at(w, 1)?,
                longitude: f64_at(w, 2)?,
                altitude: f64_at(w, 3),
                heading: f64_at(w, 4),
                on_ground: column(w, 5).and_then(Value::as_bool).unwrap_or(false),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn swiss_row() -> Value {
        json!([
            "4b1805", "SWR123  ", "Switzerland", 1700000000, 1700000005,
            6.75, 46.9, 10972.8, false, 231.5, 271.3, -2.6,
            null, 11049.0, "1000", false, 0, 0
        ])
    }

    #[test]
    fn parses_full_row() {
        let state = parse_state_row(&swiss_row()).unwrap().unwrap();
        assert_eq!(state.id, "4b1805");
        assert_eq!(state.callsign.as_deref(), Some("SWR123"));
        assert_eq!(state.origin_country.as_deref(), Some("Switzerland"));
        assert_eq!(state.position.longitude, 6.75);
        assert_eq!(state.position.latitude, 46.9);
        assert_eq!(state.position.altitude, 10972.8);
        assert_eq!(state.heading, 271.3);
        assert_eq!(state.velocity, 231.5);
        assert_eq!(state.vertical_rate, Some(-2.6));
        assert_eq!(state.squawk.as_deref(), Some("1000"));
        assert_eq!(
            state.last_contact.map(|t| t.timestamp()),
            Some(1_700_000_005)
        );
        assert!(state.track.is_empty());
    }

    #[test]
    fn altitude_falls_back_to_geometric_then_zero() {
        let mut row = swiss_row();
        row[7] = Value::Null;
        let state = parse_state_row(&row).unwrap().unwrap();
        assert_eq!(state.position.altitude, 11049.0);

        row[13] = Value::Null;
        let state = parse_state_row(&row).unwrap().unwrap();
        assert_eq!(state.position.altitude, 0.0);
    }

    #[test]
    fn blank_callsign_displays_na() {
        let mut row = swiss_row();
        row[1] = json!("        ");
        let state = parse_state_row(&row).unwrap().unwrap();
        assert_eq!(state.callsign, None);
        assert_eq!(state.display_callsign(), "N/A");
    }

    #[test]
    fn rows_without_position_are_skipped() {
        let mut row = swiss_row();
        row[5] = Value::Null;
        assert_eq!(parse_state_row(&row).unwrap(), None);
    }

    #[test]
    fn row_without_id_is_malformed() {
        let mut row = swiss_row();
        row[0] = Value::Null;
        assert!(matches!(parse_state_row(&row), Err(FlightDataError::Data(_))));
        assert!(matches!(
            parse_state_row(&json!({"icao24": "abc"})),
            Err(FlightDataError::Data(_))
        ));
    }

    #[test]
    fn null_states_is_an_empty_snapshot() {
        let body = json!({"time": 1700000000, "states": null});
        assert!(parse_states(&body).unwrap().is_empty());
    }

    #[test]
    fn missing_or_wrong_states_is_malformed() {
        assert!(matches!(
            parse_states(&json!({"time": 1})),
            Err(FlightDataError::Data(_))
        ));
        assert!(matches!(
            parse_states(&json!({"states": "nope"})),
            Err(FlightDataError::Data(_))
        ));
    }

    #[test]
    fn parses_track_waypoints() {
        let body = json!({
            "icao24": "4b1805",
            "path": [
                [1700000000, 46.5, 6.5, 3000.0, 90.0, false],
                [1700000060, 46.6, 6.7, null, null, false],
                [1700000120, null, 6.9, 3100.0, 91.0, false]
            ]
        });
        let track = parse_track(&body).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track[0].latitude, 46.5);
        assert_eq!(track[0].longitude, 6.5);
        assert_eq!(track[0].altitude, Some(3000.0));
        assert_eq!(track[1].altitude, None);
        assert!(parse_track(&json!({"icao24": "x"})).unwrap().is_empty());
    }
}
