//! Decoding of raw event rows into typed sensor samples.
//!
//! GPS rows reduce to `(timestamp, deployment, lat, long)`. Acceleration rows
//! from e-obs tags carry a burst of raw 12-bit `X Y Z X Y Z ...` readings that
//! are centred on 2048, scaled by the tag generation's slope, and spread over
//! the burst at the sampling frequency.

use chrono::{Duration, NaiveDateTime};
use tracing::warn;

use crate::error::ApiError;
use crate::response::Row;

/// Timestamp layout used by Movebank event tables.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const STANDARD_GRAVITY: f64 = 9.81;
const ADC_MIDPOINT: f64 = 2048.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    pub timestamp: String,
    pub deployment_id: String,
    pub location_lat: Option<f64>,
    pub location_long: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccUnit {
    #[default]
    MetersPerSecondSquared,
    G,
}

impl AccUnit {
    fn factor(self) -> f64 {
        match self {
            AccUnit::MetersPerSecondSquared => STANDARD_GRAVITY,
            AccUnit::G => 1.0,
        }
    }
}

/// Range setting of first-generation e-obs tags. Later generations ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    #[default]
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccSample {
    pub timestamp: String,
    pub deployment_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

fn field<'a>(row: &'a Row, name: &str) -> Result<&'a str, ApiError> {
    row.get(name)
        .map(String::as_str)
        .ok_or_else(|| ApiError::Format(format!("event row has no {name:?} column")))
}

fn coordinate(row: &Row, name: &str) -> Result<Option<f64>, ApiError> {
    let raw = field(row, name)?.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            warn!(column = name, value = raw, "could not parse coordinate");
            Ok(None)
        }
    }
}

pub fn transform_raw_gps(events: &[Row]) -> Result<Vec<GpsFix>, ApiError> {
    events
        .iter()
        .map(|e| {
            Ok(GpsFix {
                timestamp: field(e, "timestamp")?.to_string(),
                deployment_id: field(e, "deployment_id")?.to_string(),
                location_lat: coordinate(e, "location_lat")?,
                location_long: coordinate(e, "location_long")?,
            })
        })
        .collect()
}

/// Conversion slope for an e-obs tag, chosen by its serial number.
pub fn eobs_slope(tag_local_identifier: i64, sensitivity: Sensitivity) -> f64 {
    match tag_local_identifier {
        i64::MIN..=2241 => match sensitivity {
            Sensitivity::High => 0.001,
            Sensitivity::Low => 0.0027,
        },
        2242..=4117 => 0.0022,
        _ => 1.0 / 512.0,
    }
}

/// Decode every acceleration burst. The outer vector has one entry per event
/// row; a trailing incomplete `X Y Z` triple is dropped.
pub fn transform_raw_acc(
    events: &[Row],
    unit: AccUnit,
    sensitivity: Sensitivity,
) -> Result<Vec<Vec<AccSample>>, ApiError> {
    events
        .iter()
        .map(|event| decode_burst(event, unit, sensitivity))
        .collect()
}

fn decode_burst(event: &Row, unit: AccUnit, sensitivity: Sensitivity) -> Result<Vec<AccSample>, ApiError> {
    let tag: i64 = parse_field(event, "tag_local_identifier")?;
    let frequency: f64 = parse_field(event, "acceleration_sampling_frequency_per_axis")?;
    if frequency.is_nan() || frequency <= 0.0 {
        return Err(ApiError::Format(format!("sampling frequency must be positive, got {frequency}")));
    }
    let deployment_id = field(event, "deployment_id")?;
    let start = NaiveDateTime::parse_from_str(field(event, "timestamp")?, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| ApiError::Format(format!("bad event timestamp: {e}")))?;

    let raw = field(event, "accelerations_raw")?
        .split_whitespace()
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| ApiError::Format(format!("bad raw acceleration value {v:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let scale = eobs_slope(tag, sensitivity) * unit.factor();
    let convert = |v: i64| (v as f64 - ADC_MIDPOINT) * scale;
    let step_micros = 1_000_000.0 / frequency;

    raw.chunks_exact(3)
        .enumerate()
        .map(|(i, xyz)| {
            let micros = (i as f64 * step_micros).round();
            let timestamp = (micros.abs() < i64::MAX as f64)
                .then(|| Duration::microseconds(micros as i64))
                .and_then(|offset| start.checked_add_signed(offset))
                .ok_or_else(|| ApiError::Format("burst timestamp out of range".to_string()))?;
            Ok(AccSample {
                timestamp: timestamp.format(TIMESTAMP_FORMAT).to_string(),
                deployment_id: deployment_id.to_string(),
                x: convert(xyz[0]),
                y: convert(xyz[1]),
                z: convert(xyz[2]),
            })
        })
        .collect()
}

fn parse_field<V: std::str::FromStr>(row: &Row, name: &str) -> Result<V, ApiError> {
    let raw = field(row, name)?;
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Format(format!("{name} is not numeric: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn acc_event(tag: &str, raw: &str) -> Row {
        row(&[
            ("timestamp", "2014-07-01 12:00:00.000"),
            ("deployment_id", "2158"),
            ("tag_local_identifier", tag),
            ("acceleration_sampling_frequency_per_axis", "10"),
            ("accelerations_raw", raw),
        ])
    }

    #[test]
    fn gps_rows_reduce_to_fixes() {
        let events = vec![
            row(&[
                ("timestamp", "2008-05-31 13:30:02.000"),
                ("deployment_id", "42"),
                ("location_lat", "-1.3737"),
                ("location_long", "-89.6268"),
                ("ground_speed", "3.2"),
            ]),
            row(&[
                ("timestamp", "2008-05-31 15:00:00.000"),
                ("deployment_id", "42"),
                ("location_lat", ""),
                ("location_long", "n/a"),
            ]),
        ];
        let fixes = transform_raw_gps(&events).unwrap();
        assert_eq!(fixes[0].location_lat, Some(-1.3737));
        assert_eq!(fixes[0].location_long, Some(-89.6268));
        assert_eq!(fixes[1].location_lat, None);
        assert_eq!(fixes[1].location_long, None);
        assert_eq!(fixes[1].timestamp, "2008-05-31 15:00:00.000");
    }

    #[test]
    fn gps_missing_column_is_format_error() {
        let events = vec![row(&[("timestamp", "2008-05-31 13:30:02.000")])];
        assert!(matches!(transform_raw_gps(&events), Err(ApiError::Format(_))));
    }

    #[test]
    fn slope_by_tag_generation() {
        assert_eq!(eobs_slope(1500, Sensitivity::High), 0.001);
        assert_eq!(eobs_slope(1500, Sensitivity::Low), 0.0027);
        assert_eq!(eobs_slope(2242, Sensitivity::Low), 0.0022);
        assert_eq!(eobs_slope(4117, Sensitivity::High), 0.0022);
        assert_eq!(eobs_slope(4118, Sensitivity::High), 1.0 / 512.0);
    }

    #[test]
    fn acc_burst_is_centred_scaled_and_timed() {
        let events = vec![acc_event("5000", "2048 2560 1536 2048 2048 3072 1")];
        let bursts = transform_raw_acc(&events, AccUnit::G, Sensitivity::High).unwrap();
        assert_eq!(bursts.len(), 1);
        let samples = &bursts[0];
        assert_eq!(samples.len(), 2);

        assert_eq!(samples[0].timestamp, "2014-07-01 12:00:00.000");
        assert_eq!(samples[0].x, 0.0);
        assert_eq!(samples[0].y, 1.0);
        assert_eq!(samples[0].z, -1.0);

        assert_eq!(samples[1].timestamp, "2014-07-01 12:00:00.100");
        assert_eq!(samples[1].z, 2.0);
        assert_eq!(samples[1].deployment_id, "2158");
    }

    #[test]
    fn acc_in_meters_per_second_squared() {
        let events = vec![acc_event("3000", "3048 2048 2048")];
        let bursts = transform_raw_acc(&events, AccUnit::MetersPerSecondSquared, Sensitivity::High).unwrap();
        let x = bursts[0][0].x;
        assert!((x - 1000.0 * 0.0022 * 9.81).abs() < 1e-9);
    }

    #[test]
    fn acc_rejects_non_numeric_samples() {
        let events = vec![acc_event("5000", "2048 x 2048")];
        assert!(matches!(
            transform_raw_acc(&events, AccUnit::G, Sensitivity::High),
            Err(ApiError::Format(_))
        ));
    }

    #[test]
    fn acc_timestamp_overflow_is_format_error() {
        let mut event = acc_event("5000", "2048 2048 2048 2048 2048 2048");
        event.insert(
            "acceleration_sampling_frequency_per_axis".to_string(),
            "0.00000000000001".to_string(),
        );
        assert!(matches!(
            transform_raw_acc(&[event], AccUnit::G, Sensitivity::High),
            Err(ApiError::Format(_))
        ));
    }

    #[test]
    fn acc_with_no_events_is_empty() {
        assert!(transform_raw_acc(&[], AccUnit::G, Sensitivity::High).unwrap().is_empty());
    }
}
