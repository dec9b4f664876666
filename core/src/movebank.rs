//! Movebank vocabulary and the common queries built on it.
//!
//! The client itself is vocabulary-agnostic; this module only names entity
//! types and sensor ids the public service documents, and wraps the handful
//! of queries most callers start with.

use std::fmt;

use crate::client::MovebankClient;
use crate::error::ApiError;
use crate::params::{ParamValue, RequestParams};
use crate::response::Row;
use crate::transport::Transport;

/// Record categories the `direct-read` service returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Study,
    Individual,
    Event,
    Tag,
    Sensor,
    Deployment,
    TagType,
    StudyAttribute,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Study => "study",
            EntityType::Individual => "individual",
            EntityType::Event => "event",
            EntityType::Tag => "tag",
            EntityType::Sensor => "sensor",
            EntityType::Deployment => "deployment",
            EntityType::TagType => "tag_type",
            EntityType::StudyAttribute => "study_attribute",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EntityType> for ParamValue {
    fn from(value: EntityType) -> Self {
        ParamValue::Str(value.as_str().to_string())
    }
}

/// Sensor types with the ids listed by `entity_type=tag_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    BirdRing,
    Gps,
    RadioTransmitter,
    ArgosDopplerShift,
    NaturalMark,
    Acceleration,
    SolarGeolocator,
    AccessoryMeasurements,
    SolarGeolocatorRaw,
    Barometer,
    Magnetometer,
    Orientation,
    SolarGeolocatorTwilight,
}

const SENSOR_IDS: [(SensorType, i64, &str); 13] = [
    (SensorType::BirdRing, 397, "bird-ring"),
    (SensorType::Gps, 653, "gps"),
    (SensorType::RadioTransmitter, 673, "radio-transmitter"),
    (SensorType::ArgosDopplerShift, 82798, "argos-doppler-shift"),
    (SensorType::NaturalMark, 2365682, "natural-mark"),
    (SensorType::Acceleration, 2365683, "acceleration"),
    (SensorType::SolarGeolocator, 3886361, "solar-geolocator"),
    (SensorType::AccessoryMeasurements, 7842954, "accessory-measurements"),
    (SensorType::SolarGeolocatorRaw, 9301403, "solar-geolocator-raw"),
    (SensorType::Barometer, 77740391, "barometer"),
    (SensorType::Magnetometer, 77740402, "magnetometer"),
    (SensorType::Orientation, 819073350, "orientation"),
    (SensorType::SolarGeolocatorTwilight, 914097241, "solar-geolocator-twilight"),
];

impl SensorType {
    pub fn id(self) -> i64 {
        SENSOR_IDS
            .iter()
            .find(|(s, _, _)| *s == self)
            .map(|(_, id, _)| *id)
            .unwrap_or_default()
    }

    pub fn external_id(self) -> &'static str {
        SENSOR_IDS
            .iter()
            .find(|(s, _, _)| *s == self)
            .map(|(_, _, ext)| *ext)
            .unwrap_or_default()
    }

    pub fn from_id(id: i64) -> Option<SensorType> {
        SENSOR_IDS.iter().find(|(_, i, _)| *i == id).map(|(s, _, _)| *s)
    }

    pub fn is_location_sensor(self) -> bool {
        matches!(
            self,
            SensorType::BirdRing
                | SensorType::Gps
                | SensorType::RadioTransmitter
                | SensorType::ArgosDopplerShift
                | SensorType::NaturalMark
                | SensorType::SolarGeolocator
        )
    }
}

impl From<SensorType> for ParamValue {
    fn from(value: SensorType) -> Self {
        ParamValue::Int(value.id())
    }
}

impl<T: Transport> MovebankClient<T> {
    /// Studies whose data the account can see in full.
    pub fn studies(&self) -> Result<Vec<Row>, ApiError> {
        let params = RequestParams::new(EntityType::Study)
            .with("i_can_see_data", true)
            .with("there_are_data_which_i_cannot_see", false);
        let rows = self.fetch_csv(&params)?;
        Ok(rows
            .into_iter()
            .filter(|s| {
                s.get("i_can_see_data").map(String::as_str) == Some("true")
                    && s.get("there_are_data_which_i_cannot_see").map(String::as_str) == Some("false")
            })
            .collect())
    }

    pub fn individuals_by_study(&self, study_id: impl Into<ParamValue>) -> Result<Vec<Row>, ApiError> {
        let params = RequestParams::new(EntityType::Individual).with("study_id", study_id);
        self.fetch_csv(&params)
    }

    /// All event attributes recorded by one sensor on one individual.
    pub fn individual_events(
        &self,
        study_id: impl Into<ParamValue>,
        individual_id: impl Into<ParamValue>,
        sensor: impl Into<ParamValue>,
    ) -> Result<Vec<Row>, ApiError> {
        let params = RequestParams::new(EntityType::Event)
            .with("study_id", study_id)
            .with("individual_id", individual_id)
            .with("sensor_type_id", sensor)
            .with("attributes", "all");
        self.fetch_csv(&params)
    }
}

/// Studies whose `sensor_type_ids` column mentions `sensor_name`, e.g. `GPS`.
pub fn studies_by_sensor<'a>(studies: &'a [Row], sensor_name: &str) -> Vec<&'a Row> {
    studies
        .iter()
        .filter(|s| {
            s.get("sensor_type_ids")
                .is_some_and(|ids| ids.contains(sensor_name))
        })
        .collect()
}
