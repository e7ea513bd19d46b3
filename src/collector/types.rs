//! Sensor sample types consumed by the pipeline.
//!
//! A sample is one timestamped reading from a single modality. Samples are
//! immutable once produced; the pipeline only ever borrows them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sensor modality a sample was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Microphone time-domain frames
    Audio,
    /// Interleaved x,y,z acceleration
    Accelerometer,
    /// Interleaved x,y,z angular velocity
    Gyroscope,
    /// Ambient light (illuminance)
    Light,
    /// Camera frames (accepted, but no feature extractor exists)
    Camera,
    /// Any modality name this agent does not recognise
    #[serde(other)]
    Unknown,
}

impl Modality {
    /// All modalities a pattern can be registered against.
    pub const SUPPORTED: [Modality; 4] = [
        Modality::Audio,
        Modality::Accelerometer,
        Modality::Gyroscope,
        Modality::Light,
    ];

    /// Whether a feature extractor exists for this modality.
    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }

    /// Whether values arrive as interleaved x,y,z triplets.
    pub fn is_triaxial(&self) -> bool {
        matches!(self, Modality::Accelerometer | Modality::Gyroscope)
    }

    /// Lower-case name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Audio => "audio",
            Modality::Accelerometer => "accelerometer",
            Modality::Gyroscope => "gyroscope",
            Modality::Light => "light",
            Modality::Camera => "camera",
            Modality::Unknown => "unknown",
        }
    }

    /// Parse a modality name, falling back to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "audio" => Modality::Audio,
            "accelerometer" => Modality::Accelerometer,
            "gyroscope" => Modality::Gyroscope,
            "light" => Modality::Light,
            "camera" => Modality::Camera,
            _ => Modality::Unknown,
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single raw sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Raw channel values, interleaved for multi-axis sensors
    pub values: Vec<f64>,
    /// Modality the values came from
    #[serde(rename = "type", alias = "modality")]
    pub modality: Modality,
}

impl SensorSample {
    pub fn new(timestamp: i64, modality: Modality, values: Vec<f64>) -> Self {
        Self {
            timestamp,
            values,
            modality,
        }
    }

    /// Create a sample stamped with the current time.
    pub fn now(modality: Modality, values: Vec<f64>) -> Self {
        Self::new(Utc::now().timestamp_millis(), modality, values)
    }

    /// Capture time as a UTC datetime, if the timestamp is representable.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modality_support() {
        assert!(Modality::Audio.is_supported());
        assert!(Modality::Light.is_supported());
        assert!(!Modality::Camera.is_supported());
        assert!(!Modality::Unknown.is_supported());
        assert!(Modality::Gyroscope.is_triaxial());
        assert!(!Modality::Audio.is_triaxial());
    }

    #[test]
    fn test_sample_deserializes_original_field_names() {
        let json = r#"{"timestamp": 1700000000000, "values": [0.1, -0.2], "type": "audio"}"#;
        let sample: SensorSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.modality, Modality::Audio);
        assert_eq!(sample.len(), 2);
    }

    #[test]
    fn test_unrecognised_modality_maps_to_unknown() {
        let json = r#"{"timestamp": 0, "values": [1.0], "type": "barometer"}"#;
        let sample: SensorSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.modality, Modality::Unknown);
        assert_eq!(Modality::parse("Barometer"), Modality::Unknown);
        assert_eq!(Modality::parse(" Light "), Modality::Light);
    }

    #[test]
    fn test_observed_at() {
        let sample = SensorSample::new(1_000, Modality::Light, vec![300.0]);
        assert_eq!(sample.observed_at().unwrap().timestamp(), 1);
    }
}
