//! Detection snapshots for export.
//!
//! Each scored sample can be stamped into a self-describing JSON record
//! carrying producer metadata, the confidence map, and the patterns that
//! crossed their thresholds.

use crate::collector::types::{Modality, SensorSample};
use crate::core::classifier::ConfidenceMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The current snapshot format version.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "mundane-sensor-agent";

/// Producer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotProducer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
    /// Host the agent runs on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// One scored sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    /// Snapshot format version
    pub snapshot_version: String,
    /// Unique snapshot identifier
    pub snapshot_id: String,
    /// When the sample was captured (RFC3339)
    pub observed_at_utc: String,
    /// When this snapshot was computed (RFC3339)
    pub computed_at_utc: String,
    /// Producer metadata
    pub producer: SnapshotProducer,
    /// Modality of the scored sample
    pub modality: Modality,
    /// Number of raw values in the sample
    pub value_count: usize,
    /// Confidence per matching pattern
    pub confidences: ConfidenceMap,
    /// Patterns whose confidence exceeded their threshold
    pub detected: Vec<String>,
}

impl DetectionSnapshot {
    pub fn has_detections(&self) -> bool {
        !self.detected.is_empty()
    }
}

/// Builder for detection snapshots.
pub struct SnapshotBuilder {
    instance_id: Uuid,
    device_id: Option<String>,
}

impl SnapshotBuilder {
    /// Create a builder with a fresh instance ID and the local hostname.
    pub fn new() -> Self {
        let device_id = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok());
        Self {
            instance_id: Uuid::new_v4(),
            device_id,
        }
    }

    /// Override the device ID.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Get the instance ID.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Build a snapshot from a sample and its scoring result.
    pub fn build(
        &self,
        sample: &SensorSample,
        confidences: &ConfidenceMap,
        detected: Vec<String>,
    ) -> DetectionSnapshot {
        let computed_at = Utc::now();
        let observed_at = sample.observed_at().unwrap_or(computed_at);

        DetectionSnapshot {
            snapshot_version: SNAPSHOT_VERSION.to_string(),
            snapshot_id: Uuid::new_v4().to_string(),
            observed_at_utc: observed_at.to_rfc3339(),
            computed_at_utc: computed_at.to_rfc3339(),
            producer: SnapshotProducer {
                name: PRODUCER_NAME.to_string(),
                version: crate::VERSION.to_string(),
                instance_id: self.instance_id.to_string(),
                device_id: self.device_id.clone(),
            },
            modality: sample.modality,
            value_count: sample.values.len(),
            confidences: confidences.clone(),
            detected,
        }
    }

    /// Build a snapshot and serialize it to JSON.
    pub fn build_json(
        &self,
        sample: &SensorSample,
        confidences: &ConfidenceMap,
        detected: Vec<String>,
    ) -> String {
        let snapshot = self.build(sample, confidences, detected);
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confidences() -> ConfidenceMap {
        let mut map = ConfidenceMap::new();
        map.insert("kettle".to_string(), 0.92);
        map.insert("dishwasher".to_string(), 0.1);
        map
    }

    #[test]
    fn test_builder_instance_id_is_stable() {
        let builder = SnapshotBuilder::new();
        let sample = SensorSample::new(1_700_000_000_000, Modality::Audio, vec![0.1]);
        let a = builder.build(&sample, &confidences(), vec![]);
        let b = builder.build(&sample, &confidences(), vec![]);
        assert_eq!(a.producer.instance_id, b.producer.instance_id);
        assert_ne!(a.snapshot_id, b.snapshot_id);
    }

    #[test]
    fn test_snapshot_contents() {
        let builder = SnapshotBuilder::new().with_device_id("kitchen-pi");
        let sample = SensorSample::new(1_700_000_000_000, Modality::Audio, vec![0.1, 0.2]);
        let snapshot = builder.build(&sample, &confidences(), vec!["kettle".to_string()]);

        assert_eq!(snapshot.snapshot_version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.producer.name, PRODUCER_NAME);
        assert_eq!(snapshot.producer.device_id.as_deref(), Some("kitchen-pi"));
        assert_eq!(snapshot.value_count, 2);
        assert!(snapshot.observed_at_utc.starts_with("2023-11-14"));
        assert!(snapshot.has_detections());
    }

    #[test]
    fn test_snapshot_json() {
        let builder = SnapshotBuilder::new();
        let sample = SensorSample::new(0, Modality::Light, vec![300.0]);
        let json = builder.build_json(&sample, &ConfidenceMap::new(), vec![]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["modality"], "light");
        assert!(value["detected"].as_array().unwrap().is_empty());
    }
}
