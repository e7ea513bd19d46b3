//! Pattern definitions and the owned registry holding them.

use crate::collector::types::Modality;
use crate::core::error::PipelineError;
use crate::core::features::{feature_len, FeatureVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Audio capture policy for a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioCaptureConfig {
    /// Whether matching audio is buffered for this pattern
    pub enabled: bool,
    /// Retained duration in seconds
    #[serde(alias = "duration")]
    pub duration_secs: u32,
    /// Sample rate of captured audio (Hz)
    #[serde(alias = "sampleRate")]
    pub sample_rate: u32,
}

impl AudioCaptureConfig {
    pub fn new(duration_secs: u32, sample_rate: u32) -> Self {
        Self {
            enabled: true,
            duration_secs,
            sample_rate,
        }
    }

    /// Maximum number of samples the buffer may retain.
    pub fn max_samples(&self) -> usize {
        self.duration_secs as usize * self.sample_rate as usize
    }
}

/// A household activity the classifier can recognise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDefinition {
    /// Unique pattern key (e.g. "kettle")
    pub name: String,
    /// Modality the pattern is detected from
    #[serde(alias = "sensorType")]
    pub modality: Modality,
    /// Declared feature names, informational
    #[serde(default)]
    pub features: Vec<String>,
    /// Detection threshold in [0, 1]
    pub threshold: f64,
    /// Optional audio capture policy
    #[serde(default, alias = "audioBuffer", skip_serializing_if = "Option::is_none")]
    pub audio_buffer: Option<AudioCaptureConfig>,
}

impl PatternDefinition {
    pub fn new(name: impl Into<String>, modality: Modality, threshold: f64) -> Self {
        Self {
            name: name.into(),
            modality,
            features: Vec::new(),
            threshold,
            audio_buffer: None,
        }
    }

    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_audio_capture(mut self, duration_secs: u32, sample_rate: u32) -> Self {
        self.audio_buffer = Some(AudioCaptureConfig::new(duration_secs, sample_rate));
        self
    }

    /// Capture policy if one is configured and enabled.
    pub fn capture_policy(&self) -> Option<AudioCaptureConfig> {
        self.audio_buffer.filter(|c| c.enabled)
    }

    /// Check the definition is usable by the classifier.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::validation("pattern name must not be empty"));
        }
        validate_threshold(self.threshold)?;
        if !self.modality.is_supported() {
            return Err(PipelineError::validation(format!(
                "pattern '{}' uses modality '{}' which has no feature extractor",
                self.name, self.modality
            )));
        }
        if let Some(policy) = self.capture_policy() {
            if policy.duration_secs == 0 || policy.sample_rate == 0 {
                return Err(PipelineError::validation(format!(
                    "pattern '{}' capture needs a positive duration and sample rate",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_threshold(threshold: f64) -> Result<(), PipelineError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(PipelineError::validation(format!(
            "threshold {threshold} outside [0, 1]"
        )));
    }
    Ok(())
}

/// Owned registry of pattern definitions and their learned references.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    definitions: BTreeMap<String, PatternDefinition>,
    references: BTreeMap<String, FeatureVector>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition. Replacing drops any learned reference.
    pub fn insert(&mut self, definition: PatternDefinition) -> Result<(), PipelineError> {
        definition.validate()?;
        self.references.remove(&definition.name);
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<PatternDefinition, PipelineError> {
        self.references.remove(name);
        self.definitions
            .remove(name)
            .ok_or_else(|| PipelineError::not_found(name))
    }

    pub fn get(&self, name: &str) -> Option<&PatternDefinition> {
        self.definitions.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&PatternDefinition, PipelineError> {
        self.get(name).ok_or_else(|| PipelineError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn update_threshold(&mut self, name: &str, threshold: f64) -> Result<(), PipelineError> {
        validate_threshold(threshold)?;
        let definition = self
            .definitions
            .get_mut(name)
            .ok_or_else(|| PipelineError::not_found(name))?;
        definition.threshold = threshold;
        Ok(())
    }

    /// Install a learned reference vector for a pattern.
    pub fn set_reference(
        &mut self,
        name: &str,
        reference: FeatureVector,
    ) -> Result<(), PipelineError> {
        let definition = self.require(name)?;
        let expected = feature_len(definition.modality);
        if reference.len() != expected {
            return Err(PipelineError::validation(format!(
                "reference for '{name}' has {} components, expected {expected}",
                reference.len()
            )));
        }
        self.references.insert(name.to_string(), reference);
        Ok(())
    }

    pub fn reference(&self, name: &str) -> Option<&FeatureVector> {
        self.references.get(name)
    }

    /// Definitions in name order.
    pub fn definitions(&self) -> impl Iterator<Item = &PatternDefinition> {
        self.definitions.values()
    }

    /// Definitions detected from the given modality, in name order.
    pub fn matching(&self, modality: Modality) -> impl Iterator<Item = &PatternDefinition> {
        self.definitions
            .values()
            .filter(move |d| d.modality == modality)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_validation() {
        assert!(PatternDefinition::new("kettle", Modality::Audio, 0.7)
            .validate()
            .is_ok());
        assert!(PatternDefinition::new("", Modality::Audio, 0.7)
            .validate()
            .is_err());
        assert!(PatternDefinition::new("kettle", Modality::Audio, 1.5)
            .validate()
            .is_err());
        assert!(PatternDefinition::new("door", Modality::Camera, 0.5)
            .validate()
            .is_err());
        assert!(PatternDefinition::new("kettle", Modality::Audio, 0.7)
            .with_audio_capture(0, 44_100)
            .validate()
            .is_err());
    }

    #[test]
    fn test_disabled_capture_policy_is_ignored() {
        let mut def = PatternDefinition::new("kettle", Modality::Audio, 0.7)
            .with_audio_capture(0, 0);
        def.audio_buffer = def.audio_buffer.map(|mut c| {
            c.enabled = false;
            c
        });
        assert!(def.capture_policy().is_none());
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_reference_length_checked() {
        let mut registry = PatternRegistry::new();
        registry
            .insert(PatternDefinition::new("plant_light", Modality::Light, 0.6))
            .unwrap();
        assert!(registry
            .set_reference("plant_light", FeatureVector::new(vec![0.1, 0.2, 0.3]))
            .is_err());
        registry
            .set_reference("plant_light", FeatureVector::new(vec![1.0, 0.0]))
            .unwrap();
        assert!(registry.reference("plant_light").is_some());
        assert!(matches!(
            registry.set_reference("missing", FeatureVector::new(vec![])),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_replace_drops_reference() {
        let mut registry = PatternRegistry::new();
        let def = PatternDefinition::new("plant_light", Modality::Light, 0.6);
        registry.insert(def.clone()).unwrap();
        registry
            .set_reference("plant_light", FeatureVector::new(vec![1.0, 0.0]))
            .unwrap();
        registry.insert(def).unwrap();
        assert!(registry.reference("plant_light").is_none());
    }

    #[test]
    fn test_update_threshold() {
        let mut registry = PatternRegistry::new();
        registry
            .insert(PatternDefinition::new("washer", Modality::Accelerometer, 0.75))
            .unwrap();
        registry.update_threshold("washer", 0.5).unwrap();
        assert_eq!(registry.get("washer").unwrap().threshold, 0.5);
        assert!(registry.update_threshold("washer", -0.1).is_err());
        assert!(matches!(
            registry.update_threshold("dryer", 0.5),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_original_config_field_names() {
        let json = r#"{
            "name": "kettle",
            "sensorType": "audio",
            "features": ["frequency", "amplitude"],
            "threshold": 0.7,
            "audioBuffer": {"enabled": true, "duration": 180, "sampleRate": 44100}
        }"#;
        let def: PatternDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.modality, Modality::Audio);
        assert_eq!(def.capture_policy().unwrap().max_samples(), 180 * 44_100);
    }
}
