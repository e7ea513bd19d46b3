//! Pattern classifier: feature extraction, smoothing, and scoring.
//!
//! The classifier owns the pattern registry, the per-pattern filter bank,
//! and the audio buffers, so a single `&mut` borrow covers one complete
//! `score` call. Calls must be serialized by the caller.

use crate::collector::types::{Modality, SensorSample};
use crate::core::buffer::AudioBufferBank;
use crate::core::error::PipelineError;
use crate::core::features::{validate_sample, FeatureExtractor, FeatureVector};
use crate::core::filter::FilterBank;
use crate::core::pattern::{PatternDefinition, PatternRegistry};
use std::collections::BTreeMap;

/// Confidence per pattern name, produced fresh for each sample.
pub type ConfidenceMap = BTreeMap<String, f64>;

/// Map a distance to a confidence in [0, 1].
///
/// `confidence = clamp(1 - mean_abs_difference / threshold, 0, 1)`. A zero
/// threshold accepts only an exact match.
pub fn confidence(mean_abs_difference: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return if mean_abs_difference == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - mean_abs_difference / threshold).clamp(0.0, 1.0)
}

/// Scores samples against every registered pattern of the same modality.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    extractor: FeatureExtractor,
    registry: PatternRegistry,
    filters: FilterBank,
    buffers: AudioBufferBank,
}

impl PatternClassifier {
    pub fn new(extractor: FeatureExtractor, filters: FilterBank) -> Self {
        Self {
            extractor,
            registry: PatternRegistry::new(),
            filters,
            buffers: AudioBufferBank::new(),
        }
    }

    /// Build a classifier and register every definition.
    pub fn with_patterns(
        extractor: FeatureExtractor,
        filters: FilterBank,
        definitions: impl IntoIterator<Item = PatternDefinition>,
    ) -> Result<Self, PipelineError> {
        let mut classifier = Self::new(extractor, filters);
        for definition in definitions {
            classifier.register(definition)?;
        }
        Ok(classifier)
    }

    /// Register (or replace) a pattern.
    ///
    /// Replacing a pattern discards its filter state, reference and audio.
    /// Capture starts immediately when the policy is enabled.
    pub fn register(&mut self, definition: PatternDefinition) -> Result<(), PipelineError> {
        definition.validate()?;
        let name = definition.name.clone();
        let capture = definition.capture_policy();

        self.filters.remove_pattern(&name);
        self.buffers.reset(&name);
        self.registry.insert(definition)?;
        if let Some(policy) = capture {
            self.buffers.start(&name, policy);
        }

        tracing::info!(pattern = %name, "registered pattern");
        Ok(())
    }

    /// Remove a pattern along with its filter state, reference and buffer.
    pub fn remove(&mut self, name: &str) -> Result<PatternDefinition, PipelineError> {
        let definition = self.registry.remove(name)?;
        self.filters.remove_pattern(name);
        self.buffers.reset(name);
        tracing::info!(pattern = %name, "removed pattern");
        Ok(definition)
    }

    pub fn update_threshold(&mut self, name: &str, threshold: f64) -> Result<(), PipelineError> {
        self.registry.update_threshold(name, threshold)?;
        tracing::debug!(pattern = %name, threshold, "updated threshold");
        Ok(())
    }

    /// Install a learned reference vector.
    ///
    /// Smoothing restarts for the pattern so that scoring after training
    /// does not depend on samples seen before it.
    pub fn set_reference(
        &mut self,
        name: &str,
        reference: FeatureVector,
    ) -> Result<(), PipelineError> {
        self.registry.set_reference(name, reference)?;
        self.filters.remove_pattern(name);
        Ok(())
    }

    pub fn reference(&self, name: &str) -> Option<&FeatureVector> {
        self.registry.reference(name)
    }

    pub fn pattern(&self, name: &str) -> Option<&PatternDefinition> {
        self.registry.get(name)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &PatternDefinition> {
        self.registry.definitions()
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn filters(&self) -> &FilterBank {
        &self.filters
    }

    pub fn buffers(&self) -> &AudioBufferBank {
        &self.buffers
    }

    /// Score a sample against every pattern of its modality.
    ///
    /// Patterns of other modalities are absent from the map. A sample whose
    /// modality matches no pattern yields an empty map. Untrained patterns
    /// score exactly 0. Audio samples are appended to the buffer of every
    /// capturing pattern whose confidence exceeds its threshold.
    pub fn score(&mut self, sample: &SensorSample) -> Result<ConfidenceMap, PipelineError> {
        validate_sample(sample)?;

        let matching: Vec<(String, f64, bool)> = self
            .registry
            .matching(sample.modality)
            .map(|d| (d.name.clone(), d.threshold, d.capture_policy().is_some()))
            .collect();
        let mut confidences = ConfidenceMap::new();
        if matching.is_empty() {
            return Ok(confidences);
        }

        // Extract before touching any filter so a rejected sample leaves state intact.
        let features = self.extractor.extract(sample)?;

        for (name, threshold, capturing) in matching {
            let smoothed = self.filters.filter_vector(&name, &features);
            let score = self
                .registry
                .reference(&name)
                .and_then(|reference| smoothed.mean_abs_difference(reference))
                .map(|distance| confidence(distance, threshold))
                .unwrap_or(0.0);

            if score > threshold && capturing && sample.modality == Modality::Audio {
                self.buffers.append(&name, &sample.values);
            }
            if score > threshold {
                tracing::info!(pattern = %name, confidence = score, "pattern detected");
            }
            confidences.insert(name, score);
        }

        tracing::debug!(
            modality = %sample.modality,
            patterns = confidences.len(),
            "scored sample"
        );
        Ok(confidences)
    }

    /// Pattern names whose confidence exceeds their threshold.
    pub fn detected(&self, confidences: &ConfidenceMap) -> Vec<String> {
        confidences
            .iter()
            .filter(|&(name, &score)| {
                self.registry
                    .get(name)
                    .is_some_and(|d| score > d.threshold)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Smoothed distance of each sample from `reference`, scored offline.
    ///
    /// Every sample is validated and extracted before any smoothing runs.
    /// Smoothing happens on a scratch copy of the pattern's filters: fresh
    /// when `from_current` is false, seeded from the live state otherwise.
    /// Live filters and audio buffers are never touched. Entries are `None`
    /// for samples of another modality or when there is no reference.
    pub fn trial_distances(
        &self,
        name: &str,
        reference: Option<&FeatureVector>,
        samples: &[SensorSample],
        from_current: bool,
    ) -> Result<Vec<Option<f64>>, PipelineError> {
        let modality = self.registry.require(name)?.modality;

        let mut features = Vec::with_capacity(samples.len());
        for sample in samples {
            validate_sample(sample)?;
            features.push(if sample.modality == modality {
                Some(self.extractor.extract(sample)?)
            } else {
                None
            });
        }

        let mut scratch = self.filters.fork(from_current.then_some(name));
        let mut distances = Vec::with_capacity(features.len());
        for feature in &features {
            distances.push(feature.as_ref().and_then(|f| {
                let smoothed = scratch.filter_vector(name, f);
                reference.and_then(|r| smoothed.mean_abs_difference(r))
            }));
        }
        Ok(distances)
    }

    /// Restart audio capture for a pattern with an empty buffer.
    pub fn start_capture(&mut self, name: &str) -> Result<bool, PipelineError> {
        let definition = self.registry.require(name)?;
        match definition.capture_policy() {
            Some(policy) => {
                self.buffers.start(name, policy);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop audio capture for a pattern, keeping retained audio.
    pub fn stop_capture(&mut self, name: &str) -> Result<bool, PipelineError> {
        self.registry.require(name)?;
        Ok(self.buffers.stop(name))
    }

    /// Discard a pattern's audio buffer and its capture configuration.
    pub fn reset_capture(&mut self, name: &str) -> Result<bool, PipelineError> {
        self.registry.require(name)?;
        Ok(self.buffers.reset(name))
    }

    /// Export retained audio for a pattern as WAV bytes.
    pub fn export_audio(&self, name: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        self.registry.require(name)?;
        self.buffers.export(name)
    }

    /// Number of audio samples currently retained for a pattern.
    pub fn buffered_samples(&self, name: &str) -> usize {
        self.buffers.get(name).map_or(0, |b| b.sample_count())
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new(FeatureExtractor::default(), FilterBank::default())
    }
}
