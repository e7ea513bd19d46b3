//! Feature extraction from raw sensor samples.
//!
//! Each supported modality maps to a fixed-length vector of summary
//! statistics. Vectors are min-max normalized across their own components,
//! so every component lies in [0, 1].

use crate::collector::types::{Modality, SensorSample};
use crate::core::error::PipelineError;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Default audio sample rate used for the zero-crossing frequency estimate.
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 44_100;

const AUDIO_FEATURES: &[&str] = &["rms", "zcr_frequency", "variance"];
const TRIAXIAL_FEATURES: &[&str] = &[
    "rms_x",
    "rms_y",
    "rms_z",
    "variance_x",
    "variance_y",
    "variance_z",
];
const LIGHT_FEATURES: &[&str] = &["rms", "variance"];

/// Component names for a modality's feature vector, in order.
pub fn feature_names(modality: Modality) -> &'static [&'static str] {
    match modality {
        Modality::Audio => AUDIO_FEATURES,
        Modality::Accelerometer | Modality::Gyroscope => TRIAXIAL_FEATURES,
        Modality::Light => LIGHT_FEATURES,
        Modality::Camera | Modality::Unknown => &[],
    }
}

/// Number of components a modality's feature vector has (0 if unsupported).
pub fn feature_len(modality: Modality) -> usize {
    feature_names(modality).len()
}

/// A normalized feature vector. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Elementwise mean absolute difference against another vector.
    ///
    /// Returns `None` when the lengths differ or either vector is empty.
    pub fn mean_abs_difference(&self, other: &FeatureVector) -> Option<f64> {
        if self.len() != other.len() || self.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| (a - b).abs())
                .mean(),
        )
    }

    /// Elementwise centroid of equally sized vectors.
    pub fn centroid(vectors: &[FeatureVector]) -> Option<FeatureVector> {
        let first = vectors.first()?;
        if vectors.iter().any(|v| v.len() != first.len()) {
            return None;
        }
        let centroid = (0..first.len())
            .map(|i| vectors.iter().map(|v| v.0[i]).mean())
            .collect();
        Some(FeatureVector(centroid))
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Stateless, modality-aware feature extractor.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    audio_sample_rate: u32,
}

impl FeatureExtractor {
    pub fn new(audio_sample_rate: u32) -> Self {
        Self { audio_sample_rate }
    }

    pub fn audio_sample_rate(&self) -> u32 {
        self.audio_sample_rate
    }

    /// Extract a normalized feature vector from a sample.
    pub fn extract(&self, sample: &SensorSample) -> Result<FeatureVector, PipelineError> {
        validate_sample(sample)?;
        let values = &sample.values;

        let raw = match sample.modality {
            Modality::Audio => vec![
                rms(values),
                zero_crossing_frequency(values, self.audio_sample_rate),
                variance(values),
            ],
            Modality::Accelerometer | Modality::Gyroscope => {
                let [x, y, z] = deinterleave(values);
                vec![
                    rms(&x),
                    rms(&y),
                    rms(&z),
                    variance(&x),
                    variance(&y),
                    variance(&z),
                ]
            }
            Modality::Light => vec![rms(values), variance(values)],
            Modality::Camera | Modality::Unknown => {
                return Err(PipelineError::validation(format!(
                    "no feature extractor for modality '{}'",
                    sample.modality
                )))
            }
        };

        if raw.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::validation(format!(
                "{} sample magnitude overflows its features",
                sample.modality
            )));
        }
        let normalized = normalize(&raw);
        if normalized.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::validation(format!(
                "{} sample features cannot be normalized",
                sample.modality
            )));
        }

        Ok(FeatureVector(normalized))
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_SAMPLE_RATE)
    }
}

/// Reject samples that would produce undefined statistics.
pub fn validate_sample(sample: &SensorSample) -> Result<(), PipelineError> {
    if sample.values.is_empty() {
        return Err(PipelineError::validation("sample has no values"));
    }
    if let Some(i) = sample.values.iter().position(|v| !v.is_finite()) {
        return Err(PipelineError::validation(format!(
            "sample value at index {i} is not finite"
        )));
    }
    if sample.modality.is_triaxial() && sample.values.len() < 3 {
        return Err(PipelineError::validation(format!(
            "{} sample needs at least one x,y,z triplet, got {} values",
            sample.modality,
            sample.values.len()
        )));
    }
    Ok(())
}

/// Root-mean-square of a non-empty slice.
pub fn rms(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).mean().sqrt()
}

/// Population variance of a non-empty slice.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().population_variance()
}

/// Frequency estimate from the zero-crossing rate.
///
/// A crossing is counted wherever consecutive samples straddle zero (one
/// `>= 0`, the other `< 0`).
pub fn zero_crossing_frequency(values: &[f64], sample_rate: u32) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let crossings = values
        .windows(2)
        .filter(|pair| (pair[1] >= 0.0) != (pair[0] >= 0.0))
        .count();
    (crossings as f64 * sample_rate as f64) / (2.0 * values.len() as f64)
}

/// Split interleaved x,y,z values into three channels.
fn deinterleave(values: &[f64]) -> [Vec<f64>; 3] {
    let mut channels: [Vec<f64>; 3] = Default::default();
    for (i, &v) in values.iter().enumerate() {
        channels[i % 3].push(v);
    }
    channels
}

/// Min-max normalize a vector across its own components.
///
/// A constant vector has no range to scale by and maps to all zeros.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}
