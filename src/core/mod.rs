//! Core inference pipeline for the Mundane Sensor Agent.
//!
//! This module contains:
//! - Feature extraction per sensor modality
//! - Per-pattern smoothing filters
//! - The pattern registry and classifier
//! - Bounded audio capture per pattern
//! - Training and evaluation
//! - Detection snapshots for export

pub mod buffer;
pub mod classifier;
pub mod error;
pub mod features;
pub mod filter;
pub mod pattern;
pub mod snapshot;
pub mod training;

// Re-export commonly used types
pub use buffer::{AudioBufferBank, AudioRingBuffer};
pub use classifier::{confidence, ConfidenceMap, PatternClassifier};
pub use error::PipelineError;
pub use features::{feature_names, FeatureExtractor, FeatureVector};
pub use filter::{FilterBank, FilterState};
pub use pattern::{AudioCaptureConfig, PatternDefinition, PatternRegistry};
pub use snapshot::{DetectionSnapshot, SnapshotBuilder, PRODUCER_NAME, SNAPSHOT_VERSION};
pub use training::{
    EvaluationMetrics, ThresholdOptimization, TrainingDriver, TrainingGuard, TrainingResult,
};
