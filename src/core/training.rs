//! Training and evaluation driver.
//!
//! Training installs a reference feature vector (the centroid of the
//! labeled samples) into the classifier. Only one training run may be in
//! flight across the whole driver; a second caller gets `Busy` immediately.

use crate::collector::types::SensorSample;
use crate::core::classifier::{confidence, PatternClassifier};
use crate::core::error::PipelineError;
use crate::core::features::FeatureVector;
use crate::core::pattern::validate_threshold;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Threshold candidates swept by [`TrainingDriver::optimize_threshold`].
pub const DEFAULT_THRESHOLD_CANDIDATES: [f64; 5] = [0.5, 0.6, 0.7, 0.8, 0.9];

/// Outcome of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Pattern that was trained
    pub pattern_name: String,
    /// Validation accuracy (1.0 when no validation set was supplied)
    pub accuracy: f64,
    /// Number of labeled training samples
    pub samples: usize,
    /// Reference feature vector installed into the classifier
    pub features: Vec<f64>,
    /// Completion time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Detection quality over a labeled test set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

/// Result of a threshold sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOptimization {
    pub best_threshold: f64,
    pub best_accuracy: f64,
}

/// Exclusive claim on the driver's single training slot.
///
/// Released on drop. Runs started through the guard skip the slot check.
pub struct TrainingGuard<'a> {
    driver: &'a TrainingDriver,
}

impl TrainingGuard<'_> {
    /// Train while holding the slot. See [`TrainingDriver::train`].
    pub fn train(
        &self,
        classifier: &mut PatternClassifier,
        pattern: &str,
        samples: &[SensorSample],
        validation: Option<&[SensorSample]>,
    ) -> Result<TrainingResult, PipelineError> {
        self.driver
            .train_locked(classifier, pattern, samples, validation)
    }

    /// Sweep thresholds while holding the slot. See
    /// [`TrainingDriver::optimize_threshold`].
    pub fn optimize_threshold(
        &self,
        classifier: &mut PatternClassifier,
        pattern: &str,
        training: &[SensorSample],
        validation: &[SensorSample],
    ) -> Result<ThresholdOptimization, PipelineError> {
        self.driver
            .optimize_locked(classifier, pattern, training, validation)
    }
}

impl Drop for TrainingGuard<'_> {
    fn drop(&mut self) {
        self.driver.in_progress.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates training, evaluation and threshold tuning.
///
/// Validation and evaluation samples are scored offline, so they never
/// advance live smoothing state or land in capture buffers. A call that
/// fails leaves the classifier exactly as it was.
#[derive(Debug)]
pub struct TrainingDriver {
    in_progress: AtomicBool,
    threshold_candidates: Vec<f64>,
}

impl TrainingDriver {
    pub fn new(threshold_candidates: Vec<f64>) -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            threshold_candidates,
        }
    }

    /// Claim the training slot, failing with `Busy` if it is taken.
    pub fn try_begin(&self) -> Result<TrainingGuard<'_>, PipelineError> {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PipelineError::Busy)?;
        Ok(TrainingGuard { driver: self })
    }

    /// Check if a training run is currently active.
    pub fn is_training(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub fn threshold_candidates(&self) -> &[f64] {
        &self.threshold_candidates
    }

    /// Train a pattern from labeled samples.
    ///
    /// The centroid of the training features becomes the pattern's
    /// reference. With a non-empty validation set, accuracy is the share of
    /// validation samples scoring at or above the pattern's threshold.
    pub fn train(
        &self,
        classifier: &mut PatternClassifier,
        pattern: &str,
        samples: &[SensorSample],
        validation: Option<&[SensorSample]>,
    ) -> Result<TrainingResult, PipelineError> {
        self.try_begin()?
            .train(classifier, pattern, samples, validation)
    }

    fn train_locked(
        &self,
        classifier: &mut PatternClassifier,
        pattern: &str,
        samples: &[SensorSample],
        validation: Option<&[SensorSample]>,
    ) -> Result<TrainingResult, PipelineError> {
        let threshold = classifier
            .pattern(pattern)
            .ok_or_else(|| PipelineError::not_found(pattern))?
            .threshold;
        let reference = learn_reference(classifier, pattern, samples)?;

        let accuracy = match validation {
            Some(set) if !set.is_empty() => {
                let distances = classifier.trial_distances(pattern, Some(&reference), set, false)?;
                accuracy_at(&distances, threshold)
            }
            _ => 1.0,
        };

        classifier.set_reference(pattern, reference.clone())?;

        tracing::info!(
            pattern,
            samples = samples.len(),
            accuracy,
            "training complete"
        );

        Ok(TrainingResult {
            pattern_name: pattern.to_string(),
            accuracy,
            samples: samples.len(),
            features: reference.into_inner(),
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Evaluate detection quality.
    ///
    /// `positives` are samples of the pattern, `negatives` samples that are
    /// not. Smoothing continues from the pattern's current state on a
    /// scratch copy. Without negatives there can be no false positives, so
    /// precision is reported as recall.
    pub fn evaluate(
        &self,
        classifier: &PatternClassifier,
        pattern: &str,
        positives: &[SensorSample],
        negatives: &[SensorSample],
    ) -> Result<EvaluationMetrics, PipelineError> {
        let threshold = classifier
            .pattern(pattern)
            .ok_or_else(|| PipelineError::not_found(pattern))?
            .threshold;
        if positives.is_empty() && negatives.is_empty() {
            return Err(PipelineError::validation("evaluation set is empty"));
        }

        let labeled: Vec<SensorSample> = positives.iter().chain(negatives).cloned().collect();
        let distances =
            classifier.trial_distances(pattern, classifier.reference(pattern), &labeled, true)?;
        let (positive, negative) = distances.split_at(positives.len());

        let tp = positive.iter().filter(|&&d| predict(d, threshold)).count();
        let fn_ = positive.len() - tp;
        let fp = negative.iter().filter(|&&d| predict(d, threshold)).count();
        let tn = negative.len() - fp;

        let recall = ratio(tp, tp + fn_);
        let precision = if negatives.is_empty() {
            recall
        } else {
            ratio(tp, tp + fp)
        };
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(EvaluationMetrics {
            accuracy: ratio(tp + tn, tp + tn + fp + fn_),
            precision,
            recall,
            f1_score,
            true_positives: tp,
            false_positives: fp,
            true_negatives: tn,
            false_negatives: fn_,
        })
    }

    /// Sweep the candidate thresholds against one learned reference.
    ///
    /// The first threshold reaching the highest validation accuracy wins. It
    /// is installed on the pattern together with the reference. Nothing is
    /// installed if any candidate or sample is invalid.
    pub fn optimize_threshold(
        &self,
        classifier: &mut PatternClassifier,
        pattern: &str,
        training: &[SensorSample],
        validation: &[SensorSample],
    ) -> Result<ThresholdOptimization, PipelineError> {
        self.try_begin()?
            .optimize_threshold(classifier, pattern, training, validation)
    }

    fn optimize_locked(
        &self,
        classifier: &mut PatternClassifier,
        pattern: &str,
        training: &[SensorSample],
        validation: &[SensorSample],
    ) -> Result<ThresholdOptimization, PipelineError> {
        if self.threshold_candidates.is_empty() {
            return Err(PipelineError::validation("no threshold candidates configured"));
        }
        for &threshold in &self.threshold_candidates {
            validate_threshold(threshold)?;
        }
        classifier.registry().require(pattern)?;
        if validation.is_empty() {
            return Err(PipelineError::validation(format!(
                "no validation samples for '{pattern}'"
            )));
        }

        let reference = learn_reference(classifier, pattern, training)?;
        let distances = classifier.trial_distances(pattern, Some(&reference), validation, false)?;

        let mut best: Option<ThresholdOptimization> = None;
        for &threshold in &self.threshold_candidates {
            let accuracy = accuracy_at(&distances, threshold);
            tracing::debug!(pattern, threshold, accuracy, "threshold candidate");

            if best.map_or(true, |b| accuracy > b.best_accuracy) {
                best = Some(ThresholdOptimization {
                    best_threshold: threshold,
                    best_accuracy: accuracy,
                });
            }
        }
        let best = best.ok_or_else(|| PipelineError::validation("threshold sweep produced no result"))?;

        classifier.set_reference(pattern, reference)?;
        classifier.update_threshold(pattern, best.best_threshold)?;
        tracing::info!(
            pattern,
            threshold = best.best_threshold,
            accuracy = best.best_accuracy,
            "threshold optimized"
        );
        Ok(best)
    }
}

impl Default for TrainingDriver {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_CANDIDATES.to_vec())
    }
}

/// Centroid of the training features. Reads the classifier only.
fn learn_reference(
    classifier: &PatternClassifier,
    pattern: &str,
    samples: &[SensorSample],
) -> Result<FeatureVector, PipelineError> {
    let modality = classifier.registry().require(pattern)?.modality;

    if samples.is_empty() {
        return Err(PipelineError::validation(format!(
            "no training samples for '{pattern}'"
        )));
    }
    if let Some(bad) = samples.iter().find(|s| s.modality != modality) {
        return Err(PipelineError::validation(format!(
            "training sample of modality '{}' for {modality} pattern '{pattern}'",
            bad.modality
        )));
    }

    let features = samples
        .iter()
        .map(|s| classifier.extractor().extract(s))
        .collect::<Result<Vec<_>, _>>()?;
    FeatureVector::centroid(&features)
        .ok_or_else(|| PipelineError::validation("training features have inconsistent lengths"))
}

/// Share of samples detected at or above the threshold.
fn accuracy_at(distances: &[Option<f64>], threshold: f64) -> f64 {
    let correct = distances.iter().filter(|&&d| predict(d, threshold)).count();
    ratio(correct, distances.len())
}

/// A missing distance (untrained, or another modality) scores 0.
fn predict(distance: Option<f64>, threshold: f64) -> bool {
    distance.map_or(0.0, |d| confidence(d, threshold)) >= threshold
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::Modality;
    use crate::core::pattern::PatternDefinition;

    fn tone(amplitude: f64, step: f64) -> SensorSample {
        SensorSample::new(
            0,
            Modality::Audio,
            (0..256).map(|i| (i as f64 * step).sin() * amplitude).collect(),
        )
    }

    fn classifier() -> PatternClassifier {
        let mut classifier = PatternClassifier::default();
        classifier
            .register(PatternDefinition::new("kettle", Modality::Audio, 0.7))
            .unwrap();
        classifier
            .register(PatternDefinition::new("plant_light", Modality::Light, 0.6))
            .unwrap();
        classifier
    }

    #[test]
    fn test_train_installs_centroid() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();
        let samples = vec![tone(0.5, 0.1); 3];

        let result = driver.train(&mut classifier, "kettle", &samples, None).unwrap();
        assert_eq!(result.samples, 3);
        assert_eq!(result.accuracy, 1.0);
        assert_eq!(
            classifier.reference("kettle").unwrap().as_slice(),
            result.features.as_slice()
        );
        assert!(!driver.is_training());
    }

    #[test]
    fn test_train_rejects_bad_input() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();
        assert!(matches!(
            driver.train(&mut classifier, "dryer", &[tone(0.5, 0.1)], None),
            Err(PipelineError::NotFound(_))
        ));
        assert!(matches!(
            driver.train(&mut classifier, "kettle", &[], None),
            Err(PipelineError::Validation(_))
        ));
        let light = SensorSample::new(0, Modality::Light, vec![100.0]);
        assert!(matches!(
            driver.train(&mut classifier, "kettle", &[light], None),
            Err(PipelineError::Validation(_))
        ));
        assert!(classifier.reference("kettle").is_none());
        assert!(!driver.is_training());
    }

    #[test]
    fn test_training_is_single_flight() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();

        let guard = driver.try_begin().unwrap();
        assert!(matches!(
            driver.train(&mut classifier, "kettle", &[tone(0.5, 0.1)], None),
            Err(PipelineError::Busy)
        ));
        assert!(classifier.reference("kettle").is_none());
        drop(guard);

        assert!(driver
            .train(&mut classifier, "kettle", &[tone(0.5, 0.1)], None)
            .is_ok());
    }

    #[test]
    fn test_validation_accuracy() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();
        let positive = tone(0.5, 0.1);
        let validation = vec![positive.clone(), positive.clone()];

        let result = driver
            .train(&mut classifier, "kettle", &[positive], Some(&validation))
            .unwrap();
        assert_eq!(result.accuracy, 1.0);
    }

    #[test]
    fn test_evaluate_without_negatives_reports_recall_as_precision() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();
        let positive = tone(0.5, 0.1);
        driver
            .train(&mut classifier, "kettle", &[positive.clone()], None)
            .unwrap();

        let metrics = driver
            .evaluate(&classifier, "kettle", &[positive.clone(), positive], &[])
            .unwrap();
        assert_eq!(metrics.true_positives, 2);
        assert_eq!(metrics.recall, 1.0);
        assert_eq!(metrics.precision, metrics.recall);
        assert_eq!(metrics.f1_score, 1.0);
        assert_eq!(metrics.accuracy, 1.0);
    }

    #[test]
    fn test_evaluate_untrained_pattern() {
        let driver = TrainingDriver::default();
        let classifier = classifier();
        let light = SensorSample::new(0, Modality::Light, vec![200.0, 220.0]);
        let metrics = driver
            .evaluate(&classifier, "plant_light", &[light.clone()], &[light])
            .unwrap();
        assert_eq!(metrics.true_positives, 0);
        assert_eq!(metrics.false_negatives, 1);
        assert_eq!(metrics.true_negatives, 1);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
        assert_eq!(metrics.accuracy, 0.5);
    }

    #[test]
    fn test_optimize_ties_pick_lowest_threshold() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();
        let positive = tone(0.5, 0.1);

        let best = driver
            .optimize_threshold(
                &mut classifier,
                "kettle",
                &[positive.clone()],
                &[positive],
            )
            .unwrap();
        assert_eq!(best.best_threshold, 0.5);
        assert_eq!(best.best_accuracy, 1.0);
        assert_eq!(classifier.pattern("kettle").unwrap().threshold, 0.5);
        assert!(!driver.is_training());
    }

    #[test]
    fn test_optimize_unknown_pattern() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();
        assert!(matches!(
            driver.optimize_threshold(&mut classifier, "dryer", &[], &[]),
            Err(PipelineError::NotFound(_))
        ));
    }

    fn kettle_with_capture() -> PatternClassifier {
        let mut classifier = PatternClassifier::default();
        classifier
            .register(
                PatternDefinition::new("kettle", Modality::Audio, 0.7)
                    .with_audio_capture(10, 44_100),
            )
            .unwrap();
        classifier
    }

    fn empty_audio() -> SensorSample {
        SensorSample::new(0, Modality::Audio, vec![])
    }

    #[test]
    fn test_failed_validation_keeps_previous_reference() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();
        driver
            .train(&mut classifier, "kettle", &[tone(0.5, 0.1)], None)
            .unwrap();
        let before = classifier.reference("kettle").cloned();
        classifier.score(&tone(0.2, 0.3)).unwrap();
        let state = classifier.filters().state("kettle", 0).copied();

        let validation = vec![tone(0.5, 0.1), empty_audio()];
        assert!(matches!(
            driver.train(&mut classifier, "kettle", &[tone(0.9, 0.7)], Some(&validation)),
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(classifier.reference("kettle").cloned(), before);
        assert_eq!(classifier.filters().state("kettle", 0).copied(), state);
        assert!(!driver.is_training());
    }

    #[test]
    fn test_failed_evaluation_leaves_state_untouched() {
        let driver = TrainingDriver::default();
        let mut classifier = kettle_with_capture();
        let positive = tone(0.5, 0.1);
        driver
            .train(&mut classifier, "kettle", &[positive.clone()], None)
            .unwrap();

        assert!(matches!(
            driver.evaluate(&classifier, "kettle", &[positive.clone(), empty_audio()], &[]),
            Err(PipelineError::Validation(_))
        ));
        assert!(classifier.filters().state("kettle", 0).is_none());
        assert_eq!(classifier.buffered_samples("kettle"), 0);
    }

    #[test]
    fn test_evaluation_does_not_capture_audio() {
        let driver = TrainingDriver::default();
        let mut classifier = kettle_with_capture();
        let positive = tone(0.5, 0.1);
        driver
            .train(&mut classifier, "kettle", &[positive.clone()], Some(&[positive.clone()]))
            .unwrap();

        let metrics = driver
            .evaluate(&classifier, "kettle", &[positive.clone(), positive], &[])
            .unwrap();
        assert_eq!(metrics.true_positives, 2);
        assert_eq!(classifier.buffered_samples("kettle"), 0);
        assert!(classifier.filters().state("kettle", 0).is_none());
    }

    #[test]
    fn test_invalid_candidate_leaves_pattern_unchanged() {
        let driver = TrainingDriver::new(vec![0.5, 1.5]);
        let mut classifier = classifier();
        let positive = tone(0.5, 0.1);

        assert!(matches!(
            driver.optimize_threshold(&mut classifier, "kettle", &[positive.clone()], &[positive]),
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(classifier.pattern("kettle").unwrap().threshold, 0.7);
        assert!(classifier.reference("kettle").is_none());
        assert!(!driver.is_training());
    }

    #[test]
    fn test_failed_sweep_keeps_threshold_and_reference() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();
        driver
            .train(&mut classifier, "kettle", &[tone(0.5, 0.1)], None)
            .unwrap();
        let before = classifier.reference("kettle").cloned();

        assert!(matches!(
            driver.optimize_threshold(
                &mut classifier,
                "kettle",
                &[tone(0.9, 0.7)],
                &[tone(0.9, 0.7), empty_audio()],
            ),
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(classifier.pattern("kettle").unwrap().threshold, 0.7);
        assert_eq!(classifier.reference("kettle").cloned(), before);
    }

    #[test]
    fn test_guard_runs_training_in_its_slot() {
        let driver = TrainingDriver::default();
        let mut classifier = classifier();

        let guard = driver.try_begin().unwrap();
        assert!(driver.is_training());
        let result = guard
            .train(&mut classifier, "kettle", &[tone(0.5, 0.1)], None)
            .unwrap();
        assert!(driver.is_training());
        drop(guard);

        assert!(!driver.is_training());
        assert_eq!(
            classifier.reference("kettle").unwrap().as_slice(),
            result.features.as_slice()
        );
    }
}
