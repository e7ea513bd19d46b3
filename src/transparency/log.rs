//! Collection transparency log.
//!
//! This module counts what the agent processes and produces, without
//! storing any sample content.

use crate::collector::types::Modality;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Transparency statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of audio samples processed
    audio_samples: AtomicU64,
    /// Number of accelerometer and gyroscope samples processed
    motion_samples: AtomicU64,
    /// Number of light samples processed
    light_samples: AtomicU64,
    /// Samples of modalities no pattern can score
    other_samples: AtomicU64,
    /// Samples rejected by validation
    rejected_samples: AtomicU64,
    /// Confidence scores that crossed a pattern threshold
    detections: AtomicU64,
    /// WAV files written
    audio_exports: AtomicU64,
    /// Completed training runs
    training_runs: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            audio_samples: AtomicU64::new(0),
            motion_samples: AtomicU64::new(0),
            light_samples: AtomicU64::new(0),
            other_samples: AtomicU64::new(0),
            rejected_samples: AtomicU64::new(0),
            detections: AtomicU64::new(0),
            audio_exports: AtomicU64::new(0),
            training_runs: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("could not load previous transparency stats: {e}");
        }

        log
    }

    /// Record a processed sample under its modality group.
    pub fn record_sample(&self, modality: Modality) {
        let counter = match modality {
            Modality::Audio => &self.audio_samples,
            Modality::Accelerometer | Modality::Gyroscope => &self.motion_samples,
            Modality::Light => &self.light_samples,
            Modality::Camera | Modality::Unknown => &self.other_samples,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_sample(&self) {
        self.rejected_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Record detections from one scored sample.
    pub fn record_detections(&self, count: u64) {
        self.detections.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_audio_export(&self) {
        self.audio_exports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_training_run(&self) {
        self.training_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            audio_samples: self.audio_samples.load(Ordering::Relaxed),
            motion_samples: self.motion_samples.load(Ordering::Relaxed),
            light_samples: self.light_samples.load(Ordering::Relaxed),
            other_samples: self.other_samples.load(Ordering::Relaxed),
            rejected_samples: self.rejected_samples.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            audio_exports: self.audio_exports.load(Ordering::Relaxed),
            training_runs: self.training_runs.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Audio samples processed: {}\n\
             - Motion samples processed: {}\n\
             - Light samples processed: {}\n\
             - Other samples processed: {}\n\
             - Samples rejected: {}\n\
             - Detections: {}\n\
             - Audio exports: {}\n\
             - Training runs: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Data Handling:\n\
             - All processing happens locally\n\
             - Audio is retained only within each pattern's capture window",
            stats.audio_samples,
            stats.motion_samples,
            stats.light_samples,
            stats.other_samples,
            stats.rejected_samples,
            stats.detections,
            stats.audio_exports,
            stats.training_runs,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                audio_samples: stats.audio_samples,
                motion_samples: stats.motion_samples,
                light_samples: stats.light_samples,
                other_samples: stats.other_samples,
                rejected_samples: stats.rejected_samples,
                detections: stats.detections,
                audio_exports: stats.audio_exports,
                training_runs: stats.training_runs,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.audio_samples
                    .store(persisted.audio_samples, Ordering::Relaxed);
                self.motion_samples
                    .store(persisted.motion_samples, Ordering::Relaxed);
                self.light_samples
                    .store(persisted.light_samples, Ordering::Relaxed);
                self.other_samples
                    .store(persisted.other_samples, Ordering::Relaxed);
                self.rejected_samples
                    .store(persisted.rejected_samples, Ordering::Relaxed);
                self.detections.store(persisted.detections, Ordering::Relaxed);
                self.audio_exports
                    .store(persisted.audio_exports, Ordering::Relaxed);
                self.training_runs
                    .store(persisted.training_runs, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.audio_samples,
            &self.motion_samples,
            &self.light_samples,
            &self.other_samples,
            &self.rejected_samples,
            &self.detections,
            &self.audio_exports,
            &self.training_runs,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub audio_samples: u64,
    pub motion_samples: u64,
    pub light_samples: u64,
    pub other_samples: u64,
    pub rejected_samples: u64,
    pub detections: u64,
    pub audio_exports: u64,
    pub training_runs: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl TransparencyStats {
    /// Total samples accepted into the pipeline.
    pub fn total_samples(&self) -> u64 {
        self.audio_samples + self.motion_samples + self.light_samples + self.other_samples
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct PersistedStats {
    audio_samples: u64,
    motion_samples: u64,
    light_samples: u64,
    other_samples: u64,
    rejected_samples: u64,
    detections: u64,
    audio_exports: u64,
    training_runs: u64,
    last_updated: DateTime<Utc>,
}

impl Default for PersistedStats {
    fn default() -> Self {
        Self {
            audio_samples: 0,
            motion_samples: 0,
            light_samples: 0,
            other_samples: 0,
            rejected_samples: 0,
            detections: 0,
            audio_exports: 0,
            training_runs: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
