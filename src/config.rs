//! Configuration for the Mundane Sensor Agent.

use crate::collector::types::Modality;
use crate::core::features::{FeatureExtractor, DEFAULT_AUDIO_SAMPLE_RATE};
use crate::core::filter::{FilterBank, DEFAULT_MEASUREMENT_NOISE, DEFAULT_PROCESS_NOISE};
use crate::core::pattern::PatternDefinition;
use crate::core::training::{TrainingDriver, DEFAULT_THRESHOLD_CANDIDATES};
use crate::core::{PatternClassifier, PipelineError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the sensor agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which sensor modalities to ingest
    pub sources: SourceConfig,

    /// Acquisition rates per sensor
    pub sensors: SensorSettings,

    /// Smoothing and training constants
    pub ml: MlConfig,

    /// Patterns the classifier recognises
    pub patterns: Vec<PatternDefinition>,

    /// Path for exported audio and snapshots
    pub export_path: PathBuf,

    /// Path for trained models and transparency logs
    pub data_path: PathBuf,

    /// Whether ingestion is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mundane-sensor-agent");

        Self {
            sources: SourceConfig::default(),
            sensors: SensorSettings::default(),
            ml: MlConfig::default(),
            patterns: default_patterns(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mundane-sensor-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Check pattern definitions and tuning constants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for pattern in &self.patterns {
            pattern
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !seen.insert(pattern.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate pattern '{}'",
                    pattern.name
                )));
            }
        }
        if self.ml.measurement_noise <= 0.0 || self.ml.process_noise < 0.0 {
            return Err(ConfigError::Invalid(
                "filter noise constants must be positive".to_string(),
            ));
        }
        if let Some(bad) = self
            .ml
            .threshold_candidates
            .iter()
            .find(|t| !(0.0..=1.0).contains(*t))
        {
            return Err(ConfigError::Invalid(format!(
                "threshold candidate {bad} outside [0, 1]"
            )));
        }
        if self.sensors.audio_sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "audio sample rate must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a classifier with every configured pattern registered.
    pub fn build_classifier(&self) -> Result<PatternClassifier, PipelineError> {
        PatternClassifier::with_patterns(
            FeatureExtractor::new(self.sensors.audio_sample_rate),
            FilterBank::new(self.ml.measurement_noise, self.ml.process_noise),
            self.patterns.iter().cloned(),
        )
    }

    /// Build a training driver using the configured threshold sweep.
    pub fn build_training_driver(&self) -> TrainingDriver {
        TrainingDriver::new(self.ml.threshold_candidates.clone())
    }

    /// Record a tuned threshold in the pattern list.
    pub fn set_threshold(&mut self, pattern: &str, threshold: f64) -> bool {
        match self.patterns.iter_mut().find(|p| p.name == pattern) {
            Some(p) => {
                p.threshold = threshold;
                true
            }
            None => false,
        }
    }

    /// Directory holding trained models.
    pub fn models_path(&self) -> PathBuf {
        self.data_path.join("models")
    }
}

/// Configuration for which sensor modalities to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub audio: bool,
    pub accelerometer: bool,
    pub gyroscope: bool,
    pub light: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            audio: true,
            accelerometer: true,
            gyroscope: true,
            light: true,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let has = |name: &str| sources.iter().any(|s| s == name || s == "all");

        Self {
            audio: has("audio"),
            accelerometer: has("accelerometer"),
            gyroscope: has("gyroscope"),
            light: has("light"),
        }
    }

    /// Check if at least one source is enabled.
    pub fn any_enabled(&self) -> bool {
        self.audio || self.accelerometer || self.gyroscope || self.light
    }

    /// Check if samples of a modality should be ingested.
    pub fn accepts(&self, modality: Modality) -> bool {
        match modality {
            Modality::Audio => self.audio,
            Modality::Accelerometer => self.accelerometer,
            Modality::Gyroscope => self.gyroscope,
            Modality::Light => self.light,
            // Unscorable samples still pass through and yield empty maps.
            Modality::Camera | Modality::Unknown => true,
        }
    }
}

/// Acquisition rates per sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSettings {
    /// Audio sample rate (Hz), used for the zero-crossing frequency estimate
    pub audio_sample_rate: u32,
    /// Accelerometer polling rate (Hz)
    pub accelerometer_hz: u32,
    /// Gyroscope polling rate (Hz)
    pub gyroscope_hz: u32,
    /// Light sensor polling rate (Hz)
    pub light_hz: u32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            audio_sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            accelerometer_hz: 60,
            gyroscope_hz: 60,
            light_hz: 1,
        }
    }
}

/// Smoothing filter and training constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlConfig {
    /// Measurement noise (R)
    pub measurement_noise: f64,
    /// Process noise (Q)
    pub process_noise: f64,
    /// Thresholds swept during optimization
    pub threshold_candidates: Vec<f64>,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            measurement_noise: DEFAULT_MEASUREMENT_NOISE,
            process_noise: DEFAULT_PROCESS_NOISE,
            threshold_candidates: DEFAULT_THRESHOLD_CANDIDATES.to_vec(),
        }
    }
}

/// The household patterns shipped by default.
pub fn default_patterns() -> Vec<PatternDefinition> {
    const RATE: u32 = 44_100;
    vec![
        PatternDefinition::new("dishwasher", Modality::Audio, 0.8)
            .with_features(&["frequency", "amplitude", "duration"])
            .with_audio_capture(300, RATE),
        PatternDefinition::new("kettle", Modality::Audio, 0.7)
            .with_features(&["frequency", "amplitude"])
            .with_audio_capture(180, RATE),
        PatternDefinition::new("plant_light", Modality::Light, 0.6)
            .with_features(&["intensity", "duration"]),
        PatternDefinition::new("washer", Modality::Accelerometer, 0.75)
            .with_features(&["vibration", "frequency", "duration"]),
        PatternDefinition::new("dryer", Modality::Accelerometer, 0.75)
            .with_features(&["vibration", "frequency", "duration"]),
        PatternDefinition::new("walking", Modality::Accelerometer, 0.65)
            .with_features(&["step_frequency", "amplitude", "pattern"])
            .with_audio_capture(60, RATE),
        PatternDefinition::new("dog_barking", Modality::Audio, 0.7)
            .with_features(&["frequency", "amplitude", "duration", "pattern"])
            .with_audio_capture(30, RATE),
        PatternDefinition::new("cat_meowing", Modality::Audio, 0.7)
            .with_features(&["frequency", "amplitude", "duration", "pattern"])
            .with_audio_capture(30, RATE),
        PatternDefinition::new("animal_noise", Modality::Audio, 0.6)
            .with_features(&["frequency", "amplitude", "duration", "pattern"])
            .with_audio_capture(30, RATE),
    ]
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
