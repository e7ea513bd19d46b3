//! Mundane Sensor Agent - household pattern recognition from sensor streams.
//!
//! This library turns raw samples from audio, motion and light sensors into
//! per-pattern confidence scores ("is the kettle boiling?"), keeps a bounded
//! audio history for patterns that ask for it, and trains pattern references
//! from labeled examples.
//!
//! # Local-only Processing
//!
//! - **No network**: Samples, models and exports never leave the machine
//! - **Bounded audio**: Each pattern retains at most its configured window
//! - **Transparency**: Every processed sample is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Mundane Sensor Agent                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ SampleQueue │──▶│  Features   │──▶│   Filters   │       │
//! │  │  (bounded)  │   │ (per type)  │   │  (Kalman)   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                                    │              │
//! │         ▼                                    ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │Transparency │   │Audio Buffers│◀──│ Classifier  │       │
//! │  │    Log      │   │   (WAV)     │   │ (confidence)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mundane_sensor_agent::{Config, Modality, SensorSample};
//!
//! let config = Config::default();
//! let mut classifier = config.build_classifier().expect("valid patterns");
//!
//! let sample = SensorSample::now(Modality::Audio, vec![0.1, -0.2, 0.3]);
//! let confidences = classifier.score(&sample).expect("valid sample");
//! for (pattern, confidence) in &confidences {
//!     println!("{pattern}: {confidence:.2}");
//! }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod store;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use collector::{CollectorError, Modality, SampleQueue, SampleSender, SensorSample};
pub use config::{Config, ConfigError, SourceConfig};
pub use core::{
    ConfidenceMap, DetectionSnapshot, FeatureExtractor, FeatureVector, FilterBank,
    PatternClassifier, PatternDefinition, PipelineError, SnapshotBuilder, TrainingDriver,
    TrainingResult,
};
pub use store::{ModelStore, StoreError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data handling declaration that can be displayed to users.
pub const DATA_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║            MUNDANE SENSOR AGENT - DATA DECLARATION               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent recognises everyday household patterns locally.      ║
║                                                                  ║
║  ✓ WHAT WE PROCESS:                                              ║
║    • Audio levels and dominant frequency                         ║
║    • Motion magnitude from accelerometer and gyroscope           ║
║    • Ambient light intensity                                     ║
║                                                                  ║
║  ✓ WHAT WE KEEP:                                                 ║
║    • A bounded audio window for patterns that request it         ║
║    • Trained pattern references and collection counters          ║
║                                                                  ║
║  ✗ WHAT WE NEVER DO:                                             ║
║    • Send samples or recordings over the network                 ║
║    • Keep audio beyond a pattern's configured duration           ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    mundane-sensor status                                         ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_declaration_contents() {
        assert!(DATA_DECLARATION.contains("DATA DECLARATION"));
        assert!(DATA_DECLARATION.contains("NEVER DO"));
        assert!(DATA_DECLARATION.contains("bounded audio window"));
    }
}
