//! Sample collection for the Mundane Sensor Agent.
//!
//! Device acquisition happens outside this crate. This module defines the
//! sample types, the single-consumer queue that serializes acquisition into
//! the pipeline, and a JSON Lines replay source.

pub mod queue;
pub mod replay;
pub mod types;

// Re-export commonly used types
pub use queue::{collect_for, CollectorError, SampleQueue, SampleSender, DEFAULT_CAPACITY};
pub use replay::{parse_samples, read_samples, spawn_replay, write_samples};
pub use types::{Modality, SensorSample};
