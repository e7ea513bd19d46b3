//! Transparency module for the Mundane Sensor Agent.
//!
//! Counts what the agent ingests and produces so users can audit it.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
