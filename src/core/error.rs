//! Errors surfaced by the inference pipeline.
//!
//! Rejected calls never mutate filter state or audio buffers.

/// Pipeline errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Malformed or empty sample, or an invalid definition/argument
    Validation(String),
    /// A training run is already in progress
    Busy,
    /// The named pattern was never registered
    NotFound(String),
    /// Audio encoding failed
    Resource(String),
}

impl PipelineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        PipelineError::Validation(msg.into())
    }

    pub(crate) fn not_found(pattern: &str) -> Self {
        PipelineError::NotFound(pattern.to_string())
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Validation(e) => write!(f, "Validation error: {e}"),
            PipelineError::Busy => write!(f, "Training already in progress"),
            PipelineError::NotFound(p) => write!(f, "Pattern not found: {p}"),
            PipelineError::Resource(e) => write!(f, "Resource error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<hound::Error> for PipelineError {
    fn from(e: hound::Error) -> Self {
        PipelineError::Resource(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PipelineError::Busy.to_string(),
            "Training already in progress"
        );
        assert_eq!(
            PipelineError::not_found("kettle").to_string(),
            "Pattern not found: kettle"
        );
    }
}
