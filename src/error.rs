//! Error taxonomy for the analysis pipeline.
//!
//! Every stage maps its failures onto one variant, so callers can log a
//! stable stage label without inspecting message text.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Filesystem trouble in a workspace or the response root.
    #[error("storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// An operation was invoked out of order.
    #[error("invalid request state: {0}")]
    State(String),

    #[error("required file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The artifact rewrite before execution failed.
    #[error("preprocess error: {0}")]
    Preprocess(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("repair exhausted after {attempts} attempts: {detail}")]
    RepairExhausted { attempts: u32, detail: String },

    /// Malformed input data or an unusable service response.
    #[error("data format error: {0}")]
    DataFormat(String),

    #[error("report error: {0}")]
    Report(String),

    /// The code-generation service produced nothing usable.
    #[error("generation error: {0}")]
    Generation(String),
}

impl PipelineError {
    pub fn storage(context: impl Into<String>) -> Self {
        Self::Storage { context: context.into(), source: None }
    }

    pub fn storage_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage { context: context.into(), source: Some(source) }
    }

    /// Stable stage label for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Storage { .. } => "storage",
            Self::State(_) => "state",
            Self::NotFound(_) => "storage",
            Self::Preprocess(_) => "preprocess",
            Self::Execution(_) => "execution",
            Self::RepairExhausted { .. } => "repair",
            Self::DataFormat(_) => "annotation",
            Self::Report(_) => "report",
            Self::Generation(_) => "generation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_are_stable() {
        assert_eq!(PipelineError::storage("x").stage(), "storage");
        assert_eq!(
            PipelineError::RepairExhausted { attempts: 3, detail: "y".into() }.stage(),
            "repair"
        );
        assert_eq!(PipelineError::Report("z".into()).stage(), "report");
    }

    #[test]
    fn messages_carry_context() {
        let e = PipelineError::NotFound(PathBuf::from("/tmp/a.py"));
        assert!(e.to_string().contains("/tmp/a.py"));
        let e = PipelineError::RepairExhausted { attempts: 3, detail: "still broken".into() };
        assert!(e.to_string().contains("3 attempts"));
    }
}
