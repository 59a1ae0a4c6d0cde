use std::path::PathBuf;
use thiserror::Error;

/// Failures reported to callers. The `Display` text is what ends up in the
/// `error` field of a response, so it must stay stable.
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("{0}")]
    MissingDependency(String),

    #[error("{0}")]
    InvalidArguments(String),

    #[error("Missing required parameters")]
    MissingRequiredParameters,

    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown action")]
    UnknownAction,

    #[error("No audio generated")]
    EmptyOutput,

    #[error("{0}")]
    SynthesisFailure(String),

    #[error("Failed to write audio to {}: {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },
}

impl TtsError {
    /// Engine errors keep their full context chain; the caller sees the
    /// message verbatim.
    pub fn synthesis(source: anyhow::Error) -> Self {
        Self::SynthesisFailure(format!("{source:#}"))
    }

    pub fn write_failed(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            reason: format!("{source:#}"),
        }
    }
}
