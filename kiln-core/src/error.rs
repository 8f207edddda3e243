use std::path::PathBuf;

use thiserror::Error;

/// The caller's input is malformed or a required field is missing.
///
/// Always recoverable at the request boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn prompt_required() -> Self {
        Self::new("prompt required")
    }

    pub fn invalid_field(name: &str) -> Self {
        Self::new(format!("invalid field: {name}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The generation engine failed to initialize or to produce an image.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("context init failed: {0}")]
    ContextInit(String),

    /// The engine returned no image (null or empty result).
    #[error("generation failed")]
    GenerationFailed,

    /// The engine signaled a failure while generating.
    #[error("generation failed: {0}")]
    Backend(String),

    #[error("timeout")]
    Timeout,

    #[error("generation worker unavailable")]
    WorkerUnavailable,
}

impl EngineError {
    pub fn context_init(err: impl std::fmt::Display) -> Self {
        Self::ContextInit(err.to_string())
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// The artifact could not be persisted.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid image artifact: {0}")]
    InvalidArtifact(String),
}

/// Any failure of a single generation job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
