//! Translation of job failures into HTTP responses.
//!
//! Every failure becomes `{"status":"error","message":...}`. The status code
//! depends only on the error kind: validation 400, engine 500, write 500.
//! Engine and write details are logged, not returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kiln_core::{EngineError, JobError, ValidationError, WriteError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl From<JobError> for ServerError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(e) => Self::Validation(e),
            JobError::Engine(e) => Self::Engine(e),
            JobError::Write(e) => Self::Write(e),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Engine(_) | Self::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Validation(e) => e.message().to_owned(),
            Self::Engine(EngineError::ContextInit(_)) => "context init failed".to_owned(),
            Self::Engine(EngineError::GenerationFailed | EngineError::Backend(_)) => {
                "generation failed".to_owned()
            }
            Self::Engine(e) => e.to_string(),
            Self::Write(_) => "failed to write image".to_owned(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            Self::Validation(e) => warn!(reason = %e, "rejected generation request"),
            Self::Engine(e) => error!(error = %e, "generation engine error"),
            Self::Write(e) => error!(error = %e, "failed to persist generated image"),
        }
        let body = ErrorBody {
            status: "error",
            message: self.client_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_kind_always_maps_to_same_status() {
        let validation = [
            ValidationError::prompt_required(),
            ValidationError::invalid_field("width"),
            ValidationError::new("request body must be a JSON object"),
        ];
        for e in validation {
            assert_eq!(ServerError::from(e).status_code(), StatusCode::BAD_REQUEST);
        }

        let engine = [
            EngineError::context_init("boom"),
            EngineError::GenerationFailed,
            EngineError::backend("nan in latents"),
            EngineError::Timeout,
            EngineError::WorkerUnavailable,
        ];
        for e in engine {
            assert_eq!(
                ServerError::from(e).status_code(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }

        let write = WriteError::InvalidArtifact("short".into());
        assert_eq!(
            ServerError::from(JobError::from(write)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn engine_details_stay_out_of_client_messages() {
        let err = ServerError::from(EngineError::context_init("/secret/models/x not found"));
        assert_eq!(err.client_message(), "context init failed");
        assert_eq!(
            ServerError::from(EngineError::backend("cuda oom")).client_message(),
            "generation failed"
        );
        assert_eq!(ServerError::from(EngineError::Timeout).client_message(), "timeout");
    }
}
