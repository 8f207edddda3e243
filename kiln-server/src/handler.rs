use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use kiln_core::{GenerationDefaults, JobHandle, ParameterSet};
use serde::Serialize;
use tracing::debug;

use crate::error::ServerError;

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub status: &'static str,
    pub image_path: String,
}

/// Turns request bodies into generation jobs.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    defaults: GenerationDefaults,
    jobs: JobHandle,
}

impl RequestHandler {
    pub fn new(defaults: GenerationDefaults, jobs: JobHandle) -> Self {
        Self { defaults, jobs }
    }

    /// Validate `body`, run the job and return the written image path.
    pub async fn handle(&self, body: &[u8]) -> Result<PathBuf, ServerError> {
        let params = ParameterSet::from_json(body, &self.defaults)?;
        debug!(
            prompt = %params.prompt,
            model = %params.model_path.display(),
            "accepted generation request"
        );
        Ok(self.jobs.submit(params).await?)
    }
}

/// `POST /generate-image`
pub async fn generate_image(
    State(handler): State<Arc<RequestHandler>>,
    body: Bytes,
) -> Result<Json<GenerationResponse>, ServerError> {
    let path = handler.handle(&body).await?;
    Ok(Json(GenerationResponse {
        status: "success",
        image_path: path.display().to_string(),
    }))
}
