use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::handler::{self, RequestHandler};

pub fn build(handler: Arc<RequestHandler>) -> Router {
    Router::new()
        .route("/generate-image", post(handler::generate_image))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

/// Returns `{"status": "ok", "version": "..."}`.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
