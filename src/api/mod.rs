//! HTTP surface of the relay.

pub mod auth;
pub mod error;
pub mod extract;
mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::Authenticator;
use crate::jobs::GenerationService;

/// Path prefix for every route.
pub const API_PREFIX: &str = "/runway-gen3";

/// Slack on top of the upload limit for the other multipart fields.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GenerationService>,
    pub auth: Arc<dyn Authenticator>,
    /// Client used to re-stream generated videos.
    pub http: reqwest::Client,
    pub max_upload_bytes: usize,
}

/// Build the relay router.
pub fn relay_routes(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    let api = Router::new()
        .route("/health", get(routes::health))
        .route("/models", get(routes::models))
        .route("/estimate-cost", post(routes::estimate))
        .route("/generate-text-to-video", post(routes::generate_text_to_video))
        .route("/generate-image-to-video", post(routes::generate_image_to_video))
        .route("/task-status/{job_id}", get(routes::task_status))
        .route("/tasks", get(routes::list_tasks))
        .route("/video/{job_id}", get(routes::stream_video))
        .route("/task/{job_id}", delete(routes::cancel_task))
        .route("/cleanup", post(routes::cleanup))
        .route("/public/{file_name}", get(routes::public_file));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
