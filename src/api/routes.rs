//! Route handlers.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;
use uuid::Uuid;

use super::AppState;
use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::ValidationError;
use crate::jobs::pricing::{MAX_DURATION_SECS, SUPPORTED_RATIOS};
use crate::jobs::request::validate_duration;
use crate::jobs::{
    CostEstimate, CreatedJob, DEFAULT_LIST_LIMIT, GenerationRequest, JobList, JobStatus, ModelTier,
    StatusSnapshot, estimate_cost, list_models,
};

const DEFAULT_CLEANUP_HOURS: u64 = 24;

// ── Catalogue ───────────────────────────────────────────────────────────

pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    let pricing: Map<String, Value> = ModelTier::ALL
        .iter()
        .map(|tier| {
            (
                tier.id().to_string(),
                json!({ "cost_per_second": tier.cost_per_second(), "quality": tier.quality() }),
            )
        })
        .collect();

    Json(json!({
        "service": "Runway Gen-3 Alpha Turbo",
        "status": "healthy",
        "models_available": ModelTier::ALL.iter().map(|t| t.id()).collect::<Vec<_>>(),
        "features": [
            "Text-to-video generation",
            "Image-to-video generation",
            "5-10 second videos",
            "Multiple aspect ratios",
            "Seed support for reproducibility",
        ],
        "pricing": pricing,
        "active_tasks": state.service.active_count().await,
        "max_duration": MAX_DURATION_SECS,
        "supported_ratios": SUPPORTED_RATIOS,
        "timestamp": Utc::now(),
    }))
}

pub(super) async fn models() -> Json<Value> {
    Json(json!({ "models": list_models() }))
}

#[derive(Debug, Deserialize)]
pub(super) struct EstimateRequest {
    duration: u32,
    #[serde(default)]
    model: Option<String>,
}

pub(super) async fn estimate(
    ApiJson(req): ApiJson<EstimateRequest>,
) -> ApiResult<Json<CostEstimate>> {
    validate_duration(req.duration)?;
    let model = req.model.as_deref().unwrap_or(ModelTier::DEFAULT.id());
    Ok(Json(estimate_cost(req.duration, model)))
}

// ── Generation ──────────────────────────────────────────────────────────

pub(super) async fn generate_text_to_video(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiJson(request): ApiJson<GenerationRequest>,
) -> ApiResult<Json<CreatedJob>> {
    let created = state.service.create_job(&principal, request, None).await?;
    info!(job_id = %created.job_id, owner = %principal.principal_id, "Created text-to-video task");
    Ok(Json(created))
}

/// Fields of the image-to-video form.
#[derive(Default)]
struct UploadForm {
    prompt_text: Option<String>,
    image: Option<UploadedImage>,
    duration: Option<u32>,
    ratio: Option<String>,
    seed: Option<u32>,
    model: Option<String>,
}

struct UploadedImage {
    extension: String,
    bytes: Vec<u8>,
}

pub(super) async fn generate_image_to_video(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<CreatedJob>> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image_file" => form.image = Some(read_image(field, state.max_upload_bytes).await?),
            "prompt_text" => form.prompt_text = Some(field.text().await.map_err(bad_multipart)?),
            "duration" => form.duration = parse_field("duration", field).await?,
            "ratio" => form.ratio = parse_field("ratio", field).await?,
            "seed" => form.seed = parse_field("seed", field).await?,
            "model" => form.model = parse_field("model", field).await?,
            _ => {}
        }
    }

    let image = form
        .image
        .ok_or_else(|| ValidationError::MissingField("image_file".into()))?;
    let prompt_text = form
        .prompt_text
        .ok_or_else(|| ValidationError::MissingField("prompt_text".into()))?;

    let mut request = GenerationRequest::text(prompt_text);
    if let Some(duration) = form.duration {
        request.duration = duration;
    }
    if let Some(ratio) = form.ratio {
        request.ratio = ratio;
    }
    if let Some(model) = form.model {
        request.model = model;
    }
    request.seed = form.seed;

    let staged = state
        .service
        .storage()
        .stage(&principal.principal_id, &image.extension, &image.bytes)
        .await?;
    let created = state
        .service
        .create_job(&principal, request, Some(staged))
        .await?;

    info!(job_id = %created.job_id, owner = %principal.principal_id, "Created image-to-video task");
    Ok(Json(created))
}

async fn read_image(mut field: Field<'_>, max_bytes: usize) -> ApiResult<UploadedImage> {
    let is_image = field
        .content_type()
        .is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
        return Err(ValidationError::NotAnImage.into());
    }
    let extension = field
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .unwrap_or("jpg")
        .to_string();

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(ValidationError::FileTooLarge { max_bytes }.into());
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(UploadedImage { extension, bytes })
}

/// Parse a text field; blank values count as absent.
async fn parse_field<T>(name: &str, field: Field<'_>) -> ApiResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = field.text().await.map_err(bad_multipart)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse().map(Some).map_err(|e: T::Err| {
        ValidationError::InvalidField {
            field: name.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn bad_multipart(e: MultipartError) -> ApiError {
    ApiError::BadRequest(e.body_text())
}

// ── Tasks ───────────────────────────────────────────────────────────────

pub(super) async fn task_status(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> ApiResult<Json<StatusSnapshot>> {
    Ok(Json(state.service.get_status(&principal, job_id).await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct TasksQuery {
    status: Option<String>,
    limit: Option<usize>,
}

pub(super) async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiQuery(query): ApiQuery<TasksQuery>,
) -> ApiResult<Json<JobList>> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(
            s.parse::<JobStatus>()
                .map_err(|_| ValidationError::StatusFilter(s.to_string()))?,
        ),
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(state.service.list_jobs(&principal, status, limit).await))
}

pub(super) async fn stream_video(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    let location = state.service.result_location(&principal, job_id).await?;

    let upstream = state
        .http
        .get(&location)
        .send()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    if !upstream.status().is_success() {
        return Err(ApiError::Upstream(format!(
            "video host returned {}",
            upstream.status()
        )));
    }

    let headers = [
        (header::CONTENT_TYPE, "video/mp4".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=runway_video_{job_id}.mp4"),
        ),
        (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
    ];
    Ok((headers, Body::from_stream(upstream.bytes_stream())).into_response())
}

pub(super) async fn cancel_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> ApiResult<Json<Value>> {
    state.service.cancel(&principal, job_id).await?;
    Ok(Json(json!({ "message": "Task cancelled successfully" })))
}

#[derive(Debug, Deserialize)]
pub(super) struct CleanupQuery {
    hours_old: Option<u64>,
}

pub(super) async fn cleanup(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiQuery(query): ApiQuery<CleanupQuery>,
) -> Json<Value> {
    let hours = query.hours_old.unwrap_or(DEFAULT_CLEANUP_HOURS);
    let max_age = Duration::from_secs(hours.saturating_mul(3600));
    let cleaned_count = state.service.sweep(max_age).await;

    info!(requested_by = %principal.principal_id, hours, cleaned_count, "Manual cleanup");
    Json(json!({
        "message": format!("Cleaned up {cleaned_count} old tasks"),
        "cleaned_count": cleaned_count,
    }))
}

// ── Published inputs ────────────────────────────────────────────────────

pub(super) async fn public_file(
    State(state): State<AppState>,
    ApiPath(file_name): ApiPath<String>,
) -> ApiResult<Response> {
    let file = state.service.storage().open_published(&file_name).await?;
    let headers = [
        (header::CONTENT_TYPE, file.content_type),
        (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
    ];
    Ok((headers, file.bytes).into_response())
}
