use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::Json;
use axum_typed_multipart::TypedMultipart;
use facedesk_core::{EuclideanMatcher, Label, MatchResult, Matcher, WireEntry};

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::engine::ImageSource;

const INDEX_PAGE: &str = "index.html";
const REGISTER_PAGE: &str = "register.html";
const RECOGNITION_PAGE: &str = "real_time_face_recognition.html";

/// Relay an SMS through the messaging provider
pub async fn send_sms_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SmsRequest>,
) -> Result<&'static str> {
    state
        .sms
        .send(&req.to, &req.message)
        .await
        .map_err(AppError::Sms)?;
    Ok("SMS sent successfully")
}

/// Store one photo under `?label=`
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    TypedMultipart(form): TypedMultipart<ImageForm>,
) -> Result<&'static str> {
    let label = Label::parse(params.label.as_deref().unwrap_or_default())
        .map_err(AppError::InvalidLabel)?;

    tracing::info!(
        label = %label,
        file_name = ?form.image.metadata.file_name,
        content_type = ?form.image.metadata.content_type,
        bytes = form.image.contents.len(),
        "upload received"
    );

    state.store.save(&label, &form.image.contents).await?;

    if state.refresh_on_upload {
        state.registry.invalidate().await;
    }
    Ok("Image uploaded")
}

pub async fn index_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    serve_page(&state, INDEX_PAGE).await
}

pub async fn register_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    serve_page(&state, REGISTER_PAGE).await
}

/// Make sure the registry is loaded, then serve the live recognition page.
///
/// A failed build is logged by the registry service; the page is served
/// regardless and will see an empty registry.
pub async fn recognition_page_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    if let Ok(registry) = state.registry.get_or_build().await {
        tracing::info!(labels = registry.len(), "labeled face descriptors loaded");
    }
    serve_page(&state, RECOGNITION_PAGE).await
}

/// Current registry as `[{label, descriptors}]`; never triggers a build
pub async fn labeled_faces_handler(State(state): State<Arc<AppState>>) -> Json<Vec<WireEntry>> {
    tracing::info!("sending labeled face descriptors to client");
    Json(state.registry.to_wire_format().await)
}

/// Rebuild the registry from the image store now
pub async fn rebuild_handler(State(state): State<Arc<AppState>>) -> Result<Json<RebuildResponse>> {
    let registry = state.registry.rebuild().await?;
    Ok(Json(RebuildResponse {
        labels: registry.len(),
        descriptors: registry.descriptor_count(),
    }))
}

/// Match an uploaded photo against the registry
pub async fn recognize_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(form): TypedMultipart<ImageForm>,
) -> Result<Json<MatchResult>> {
    let found = state
        .engine
        .extract(ImageSource::Bytes(form.image.contents.to_vec()))
        .await
        .map_err(|e| {
            if e.is_per_image() {
                AppError::InvalidImage(e)
            } else {
                AppError::Internal(e.into())
            }
        })?
        .ok_or(AppError::NoFace)?;

    let registry = state.registry.get_or_build().await?;
    let result = EuclideanMatcher.compare(&found.embedding, registry.entries(), state.match_threshold);
    tracing::info!(
        label = %result.label,
        distance = ?result.distance,
        matched = result.matched,
        "recognition"
    );
    Ok(Json(result))
}

/// Daemon status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        models_loaded: state.engine.is_available(),
        engine_workers: state.engine.workers(),
        sms_configured: state.sms.is_configured(),
        labels: state.registry.snapshot().await.len(),
        cached: state.registry.is_cached().await,
    })
}

async fn serve_page(state: &AppState, page: &str) -> Result<Html<String>> {
    let path = state.static_dir.join(page);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Ok(Html(html)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::PageNotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
