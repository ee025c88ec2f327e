use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::{Deserialize, Serialize};

/// `POST /send-sms` body
#[derive(Debug, Deserialize)]
pub struct SmsRequest {
    pub to: String,
    pub message: String,
}

/// `POST /upload` query string
#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub label: Option<String>,
}

/// Multipart form carrying one photo in the `image` field
#[derive(TryFromMultipart)]
pub struct ImageForm {
    pub image: FieldData<Bytes>,
}

/// `POST /rebuild` response
#[derive(Debug, Serialize, Deserialize)]
pub struct RebuildResponse {
    pub labels: usize,
    pub descriptors: usize,
}

/// `GET /status` response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub models_loaded: bool,
    pub engine_workers: usize,
    pub sms_configured: bool,
    /// Labels in the cached registry
    pub labels: usize,
    pub cached: bool,
}
