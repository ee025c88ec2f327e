use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use facedesk_core::LabelError;

use crate::engine::EngineError;
use crate::sms::SmsError;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// API error type. Causes are logged; clients only see a short generic text.
#[derive(Debug)]
pub enum AppError {
    InvalidLabel(LabelError),
    InvalidImage(EngineError),
    NoFace,
    PageNotFound(String),
    Sms(SmsError),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, text) = match &self {
            AppError::InvalidLabel(e) => {
                tracing::warn!(error = %e, "rejected label");
                (StatusCode::BAD_REQUEST, "Invalid label")
            }
            AppError::InvalidImage(e) => {
                tracing::warn!(error = %e, "rejected image");
                (StatusCode::BAD_REQUEST, "Invalid image")
            }
            AppError::NoFace => (StatusCode::UNPROCESSABLE_ENTITY, "No face detected"),
            AppError::PageNotFound(page) => {
                tracing::error!(page = %page, "page missing from static directory");
                (StatusCode::NOT_FOUND, "Not Found")
            }
            AppError::Sms(e) => {
                tracing::error!(error = %e, "error sending SMS");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error sending SMS")
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        (status, text).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
