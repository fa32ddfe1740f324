use crate::{engine::EngineError, intake::IntakeError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Failure of a request at the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("the model produced an empty answer")]
    EmptyAnswer,
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Intake(IntakeError::Multipart(e)) => e.status(),
            ApiError::Intake(IntakeError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Intake(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Inference(_)) | ApiError::EmptyAnswer => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Engine(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code sent next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Intake(IntakeError::MissingImage) => "missing_image",
            ApiError::Intake(IntakeError::UnsupportedFormat) => "unsupported_image",
            ApiError::Intake(IntakeError::Decode(_)) => "invalid_image",
            ApiError::Intake(IntakeError::Multipart(_)) => "invalid_form",
            ApiError::Intake(IntakeError::Storage(_)) => "storage_error",
            ApiError::Engine(EngineError::Inference(_)) | ApiError::EmptyAnswer => {
                "inference_error"
            }
            ApiError::Engine(_) => "engine_unavailable",
            ApiError::Task(_) => "internal_error",
        }
    }

    /// Text sent to the client. Server-side failures get a fixed message so
    /// model and filesystem details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Intake(IntakeError::Storage(_)) => "failed to store the upload".to_string(),
            ApiError::Engine(EngineError::Inference(_)) | ApiError::EmptyAnswer => {
                "the model failed to answer the question".to_string()
            }
            ApiError::Task(_) => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            log::warn!("Rejected request: {}", self);
        } else {
            log::error!("Request failed: {}", self);
        }

        (
            status,
            Json(json!({ "error": self.public_message(), "code": self.code() })),
        )
            .into_response()
    }
}
