use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

/// Failures of a single analysis run.
///
/// Every variant aborts the remainder of the run. The orchestrator discards all
/// partial state for that run before surfacing the error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The caller handed over something that is not a PDF (or nothing at all).
    #[error("Invalid upload: {0}")]
    UserInput(String),

    /// The bytes claimed to be a PDF but could not be parsed as one.
    #[error("Could not extract text from document: {0}")]
    Extraction(String),

    /// The model reply carried no usable structured payload.
    #[error("Malformed model reply: {0}")]
    ResponseFormat(String),

    /// The model explicitly rejected the document (e.g. "not a résumé").
    #[error("{0}")]
    Analysis(String),

    #[error("Model call failed: {0}")]
    Model(#[from] LlmError),

    /// A newer run (or an explicit cancel) replaced this one.
    #[error("Run was superseded by a newer run")]
    Superseded,
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Pipeline(err) => pipeline_status(err),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

fn pipeline_status(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err {
        PipelineError::UserInput(msg) => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "USER_INPUT_ERROR",
            msg.clone(),
        ),
        PipelineError::Extraction(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "EXTRACTION_ERROR",
            err.to_string(),
        ),
        PipelineError::Analysis(msg) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "ANALYSIS_ERROR", msg.clone())
        }
        PipelineError::ResponseFormat(msg) => {
            tracing::warn!("Model reply rejected: {msg}");
            (
                StatusCode::BAD_GATEWAY,
                "RESPONSE_FORMAT_ERROR",
                "The AI service returned a reply that could not be understood".to_string(),
            )
        }
        PipelineError::Model(e) => {
            tracing::error!("Model error: {e}");
            (
                StatusCode::BAD_GATEWAY,
                "MODEL_ERROR",
                "An AI processing error occurred".to_string(),
            )
        }
        PipelineError::Superseded => (StatusCode::CONFLICT, "SUPERSEDED", err.to_string()),
    }
}
