//! Axum route handlers for the Analysis API.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::analysis::checklist::{build_checklist, ChecklistItem};
use crate::analysis::metrics::MetricCatalog;
use crate::analysis::models::AnalysisReport;
use crate::errors::{AppError, PipelineError};
use crate::session::SessionSnapshot;
use crate::state::AppState;

const PDF_MIME: &str = "application/pdf";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelRunResponse {
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChecklistRequest {
    pub text: String,
}

/// One uploaded file part, held only for the duration of the request.
struct Upload {
    content_type: Option<String>,
    file_name: Option<String>,
    bytes: Bytes,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let session_id = state.sessions.create();
    (StatusCode::CREATED, Json(CreateSessionResponse { session_id }))
}

/// GET /api/v1/sessions/:id
///
/// Returns the session's committed results (if any) and the run in flight.
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    state
        .sessions
        .snapshot(session_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Session {session_id} not found")))
    }
}

/// DELETE /api/v1/sessions/:id/run
///
/// Supersedes the in-flight run, if any. Its eventual result is discarded.
pub async fn handle_cancel_run(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CancelRunResponse>, AppError> {
    let cancelled = state
        .sessions
        .cancel(session_id)
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
    Ok(Json(CancelRunResponse { cancelled }))
}

/// POST /api/v1/sessions/:id/analyze
///
/// Multipart upload with a `file` part declared as `application/pdf`.
/// Full pipeline: extract → checklist + prompt → model → parse → metrics.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<AnalysisReport>, AppError> {
    if !state.sessions.contains(session_id) {
        return Err(AppError::NotFound(format!("Session {session_id} not found")));
    }

    let upload = read_file_part(multipart).await?;
    validate_upload(
        upload.content_type.as_deref(),
        upload.file_name.as_deref(),
        &upload.bytes,
    )?;

    let ctx = state
        .sessions
        .begin_run(session_id)
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
    info!(
        "Run {} started for session {} ({} bytes)",
        ctx.run_id(),
        session_id,
        upload.bytes.len()
    );

    let report = state
        .pipeline
        .run_pdf(&state.sessions, &ctx, &upload.bytes)
        .await?;

    Ok(Json(report))
}

/// POST /api/v1/checklist
///
/// Runs the ATS checklist alone over plain text. No model involved.
pub async fn handle_checklist(
    State(state): State<AppState>,
    Json(request): Json<ChecklistRequest>,
) -> Json<Vec<ChecklistItem>> {
    Json(build_checklist(
        state.pipeline.checklist_catalog(),
        request.text.trim(),
    ))
}

/// GET /api/v1/metrics
pub async fn handle_get_metrics(State(state): State<AppState>) -> Json<MetricCatalog> {
    Json(state.pipeline.metric_catalog().clone())
}

// ────────────────────────────────────────────────────────────────────────────
// Upload intake
// ────────────────────────────────────────────────────────────────────────────

async fn read_file_part(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read upload: {e}")))?;
        return Ok(Upload {
            content_type,
            file_name,
            bytes,
        });
    }
    Err(PipelineError::UserInput("no 'file' part in upload".to_string()).into())
}

/// Declared type must be PDF; without a declared type the file name decides.
/// Content is not sniffed here: undecodable bytes are the extractor's call.
fn validate_upload(
    content_type: Option<&str>,
    file_name: Option<&str>,
    bytes: &[u8],
) -> Result<(), PipelineError> {
    let declared_pdf = match content_type {
        Some(ct) => ct
            .split(';')
            .next()
            .map(|mime| mime.trim().eq_ignore_ascii_case(PDF_MIME))
            .unwrap_or(false),
        None => file_name
            .map(|name| name.to_ascii_lowercase().ends_with(".pdf"))
            .unwrap_or(false),
    };
    if !declared_pdf {
        return Err(PipelineError::UserInput(format!(
            "expected a PDF upload, got {}",
            content_type.unwrap_or("an untyped file")
        )));
    }
    if bytes.is_empty() {
        return Err(PipelineError::UserInput("uploaded file is empty".to_string()));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
