//! Reply parser: pulls the structured payload out of free-form model text.
//!
//! Extraction is a first-`{` / last-`}` heuristic, not a balanced-brace scan.
//! It tolerates prose and markdown fences around a single object. Replies with
//! several objects, or stray braces outside the payload, produce one span covering
//! all of them, which usually fails to parse. That behaviour is intentional and
//! covered by tests; do not swap in a balancing scanner.

use serde_json::Value;
use tracing::debug;

use crate::analysis::models::AnalysisResult;
use crate::errors::PipelineError;

const NO_RESULT: &str = "no parseable result";

/// Returns the slice from the first `{` to the last `}` inclusive, if both exist in order.
pub fn extract_payload(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&reply[start..=end])
}

/// Parses a normalized reply into an `AnalysisResult`.
///
/// - no payload, or neither `overallScore` nor `error` present → `ResponseFormat`
/// - JSON syntax or shape failure → `ResponseFormat` carrying the serde message
/// - `error` present → `Analysis` carrying the model's message (takes precedence
///   over `overallScore` when both appear)
pub fn parse_analysis(reply: &str) -> Result<AnalysisResult, PipelineError> {
    let payload = extract_payload(reply)
        .ok_or_else(|| PipelineError::ResponseFormat(NO_RESULT.to_string()))?;

    let value: Value = serde_json::from_str(payload)
        .map_err(|e| PipelineError::ResponseFormat(format!("invalid JSON payload: {e}")))?;

    let Value::Object(object) = &value else {
        return Err(PipelineError::ResponseFormat(NO_RESULT.to_string()));
    };

    if let Some(error) = object.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        debug!("Model rejected the document: {message}");
        return Err(PipelineError::Analysis(message));
    }

    if !object.contains_key("overallScore") {
        return Err(PipelineError::ResponseFormat(NO_RESULT.to_string()));
    }

    serde_json::from_value(value)
        .map_err(|e| PipelineError::ResponseFormat(format!("unexpected payload shape: {e}")))
}
