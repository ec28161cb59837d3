use std::sync::Arc;

use crate::analysis::pipeline::AnalysisPipeline;
use crate::config::Config;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Stateless pipeline: transport, prompt template and both catalogs.
    pub pipeline: Arc<AnalysisPipeline>,
    /// Per-session results and the currently active run of each session.
    pub sessions: Arc<SessionStore>,
}
