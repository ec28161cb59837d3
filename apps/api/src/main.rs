mod analysis;
mod config;
mod errors;
mod extraction;
mod llm_client;
mod routes;
mod session;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::checklist::ChecklistCatalog;
use crate::analysis::metrics::MetricCatalog;
use crate::analysis::pipeline::AnalysisPipeline;
use crate::analysis::prompt::PromptTemplate;
use crate::config::Config;
use crate::llm_client::HttpModelClient;
use crate::routes::build_router;
use crate::session::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Analyser API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize model transport
    let transport = HttpModelClient::new(
        config.model_api_url.clone(),
        config.model_api_key.clone(),
        config.retry_policy(),
    )?;
    info!(
        "Model client initialized (model: {}, attempts: {})",
        config.model, config.model_max_attempts
    );

    // Prompt template and catalogs; built-ins unless overridden on disk
    let template = match &config.prompt_template_path {
        Some(path) => PromptTemplate::from_file(path)?,
        None => PromptTemplate::default(),
    };
    let metrics = match &config.metric_catalog_path {
        Some(path) => MetricCatalog::from_file(path)?,
        None => MetricCatalog::default(),
    };
    let checklist = ChecklistCatalog::ats_default()?;
    info!(
        "Loaded {} checklist rules and {} metrics",
        checklist.rules().len(),
        metrics.entries().len()
    );

    let pipeline = AnalysisPipeline::new(
        Arc::new(transport),
        config.model.clone(),
        template,
        checklist,
        metrics,
    );

    // Session store with idle eviction
    let sessions = Arc::new(SessionStore::new());
    sessions
        .clone()
        .spawn_idle_sweeper(config.session_idle_ttl, config.session_sweep_interval());
    info!(
        "Sessions idle for more than {}s are evicted",
        config.session_idle_ttl.as_secs()
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        pipeline: Arc::new(pipeline),
        sessions,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
