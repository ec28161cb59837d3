//! Analysis pipeline: orchestrates one run over a `RunContext`.
//!
//! Flow: extract pages → document text → checklist + prompt → model call →
//!       normalize reply → parse → resolve metrics → commit to the session.
//!
//! Only page retrieval and the model call suspend; everything else is a pure
//! synchronous transformation. Any error aborts the run and the session's partial
//! state is discarded; so does dropping a run before it settles (e.g. the client
//! went away mid-request). Nothing here retries; the transport's policy is the caller's.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::analysis::checklist::{build_checklist, ChecklistCatalog, ChecklistItem};
use crate::analysis::metrics::{resolve_metrics, MetricCatalog};
use crate::analysis::models::{AnalysisReport, AnalysisResult};
use crate::analysis::parser::parse_analysis;
use crate::analysis::prompt::{build_model_request, PromptTemplate};
use crate::errors::PipelineError;
use crate::extraction::{extract_text, PageSource, PdfPages};
use crate::llm_client::ModelTransport;
use crate::session::{RunContext, SessionStore};

/// Output of the model-independent half of a run.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub text: String,
    pub page_count: usize,
    pub checklist: Vec<ChecklistItem>,
    pub prompt: String,
}

pub struct AnalysisPipeline {
    transport: Arc<dyn ModelTransport>,
    model: String,
    template: PromptTemplate,
    checklist: ChecklistCatalog,
    metrics: MetricCatalog,
}

impl AnalysisPipeline {
    pub fn new(
        transport: Arc<dyn ModelTransport>,
        model: String,
        template: PromptTemplate,
        checklist: ChecklistCatalog,
        metrics: MetricCatalog,
    ) -> Self {
        Self {
            transport,
            model,
            template,
            checklist,
            metrics,
        }
    }

    pub fn checklist_catalog(&self) -> &ChecklistCatalog {
        &self.checklist
    }

    pub fn metric_catalog(&self) -> &MetricCatalog {
        &self.metrics
    }

    /// Extraction, checklist and prompt. Never touches the model.
    pub async fn prepare(&self, source: Arc<dyn PageSource>) -> Result<PreparedDocument, PipelineError> {
        let extracted = extract_text(source).await?;
        let checklist = build_checklist(&self.checklist, &extracted.text);
        let prompt = self.template.render(&extracted.text);

        if tracing::enabled!(tracing::Level::DEBUG) && !extracted.text.is_empty() {
            let preview: String = extracted.text.chars().take(120).collect();
            debug!("Document preview: {preview:?}");
        }

        Ok(PreparedDocument {
            page_count: extracted.page_count(),
            text: extracted.text,
            checklist,
            prompt,
        })
    }

    /// Model call, reply normalization and parsing.
    pub async fn analyze(&self, prompt: String) -> Result<AnalysisResult, PipelineError> {
        let request = build_model_request(&self.model, prompt);
        let reply = self.transport.complete(&request).await?.into_text();
        debug!("Model reply: {} chars", reply.len());
        parse_analysis(&reply)
    }

    /// Full run over raw PDF bytes. The bytes are only borrowed for parsing.
    pub async fn run_pdf(
        &self,
        sessions: &SessionStore,
        ctx: &RunContext,
        bytes: &[u8],
    ) -> Result<AnalysisReport, PipelineError> {
        let pending = PendingRun::new(sessions, ctx);
        let outcome = async {
            let pages = ctx.guard(PdfPages::load(bytes)).await??;
            self.run_stages(sessions, ctx, Arc::new(pages)).await
        }
        .await;
        pending.disarm();
        self.settle(sessions, ctx, outcome)
    }

    /// Full run over an already-opened page source.
    pub async fn run(
        &self,
        sessions: &SessionStore,
        ctx: &RunContext,
        source: Arc<dyn PageSource>,
    ) -> Result<AnalysisReport, PipelineError> {
        let pending = PendingRun::new(sessions, ctx);
        let outcome = self.run_stages(sessions, ctx, source).await;
        pending.disarm();
        self.settle(sessions, ctx, outcome)
    }

    async fn run_stages(
        &self,
        sessions: &SessionStore,
        ctx: &RunContext,
        source: Arc<dyn PageSource>,
    ) -> Result<AnalysisReport, PipelineError> {
        info!(
            "Run {} (session {}): extracting document",
            ctx.run_id(),
            ctx.session_id()
        );
        let prepared = ctx.guard(self.prepare(source)).await??;
        info!(
            "Run {}: {} pages, {} chars of text",
            ctx.run_id(),
            prepared.page_count,
            prepared.text.len()
        );
        sessions.record_prepared(ctx, &prepared.text, &prepared.checklist)?;

        let analysis = ctx.guard(self.analyze(prepared.prompt)).await??;
        ctx.checkpoint()?;

        let metrics = resolve_metrics(&self.metrics, Some(&analysis.performance_metrics));

        Ok(AnalysisReport {
            run_id: ctx.run_id(),
            analyzed_at: Utc::now(),
            page_count: prepared.page_count,
            analysis,
            checklist: prepared.checklist,
            metrics,
        })
    }

    fn settle(
        &self,
        sessions: &SessionStore,
        ctx: &RunContext,
        outcome: Result<AnalysisReport, PipelineError>,
    ) -> Result<AnalysisReport, PipelineError> {
        match outcome {
            Ok(report) => {
                sessions.commit(ctx, report.clone())?;
                info!(
                    "Run {} complete: overall score {}",
                    ctx.run_id(),
                    report.analysis.overall_score
                );
                Ok(report)
            }
            Err(e) => {
                warn!("Run {} failed: {e}", ctx.run_id());
                sessions.fail(ctx);
                Err(e)
            }
        }
    }
}

/// Fails the run on drop unless disarmed. Covers runs whose future is dropped
/// before `settle`, which would otherwise leave partial state and a dangling
/// active run in the session.
struct PendingRun<'a> {
    sessions: &'a SessionStore,
    ctx: &'a RunContext,
    armed: bool,
}

impl<'a> PendingRun<'a> {
    fn new(sessions: &'a SessionStore, ctx: &'a RunContext) -> Self {
        Self {
            sessions,
            ctx,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRun<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Run {} abandoned before completion", self.ctx.run_id());
            self.sessions.fail(self.ctx);
        }
    }
}
