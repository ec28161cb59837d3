//! Text extraction: turns a multi-page document into one ordered document string.
//!
//! Pages are fetched concurrently, one task per page, but the result is always
//! assembled in ascending page order regardless of which task finishes first.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::debug;

use crate::errors::PipelineError;

pub mod pdf;

pub use pdf::PdfPages;

/// Anything that can hand out the text of its pages by 1-based page number.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    fn page_count(&self) -> usize;

    /// Text of one page: its fragments concatenated with no separator.
    async fn page_text(&self, page_number: u32) -> Result<String, PipelineError>;
}

/// Ordered page texts plus the joined, trimmed document string.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub pages: Vec<String>,
    pub text: String,
}

impl ExtractedText {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Joins pages with `\n` and trims the result.
pub fn assemble_document_text(pages: &[String]) -> String {
    pages.join("\n").trim().to_string()
}

/// Retrieves every page concurrently and assembles them in page order.
/// A zero-page source yields an empty string. The first failing page aborts
/// the whole extraction and the remaining tasks are cancelled.
pub async fn extract_text(source: Arc<dyn PageSource>) -> Result<ExtractedText, PipelineError> {
    let page_count = source.page_count();
    let mut tasks = JoinSet::new();

    for index in 0..page_count {
        let source = Arc::clone(&source);
        tasks.spawn(async move {
            let page_number = (index + 1) as u32;
            (index, source.page_text(page_number).await)
        });
    }

    let mut slots: Vec<Option<String>> = vec![None; page_count];
    while let Some(joined) = tasks.join_next().await {
        let (index, text) = joined
            .map_err(|e| PipelineError::Extraction(format!("page task failed: {e}")))?;
        slots[index] = Some(text?);
    }

    let pages = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| PipelineError::Extraction(format!("page {} missing", index + 1)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let text = assemble_document_text(&pages);
    debug!("Extracted {} pages, {} chars", pages.len(), text.len());

    Ok(ExtractedText { pages, text })
}
