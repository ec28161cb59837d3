//! lopdf-backed page source.
//!
//! Parsing and per-page text extraction are CPU-bound, so both run inside
//! `tokio::task::spawn_blocking`. lopdf can panic on some malformed fonts; a
//! panicking task surfaces as a `JoinError` and is reported as an extraction failure.

use std::sync::Arc;

use async_trait::async_trait;
use lopdf::Document;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::extraction::PageSource;

/// A parsed PDF. Holds the parsed object graph only; the raw bytes are not retained.
pub struct PdfPages {
    doc: Arc<Document>,
    page_numbers: Vec<u32>,
}

impl PdfPages {
    /// Parses `bytes` as a PDF. Fails with `Extraction` on anything lopdf rejects.
    pub async fn load(bytes: &[u8]) -> Result<Self, PipelineError> {
        let owned = bytes.to_vec();
        let doc = tokio::task::spawn_blocking(move || Document::load_mem(&owned))
            .await
            .map_err(|e| PipelineError::Extraction(format!("PDF parser crashed: {e}")))?
            .map_err(|e| {
                warn!("PDF parse failed: {e}");
                PipelineError::Extraction(e.to_string())
            })?;

        // BTreeMap keys: already ascending
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        debug!("Parsed PDF with {} pages", page_numbers.len());

        Ok(Self {
            doc: Arc::new(doc),
            page_numbers,
        })
    }
}

#[async_trait]
impl PageSource for PdfPages {
    fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    async fn page_text(&self, page_number: u32) -> Result<String, PipelineError> {
        let doc = Arc::clone(&self.doc);
        let raw = tokio::task::spawn_blocking(move || doc.extract_text(&[page_number]))
            .await
            .map_err(|e| {
                PipelineError::Extraction(format!("page {page_number} extraction crashed: {e}"))
            })?
            .map_err(|e| PipelineError::Extraction(format!("page {page_number}: {e}")))?;

        Ok(join_fragments(&raw))
    }
}

/// lopdf ends every text object with a line break. Fragments of one page are
/// concatenated without any separator, so those breaks are dropped.
fn join_fragments(raw: &str) -> String {
    raw.lines().collect()
}
