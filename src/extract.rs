//! Text Extractor: PDF byte buffer to plain text.
//!
//! Extraction failure is fatal to the whole run; no partial text is usable
//! downstream. The parse itself is CPU-bound, so it runs on the blocking
//! pool rather than stalling the runtime.

use tracing::{info, instrument};

use crate::error::{PipelineError, Result};

#[instrument(level = "info", skip(bytes), fields(size = bytes.len()))]
pub async fn extract_text(bytes: Vec<u8>) -> Result<String> {
  if bytes.is_empty() {
    return Err(PipelineError::Extraction("empty file".into()));
  }

  let text = tokio::task::spawn_blocking(move || {
    pdf_extract::extract_text_from_mem(&bytes).map(|s| s.trim().to_string())
  })
  .await
  .map_err(|e| PipelineError::Extraction(format!("extraction task failed: {e}")))?
  .map_err(|e| PipelineError::Extraction(e.to_string()))?;

  if text.is_empty() {
    return Err(PipelineError::Extraction("PDF has no extractable text layer".into()));
  }

  info!(target: "pipeline", chars = text.len(), "Extracted text from PDF");
  Ok(text)
}
