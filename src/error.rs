//! Pipeline error taxonomy.
//!
//! Fatality is decided where the error is handled, not where it is raised:
//! extraction, question-generation, and validation errors abort the whole
//! run; image errors are recorded on the question and the run continues;
//! concept-identification failures never surface at all (the identifier
//! substitutes generic concepts instead).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
  /// Corrupt, encrypted, or empty PDF. Fatal to the whole run.
  #[error("failed to extract text from PDF: {0}")]
  Extraction(String),

  /// Size gate, checked before extraction. The limit is inclusive.
  #[error("file '{filename}' is {size} bytes; uploads must stay under {limit} bytes")]
  FileTooLarge { filename: String, size: usize, limit: usize },

  /// Model or network failure while generating questions. Fatal: there is
  /// no generic-question fallback, fabricated assessment content is worse
  /// than failing loudly.
  #[error("question generation failed for '{concept}': {reason}")]
  QuestionGeneration { concept: String, reason: String },

  /// Parsed model output did not satisfy the question schema. Fatal.
  #[error("model returned a malformed question: {0}")]
  Validation(String),

  /// An external call exceeded its deadline. Kept distinct from generation
  /// failures so callers can tell a hang from a bad response.
  #[error("external call timed out after {0}s")]
  Timeout(u64),

  /// Transport or API error from the model service.
  #[error("model call failed: {0}")]
  ModelCall(String),

  /// Image generation or storage failed. Recorded per-question, never
  /// aborts the run.
  #[error("image request failed: {0}")]
  ImageRequest(String),

  /// Malformed or incomplete upload form.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// No OPENAI_API_KEY configured; the pipeline cannot run.
  #[error("generation is disabled: no OPENAI_API_KEY configured")]
  GenerationDisabled,

  /// Caller cancelled the batch between steps.
  #[error("run cancelled by caller")]
  Cancelled,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
