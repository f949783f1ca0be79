//! Concept Identifier: extracted text (+ subject/grade) to 2-3 short
//! concept labels.
//!
//! This component never fails the run. When the model is unreachable or its
//! output does not parse, it substitutes three generic concepts named after
//! the subject: the pipeline must always have something testable to scope
//! questions to, even when concept extraction is unreliable.

use tracing::{error, info, instrument, warn};

use crate::config::Prompts;
use crate::openai::OpenAI;
use crate::util::{fill_template, strip_code_fences, trunc_for_log, truncate_chars};

/// Only a bounded prefix of the document is sent, to control prompt cost.
pub const CONCEPT_EXCERPT_CHARS: usize = 2_000;

/// At most this many concepts scope tests for one document.
pub const MAX_CONCEPTS: usize = 3;

const FALLBACK_SUFFIXES: [&str; 3] = ["Fundamentals", "Applications", "Problem Solving"];

/// The generic labels used when identification fails.
pub fn fallback_concepts(subject: &str) -> Vec<String> {
  FALLBACK_SUFFIXES.iter().map(|s| format!("{subject} {s}")).collect()
}

/// Parse a model response into concept labels. None means "unusable", which
/// the caller resolves with `fallback_concepts`.
pub fn parse_concepts(raw: &str) -> Option<Vec<String>> {
  let cleaned = strip_code_fences(raw);
  let labels: Vec<String> = serde_json::from_str(cleaned).ok()?;
  let labels: Vec<String> = labels
    .into_iter()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .take(MAX_CONCEPTS)
    .collect();
  if labels.is_empty() { None } else { Some(labels) }
}

#[instrument(level = "info", skip(openai, prompts, text), fields(%subject, %grade, text_len = text.len()))]
pub async fn identify_concepts(
  openai: &OpenAI,
  prompts: &Prompts,
  text: &str,
  subject: &str,
  grade: &str,
) -> Vec<String> {
  let excerpt = truncate_chars(text, CONCEPT_EXCERPT_CHARS);
  let user = fill_template(
    &prompts.concept_user_template,
    &[("subject", subject), ("grade", grade), ("text", excerpt)],
  );

  match openai.chat_text(&prompts.concept_system, &user, 0.4).await {
    Ok(raw) => match parse_concepts(&raw) {
      Some(labels) => {
        info!(target: "pipeline", count = labels.len(), concepts = ?labels, "Concepts identified");
        labels
      }
      None => {
        warn!(
          target: "pipeline",
          response = %trunc_for_log(&raw, 120),
          "Concept response was not a usable JSON array; using generic concepts"
        );
        fallback_concepts(subject)
      }
    },
    Err(e) => {
      error!(target: "pipeline", error = %e, "Concept identification failed; using generic concepts");
      fallback_concepts(subject)
    }
  }
}
