//! Question Generator: one concept + source text to an array of validated
//! multiple-choice question drafts.
//!
//! Unlike concept identification, failure here is fatal. There is no
//! generic-question fallback: fabricating plausible-looking but unfounded
//! assessment content is worse than failing loudly, so a parse or model
//! failure aborts the whole file's run.

use tracing::{info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{QuestionDraft, OPTION_COUNT};
use crate::error::{PipelineError, Result};
use crate::openai::OpenAI;
use crate::util::{fill_template, strip_code_fences};

/// Parse and strictly validate a model response. The model's JSON is never
/// trusted blindly: every record must satisfy the question schema. A
/// response that is not a question array at all is a generation failure;
/// `Validation` is reserved for records that parse but break the schema.
pub fn parse_questions(raw: &str, concept: &str) -> Result<Vec<QuestionDraft>> {
  let cleaned = strip_code_fences(raw);
  let drafts: Vec<QuestionDraft> =
    serde_json::from_str(cleaned).map_err(|e| PipelineError::QuestionGeneration {
      concept: concept.to_string(),
      reason: format!("response is not a JSON question array: {e}"),
    })?;
  for draft in &drafts {
    validate_question(draft)?;
  }
  Ok(drafts)
}

/// Schema invariants: exactly 4 options, correct-answer index in range,
/// non-empty question text.
pub fn validate_question(draft: &QuestionDraft) -> Result<()> {
  if draft.question.trim().is_empty() {
    return Err(PipelineError::Validation("empty question text".into()));
  }
  if draft.options.len() != OPTION_COUNT {
    return Err(PipelineError::Validation(format!(
      "expected {OPTION_COUNT} options, got {}",
      draft.options.len()
    )));
  }
  if draft.correct_answer >= draft.options.len() {
    return Err(PipelineError::Validation(format!(
      "correct answer index {} is out of range",
      draft.correct_answer
    )));
  }
  Ok(())
}

/// Truncate to the requested count; never pad when the model under-delivers.
fn cap_to_requested(mut drafts: Vec<QuestionDraft>, requested: usize) -> Vec<QuestionDraft> {
  if drafts.len() > requested {
    drafts.truncate(requested);
  }
  drafts
}

#[instrument(
  level = "info",
  skip(openai, prompts, text, custom_prompt),
  fields(%concept, %subject, %grade, count, text_len = text.len())
)]
pub async fn generate_questions(
  openai: &OpenAI,
  prompts: &Prompts,
  concept: &str,
  subject: &str,
  grade: &str,
  text: &str,
  count: usize,
  custom_prompt: Option<&str>,
) -> Result<Vec<QuestionDraft>> {
  let mut user = fill_template(
    &prompts.question_user_template,
    &[
      ("count", &count.to_string()),
      ("concept", concept),
      ("subject", subject),
      ("grade", grade),
      ("text", text),
    ],
  );
  if let Some(extra) = custom_prompt {
    let extra = extra.trim();
    if !extra.is_empty() {
      user.push_str("\n\nAdditional instructions from the teacher:\n");
      user.push_str(extra);
    }
  }

  let raw = match openai.chat_text(&prompts.question_system, &user, 0.7).await {
    Ok(raw) => raw,
    // Timeouts stay distinguishable from bad responses.
    Err(e @ PipelineError::Timeout(_)) => return Err(e),
    Err(e) => {
      return Err(PipelineError::QuestionGeneration {
        concept: concept.to_string(),
        reason: e.to_string(),
      })
    }
  };

  let drafts = parse_questions(&raw, concept)?;
  let drafts = cap_to_requested(drafts, count);
  if drafts.len() < count {
    warn!(
      target: "pipeline",
      got = drafts.len(),
      requested = count,
      %concept,
      "Model returned fewer questions than requested; not padding"
    );
  }
  info!(target: "pipeline", count = drafts.len(), %concept, "Questions generated");
  Ok(drafts)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn draft(correct: usize, options: usize) -> QuestionDraft {
    QuestionDraft {
      question: "What is 2 + 2?".into(),
      options: (0..options).map(|i| format!("{}", i + 2)).collect(),
      correct_answer: correct,
      explanation: "2 + 2 = 4.".into(),
      image: None,
    }
  }

  #[test]
  fn well_formed_questions_validate() {
    assert!(validate_question(&draft(2, 4)).is_ok());
  }

  #[test]
  fn wrong_option_count_is_rejected() {
    assert!(matches!(validate_question(&draft(0, 3)), Err(PipelineError::Validation(_))));
    assert!(matches!(validate_question(&draft(0, 5)), Err(PipelineError::Validation(_))));
  }

  #[test]
  fn out_of_range_answer_is_rejected() {
    assert!(matches!(validate_question(&draft(4, 4)), Err(PipelineError::Validation(_))));
  }

  #[test]
  fn parsing_own_output_round_trips() {
    let drafts = vec![draft(1, 4), draft(3, 4)];
    let serialized = serde_json::to_string(&drafts).expect("serialize");
    // Feeding the generator's own well-formed output back through
    // fence-strip + parse yields the identical structure.
    let reparsed = parse_questions(&serialized, "Arithmetic").expect("parse");
    assert_eq!(reparsed, drafts);
    let fenced = format!("```json\n{serialized}\n```");
    assert_eq!(parse_questions(&fenced, "Arithmetic").expect("parse fenced"), drafts);
  }

  #[test]
  fn malformed_records_fail_the_whole_array() {
    let mixed = serde_json::to_string(&vec![draft(1, 4), draft(1, 3)]).expect("serialize");
    let err = parse_questions(&mixed, "Arithmetic").unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "got: {err:?}");
  }

  #[test]
  fn non_json_response_is_a_generation_failure() {
    let err = parse_questions("I cannot write questions about that.", "Fractions").unwrap_err();
    assert!(matches!(err, PipelineError::QuestionGeneration { .. }), "got: {err:?}");
  }

  #[test]
  fn truncates_but_never_pads() {
    let five: Vec<_> = (0..5).map(|_| draft(0, 4)).collect();
    assert_eq!(cap_to_requested(five, 3).len(), 3);
    let two: Vec<_> = (0..2).map(|_| draft(0, 4)).collect();
    assert_eq!(cap_to_requested(two, 3).len(), 2);
  }

  #[tokio::test]
  async fn model_failure_is_fatal() {
    let oa = OpenAI {
      client: reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("client"),
      api_key: "test-key".into(),
      base_url: "http://127.0.0.1:9".into(), // nothing listens here
      text_model: "test-model".into(),
      image_model: "test-image-model".into(),
    };
    let prompts = Prompts::default();
    let err = generate_questions(&oa, &prompts, "Fractions", "Mathematics", "Grade 4", "text", 5, None)
      .await
      .unwrap_err();
    assert!(matches!(err, PipelineError::QuestionGeneration { .. }), "got: {err:?}");
  }
}
