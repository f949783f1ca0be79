//! Test Assembler: one concept + its question drafts + the request
//! parameters to a named `GeneratedTest`.
//!
//! Title derivation is a user-facing contract and must not drift:
//!   coursework: "<grade> <subject> - Chapter <chapter>"
//!   weekly:     "<grade> <subject> Weekly Test"

use crate::domain::{AssessmentKind, GeneratedTest, QuestionDraft, UploadParams};

pub fn derive_title(params: &UploadParams) -> String {
  match params.kind {
    AssessmentKind::Coursework => format!(
      "{} {} - Chapter {}",
      params.grade,
      params.subject,
      params.chapter.as_deref().unwrap_or_default()
    ),
    AssessmentKind::Weekly => format!("{} {} Weekly Test", params.grade, params.subject),
  }
}

pub fn assemble_test(
  concept: &str,
  questions: Vec<QuestionDraft>,
  params: &UploadParams,
) -> GeneratedTest {
  GeneratedTest {
    title: derive_title(params),
    description: format!("A {} {} test covering {}.", params.grade, params.subject, concept),
    subject: params.subject.clone(),
    grade: params.grade.clone(),
    board: params.board.clone(),
    duration_minutes: params.duration_minutes,
    concept: concept.to_string(),
    questions,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(kind: AssessmentKind) -> UploadParams {
    UploadParams {
      subject: "Mathematics".into(),
      grade: "Grade 4".into(),
      board: "ICSE".into(),
      kind,
      duration_minutes: 45,
      custom_prompt: None,
      chapter: Some("3".into()),
      start_date: Some("01/09".into()),
      end_date: Some("07/09".into()),
      num_tests: 2,
      questions_per_test: 10,
    }
  }

  #[test]
  fn coursework_title_is_exact() {
    let t = assemble_test("Fractions", vec![], &params(AssessmentKind::Coursework));
    assert_eq!(t.title, "Grade 4 Mathematics - Chapter 3");
  }

  #[test]
  fn weekly_title_is_exact() {
    let t = assemble_test("Fractions", vec![], &params(AssessmentKind::Weekly));
    assert_eq!(t.title, "Grade 4 Mathematics Weekly Test");
  }

  #[test]
  fn request_fields_pass_through_unchanged() {
    let t = assemble_test("Fractions", vec![], &params(AssessmentKind::Coursework));
    assert_eq!(t.board, "ICSE");
    assert_eq!(t.duration_minutes, 45);
    assert_eq!(t.concept, "Fractions");
    assert!(t.description.contains("Fractions"));
    assert!(t.description.contains("Grade 4"));
  }
}
