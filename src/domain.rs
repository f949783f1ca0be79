//! Domain models for the generation pipeline: upload parameters, question
//! drafts, image annotations, assembled tests, and the run result.
//!
//! Everything here is created fresh for one pipeline run and lives only in
//! memory until it is returned to the caller; persistence is external.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Uploads at or above this size are rejected before extraction begins.
pub const MAX_UPLOAD_BYTES: usize = 4_718_592; // 4.5 MiB

/// Every generated question carries exactly this many answer options.
pub const OPTION_COUNT: usize = 4;

/// Which kind of assessment is being generated?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
  /// Chapter-scoped; one uploaded document may yield several tests.
  Coursework,
  /// Date-range-scoped; always exactly one test per uploaded document.
  Weekly,
}

/// One uploaded PDF, still as raw bytes.
#[derive(Clone, Debug)]
pub struct UploadedFile {
  pub filename: String,
  pub bytes: Vec<u8>,
}

impl UploadedFile {
  pub fn oversize(&self) -> bool {
    self.bytes.len() >= MAX_UPLOAD_BYTES
  }
}

/// Pedagogical parameters accompanying an upload. Shared by every file in a
/// batch; the file bytes travel separately (see `UploadedFile`).
#[derive(Clone, Debug)]
pub struct UploadParams {
  pub subject: String,
  pub grade: String,
  pub board: String,
  pub kind: AssessmentKind,
  pub duration_minutes: u32,
  /// Optional free text appended to the question-generation instructions.
  pub custom_prompt: Option<String>,
  /// Required for coursework.
  pub chapter: Option<String>,
  /// Required for weekly, "dd/mm".
  pub start_date: Option<String>,
  pub end_date: Option<String>,
  pub num_tests: usize,
  pub questions_per_test: usize,
}

impl UploadParams {
  /// Weekly tests are pinned to one test per document no matter what the
  /// form requested.
  pub fn effective_num_tests(&self) -> usize {
    match self.kind {
      AssessmentKind::Weekly => 1,
      AssessmentKind::Coursework => self.num_tests,
    }
  }

  /// Reject requests the pipeline could not assemble a test from.
  pub fn validate(&self) -> Result<()> {
    if self.subject.trim().is_empty() {
      return Err(PipelineError::InvalidRequest("subject is required".into()));
    }
    if self.grade.trim().is_empty() {
      return Err(PipelineError::InvalidRequest("grade is required".into()));
    }
    if self.questions_per_test == 0 {
      return Err(PipelineError::InvalidRequest("questionsPerTest must be at least 1".into()));
    }
    match self.kind {
      AssessmentKind::Coursework => {
        // Weekly is exempt: effective_num_tests pins it to 1 whatever the
        // form requested, zero included.
        if self.num_tests == 0 {
          return Err(PipelineError::InvalidRequest("numTests must be at least 1".into()));
        }
        if self.chapter.as_deref().map_or(true, |c| c.trim().is_empty()) {
          return Err(PipelineError::InvalidRequest(
            "chapter is required for coursework tests".into(),
          ));
        }
      }
      AssessmentKind::Weekly => {
        for (name, value) in [("startDate", &self.start_date), ("endDate", &self.end_date)] {
          match value.as_deref() {
            Some(d) if is_day_month(d) => {}
            Some(d) => {
              return Err(PipelineError::InvalidRequest(format!(
                "{name} '{d}' is not a valid dd/mm date"
              )));
            }
            None => {
              return Err(PipelineError::InvalidRequest(format!(
                "{name} is required for weekly tests"
              )));
            }
          }
        }
      }
    }
    Ok(())
  }
}

/// "dd/mm" with a plausible day and month.
fn is_day_month(s: &str) -> bool {
  let Some((day, month)) = s.split_once('/') else { return false };
  let (Ok(day), Ok(month)) = (day.parse::<u8>(), month.parse::<u8>()) else { return false };
  (1..=31).contains(&day) && (1..=12).contains(&month)
}

/// A structured multiple-choice question as parsed from model output.
/// Unvalidated until it passes `questions::validate_question`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
  pub question: String,
  pub options: Vec<String>,
  #[serde(rename = "correctAnswer")]
  pub correct_answer: usize,
  pub explanation: String,
  /// Attached later by the image requestor; absent means "no image".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<ImageAnnotation>,
}

/// What kind of supporting diagram does a question warrant?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
  GeometricDiagram,
  BiologicalDiagram,
  HistoricalTimeline,
  LinguisticChart,
  ProcessDiagram,
}

impl ImageKind {
  /// Stable tag used in annotations and image prompts.
  pub fn tag(&self) -> &'static str {
    match self {
      ImageKind::GeometricDiagram => "geometric_diagram",
      ImageKind::BiologicalDiagram => "biological_diagram",
      ImageKind::HistoricalTimeline => "historical_timeline",
      ImageKind::LinguisticChart => "linguistic_chart",
      ImageKind::ProcessDiagram => "process_diagram",
    }
  }

  /// Human-readable form for descriptions.
  pub fn label(&self) -> &'static str {
    match self {
      ImageKind::GeometricDiagram => "geometric diagram",
      ImageKind::BiologicalDiagram => "biological diagram",
      ImageKind::HistoricalTimeline => "historical timeline",
      ImageKind::LinguisticChart => "linguistic chart",
      ImageKind::ProcessDiagram => "process diagram",
    }
  }
}

/// Outcome of an image request. `Failed` is kept for observability only;
/// the owning question is still delivered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageOutcome {
  Ready { reference: String },
  Failed { error: String },
}

/// Diagram metadata attached to a question the classifier flagged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotation {
  pub kind: ImageKind,
  pub prompt: String,
  pub description: String,
  pub outcome: ImageOutcome,
}

/// One assembled test. Corresponds to exactly one concept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratedTest {
  pub title: String,
  pub description: String,
  pub subject: String,
  pub grade: String,
  pub board: String,
  #[serde(rename = "durationMinutes")]
  pub duration_minutes: u32,
  pub concept: String,
  pub questions: Vec<QuestionDraft>,
}

/// Everything one batch run produced. Ownership of persistence is external.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineResult {
  pub tests: Vec<GeneratedTest>,
  pub concepts: Vec<String>,
  /// Truncated preview of the extracted text, returned for inspection.
  pub text_preview: String,
}
