//! Image Relevance Classifier and Image Requestor.
//!
//! The classifier is a pure keyword-table lookup: lowercase the question
//! text and concept label, scan the domain categories in order, and the
//! first category with a substring match decides the diagram kind. It is
//! deliberately not a model call, so it stays deterministic, explainable,
//! and free of per-question latency.
//!
//! The requestor only runs for flagged questions. Its failures never abort
//! the run; the question is delivered without a usable image and the error
//! is recorded on the annotation.

use std::path::PathBuf;

use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{ImageAnnotation, ImageKind, ImageOutcome, QuestionDraft};
use crate::error::{PipelineError, Result};
use crate::openai::OpenAI;
use crate::util::fill_template;

struct KeywordCategory {
  kind: ImageKind,
  keywords: &'static [&'static str],
}

/// Scanned top to bottom; order is part of the contract (first match wins).
const KEYWORD_TABLE: &[KeywordCategory] = &[
  // Mathematics
  KeywordCategory {
    kind: ImageKind::GeometricDiagram,
    keywords: &[
      "triangle", "angle", "circle", "rectangle", "polygon", "fraction", "graph",
      "geometry", "perimeter", "area", "symmetry", "coordinate", "number line",
    ],
  },
  // Science
  KeywordCategory {
    kind: ImageKind::BiologicalDiagram,
    keywords: &[
      "cell", "cycle", "ecosystem", "photosynthesis", "organ", "skeleton",
      "food chain", "habitat", "life cycle", "plant", "digestion",
    ],
  },
  // Social studies
  KeywordCategory {
    kind: ImageKind::HistoricalTimeline,
    keywords: &[
      "map", "timeline", "government", "empire", "dynasty", "civilization",
      "continent", "trade route", "monument",
    ],
  },
  // Language arts
  KeywordCategory {
    kind: ImageKind::LinguisticChart,
    keywords: &["story", "character", "grammar", "plot", "sentence structure", "paragraph"],
  },
  // General
  KeywordCategory {
    kind: ImageKind::ProcessDiagram,
    keywords: &["process", "comparison", "cause and effect", "sequence", "stages", "steps", "flow"],
  },
];

/// Decide whether a question warrants a supporting diagram, and what kind.
/// None means no image.
pub fn classify_image_need(question: &QuestionDraft, concept: &str) -> Option<ImageKind> {
  let haystack = format!("{} {}", question.question, concept).to_lowercase();
  KEYWORD_TABLE
    .iter()
    .find(|cat| cat.keywords.iter().any(|k| haystack.contains(k)))
    .map(|cat| cat.kind)
}

/// Build the generation prompt for a flagged question.
pub fn build_image_prompt(
  prompts: &Prompts,
  question: &QuestionDraft,
  concept: &str,
  grade: &str,
  kind: ImageKind,
) -> String {
  fill_template(
    &prompts.image_prompt_template,
    &[
      ("kind", kind.label()),
      ("question", &question.question),
      ("concept", concept),
      ("grade", grade),
    ],
  )
}

/// Where generated diagram bytes land. Persistence proper is external to
/// the pipeline; this seam just turns bytes into a stable reference.
#[derive(Clone, Debug)]
pub struct ImageStore {
  root: PathBuf,
}

impl ImageStore {
  pub fn from_env() -> Self {
    let root = std::env::var("GENERATED_IMAGE_DIR").unwrap_or_else(|_| "./generated-images".into());
    Self { root: PathBuf::from(root) }
  }

  #[allow(dead_code)]
  pub fn at(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Store PNG bytes under `key` and return the reference callers embed in
  /// the annotation.
  pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
    tokio::fs::create_dir_all(&self.root)
      .await
      .map_err(|e| PipelineError::ImageRequest(format!("image store unavailable: {e}")))?;
    let path = self.root.join(format!("{key}.png"));
    tokio::fs::write(&path, bytes)
      .await
      .map_err(|e| PipelineError::ImageRequest(format!("failed to store image: {e}")))?;
    Ok(path.display().to_string())
  }
}

/// Request a diagram for one flagged question. Always returns an annotation:
/// `Ready` with a reference on success, `Failed` with the error otherwise.
#[instrument(
  level = "info",
  skip(openai, prompts, store, question),
  fields(%concept, kind = kind.tag(), %test_id, question_index)
)]
pub async fn request_image(
  openai: &OpenAI,
  prompts: &Prompts,
  store: &ImageStore,
  question: &QuestionDraft,
  concept: &str,
  grade: &str,
  kind: ImageKind,
  test_id: &str,
  question_index: usize,
) -> ImageAnnotation {
  let prompt = build_image_prompt(prompts, question, concept, grade, kind);
  let description = format!("{} for \"{}\" at {} level", kind.label(), concept, grade);

  let outcome = match openai.generate_image(&prompt).await {
    Ok(bytes) => match store.put(&format!("{test_id}-q{question_index}"), &bytes).await {
      Ok(reference) => {
        info!(target: "pipeline", %reference, "Image stored");
        ImageOutcome::Ready { reference }
      }
      Err(e) => {
        error!(target: "pipeline", error = %e, "Image store failed; question continues without image");
        ImageOutcome::Failed { error: e.to_string() }
      }
    },
    Err(e) => {
      error!(target: "pipeline", error = %e, "Image generation failed; question continues without image");
      ImageOutcome::Failed { error: e.to_string() }
    }
  };

  ImageAnnotation { kind, prompt, description, outcome }
}
