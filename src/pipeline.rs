//! Batch Orchestrator: drives the pipeline across one or more uploaded
//! files and aggregates the results.
//!
//! Files are processed strictly sequentially, in request order. That is a
//! rate-limiting decision, not an accidental limitation: it bounds
//! concurrent load on the generation service and keeps per-file progress
//! meaningful to the caller. Do not parallelize this loop without adding
//! explicit concurrency control.
//!
//! A fatal error on any file aborts the entire batch; partial results are
//! never returned as a successful outcome.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::assemble::assemble_test;
use crate::concepts::identify_concepts;
use crate::config::Prompts;
use crate::domain::{GeneratedTest, PipelineResult, UploadParams, UploadedFile, MAX_UPLOAD_BYTES};
use crate::error::{PipelineError, Result};
use crate::extract::extract_text;
use crate::images::{classify_image_need, request_image, ImageStore};
use crate::openai::OpenAI;
use crate::questions::generate_questions;
use crate::util::truncate_chars;

/// How much extracted text is echoed back to the caller.
const TEXT_PREVIEW_CHARS: usize = 500;

/// Where a run currently is. Logged at every transition; the terminal
/// failure state is the `Err` return carrying the failing file's index in
/// its log context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
  Idle,
  Extracting { file: usize },
  IdentifyingConcepts { file: usize },
  GeneratingQuestions { file: usize, concept: usize },
  Assembling { file: usize },
  Done,
}

/// Callback used to surface batch progress to the caller. Values are
/// percentages already scaled into the caller's reporting window.
pub type ProgressSink<'a> = dyn Fn(u8) + Send + Sync + 'a;

/// The caller's reporting window. An upload API that reserves 20-90% of its
/// own progress bar for generation passes `{ start: 20, end: 90 }`.
#[derive(Clone, Copy, Debug)]
pub struct ProgressWindow {
  pub start: u8,
  pub end: u8,
}

impl ProgressWindow {
  pub const FULL: ProgressWindow = ProgressWindow { start: 0, end: 100 };

  /// Scale `completed / total` into the window. Monotone in `completed`.
  pub fn scale(&self, completed: usize, total: usize) -> u8 {
    if total == 0 {
      return self.end;
    }
    let span = self.end.saturating_sub(self.start) as usize;
    self.start + ((completed.min(total) * span) / total) as u8
  }
}

/// Everything a run borrows from the application. The pipeline itself owns
/// no durable state.
pub struct PipelineContext<'a> {
  pub openai: &'a OpenAI,
  pub prompts: &'a Prompts,
  pub store: &'a ImageStore,
}

struct FileOutcome {
  tests: Vec<GeneratedTest>,
  concepts: Vec<String>,
  preview: String,
}

#[instrument(level = "info", skip_all, fields(files = files.len(), kind = ?params.kind))]
pub async fn run_batch(
  ctx: &PipelineContext<'_>,
  files: &[UploadedFile],
  params: &UploadParams,
  window: ProgressWindow,
  progress: &ProgressSink<'_>,
  cancel: &CancellationToken,
) -> Result<PipelineResult> {
  params.validate()?;
  if files.is_empty() {
    return Err(PipelineError::InvalidRequest("no files uploaded".into()));
  }
  // Size gate runs for the whole batch before any extraction starts.
  for file in files {
    if file.oversize() {
      return Err(PipelineError::FileTooLarge {
        filename: file.filename.clone(),
        size: file.bytes.len(),
        limit: MAX_UPLOAD_BYTES,
      });
    }
  }

  debug!(target: "pipeline", stage = ?PipelineStage::Idle, "Stage transition");
  let total = files.len();
  let mut tests = Vec::new();
  let mut concepts = Vec::new();
  let mut preview = String::new();
  progress(window.scale(0, total));

  for (index, file) in files.iter().enumerate() {
    if cancel.is_cancelled() {
      info!(target: "pipeline", file = index, "Batch cancelled between files");
      return Err(PipelineError::Cancelled);
    }
    match process_file(ctx, file, index, params, cancel).await {
      Ok(outcome) => {
        tests.extend(outcome.tests);
        concepts.extend(outcome.concepts);
        if preview.is_empty() {
          preview = outcome.preview;
        }
      }
      Err(e) => {
        // Terminal state: Aborted(file index, error). No partial results.
        error!(target: "pipeline", file = index, filename = %file.filename, error = %e, "Batch aborted");
        return Err(e);
      }
    }
    progress(window.scale(index + 1, total));
  }

  debug!(target: "pipeline", stage = ?PipelineStage::Done, "Stage transition");
  info!(target: "pipeline", tests = tests.len(), concepts = concepts.len(), "Batch complete");
  Ok(PipelineResult { tests, concepts, text_preview: preview })
}

async fn process_file(
  ctx: &PipelineContext<'_>,
  file: &UploadedFile,
  index: usize,
  params: &UploadParams,
  cancel: &CancellationToken,
) -> Result<FileOutcome> {
  let mut stage = PipelineStage::Extracting { file: index };
  debug!(target: "pipeline", ?stage, filename = %file.filename, "Stage transition");
  let text = extract_text(file.bytes.clone()).await?;

  stage = PipelineStage::IdentifyingConcepts { file: index };
  debug!(target: "pipeline", ?stage, "Stage transition");
  if cancel.is_cancelled() {
    return Err(PipelineError::Cancelled);
  }
  let concepts =
    identify_concepts(ctx.openai, ctx.prompts, &text, &params.subject, &params.grade).await;

  // One test per concept, up to the requested count. Weekly is already
  // pinned to a single test by effective_num_tests.
  let test_count = params.effective_num_tests().min(concepts.len());
  let mut drafted = Vec::with_capacity(test_count);

  for (concept_index, concept) in concepts.iter().take(test_count).enumerate() {
    stage = PipelineStage::GeneratingQuestions { file: index, concept: concept_index };
    debug!(target: "pipeline", ?stage, %concept, "Stage transition");
    if cancel.is_cancelled() {
      return Err(PipelineError::Cancelled);
    }

    let mut questions = generate_questions(
      ctx.openai,
      ctx.prompts,
      concept,
      &params.subject,
      &params.grade,
      &text,
      params.questions_per_test,
      params.custom_prompt.as_deref(),
    )
    .await?;

    let test_id = Uuid::new_v4().to_string();
    for (question_index, question) in questions.iter_mut().enumerate() {
      if let Some(kind) = classify_image_need(question, concept) {
        if cancel.is_cancelled() {
          return Err(PipelineError::Cancelled);
        }
        let annotation = request_image(
          ctx.openai,
          ctx.prompts,
          ctx.store,
          question,
          concept,
          &params.grade,
          kind,
          &test_id,
          question_index,
        )
        .await;
        question.image = Some(annotation);
      }
    }

    drafted.push((concept.clone(), questions));
  }

  stage = PipelineStage::Assembling { file: index };
  debug!(target: "pipeline", ?stage, "Stage transition");
  let tests = drafted
    .into_iter()
    .map(|(concept, questions)| assemble_test(&concept, questions, params))
    .collect();

  Ok(FileOutcome {
    tests,
    concepts,
    preview: truncate_chars(&text, TEXT_PREVIEW_CHARS).to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::AssessmentKind;
  use axum::{extract::State, routing::post, Json, Router};
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  fn test_ctx_parts() -> (OpenAI, Prompts, ImageStore) {
    let openai = OpenAI {
      client: reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("client"),
      api_key: "test-key".into(),
      base_url: "http://127.0.0.1:9".into(), // nothing listens here
      text_model: "test-model".into(),
      image_model: "test-image-model".into(),
    };
    let store = ImageStore::at(std::env::temp_dir().join("testforge-pipeline-tests"));
    (openai, Prompts::default(), store)
  }

  fn coursework_params() -> UploadParams {
    UploadParams {
      subject: "Mathematics".into(),
      grade: "Grade 1".into(),
      board: "CBSE".into(),
      kind: AssessmentKind::Coursework,
      duration_minutes: 20,
      custom_prompt: None,
      chapter: Some("2".into()),
      start_date: None,
      end_date: None,
      num_tests: 1,
      questions_per_test: 1,
    }
  }

  fn weekly_params() -> UploadParams {
    UploadParams {
      subject: "Science".into(),
      grade: "Grade 6".into(),
      board: "CBSE".into(),
      kind: AssessmentKind::Weekly,
      duration_minutes: 20,
      custom_prompt: None,
      chapter: None,
      start_date: Some("01/09".into()),
      end_date: Some("07/09".into()),
      num_tests: 4,
      questions_per_test: 5,
    }
  }

  /// One-page PDF with a real text layer. The xref offsets are computed
  /// while the buffer is built, so the file parses without repair.
  fn tiny_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
    let bodies = [
      "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
      "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
      "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
       /Resources << /Font << /F1 5 0 R >> >> >>"
        .to_string(),
      format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
      "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(bodies.len());
    for (i, body) in bodies.iter().enumerate() {
      offsets.push(pdf.len());
      pdf.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
    }
    let xref_at = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n", bodies.len() + 1));
    pdf.push_str("0000000000 65535 f \n");
    for offset in offsets {
      pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
      "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
      bodies.len() + 1
    ));
    pdf.into_bytes()
  }

  /// Canned chat.completions endpoint: concept calls get one concept name,
  /// question calls get one well-formed question. Records every user prompt
  /// so tests can observe call order.
  async fn stub_completions(
    State(calls): State<Arc<Mutex<Vec<String>>>>,
    Json(body): Json<serde_json::Value>,
  ) -> Json<serde_json::Value> {
    let user = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();
    let content = if user.contains("multiple choice questions") {
      r#"[{"question": "Which value comes after six?", "options": ["five", "six", "seven", "eight"], "correctAnswer": 2, "explanation": "Seven follows six."}]"#
    } else {
      r#"["Counting Review"]"#
    };
    calls.lock().expect("lock").push(user);
    Json(serde_json::json!({ "choices": [{ "message": { "content": content } }] }))
  }

  async fn spawn_stub() -> (String, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
      .route("/chat/completions", post(stub_completions))
      .with_state(calls.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
      axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), calls)
  }

  #[test]
  fn window_scaling_is_monotone_and_bounded() {
    let w = ProgressWindow { start: 20, end: 90 };
    let values: Vec<u8> = (0..=3).map(|done| w.scale(done, 3)).collect();
    assert_eq!(values.first(), Some(&20));
    assert_eq!(values.last(), Some(&90));
    assert!(values.windows(2).all(|p| p[0] <= p[1]), "not monotone: {values:?}");

    let full: Vec<u8> = (0..=4).map(|done| ProgressWindow::FULL.scale(done, 4)).collect();
    assert_eq!(full, vec![0, 25, 50, 75, 100]);
  }

  #[tokio::test]
  async fn three_file_batch_runs_in_order_with_stepped_progress() {
    let (base_url, calls) = spawn_stub().await;
    let openai = OpenAI {
      client: reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client"),
      api_key: "test-key".into(),
      base_url,
      text_model: "test-model".into(),
      image_model: "test-image-model".into(),
    };
    let prompts = Prompts::default();
    let store = ImageStore::at(std::env::temp_dir().join("testforge-pipeline-tests"));
    let ctx = PipelineContext { openai: &openai, prompts: &prompts, store: &store };

    let files: Vec<UploadedFile> = ["alpha", "bravo", "charlie"]
      .iter()
      .map(|word| UploadedFile {
        filename: format!("{word}.pdf"),
        bytes: tiny_pdf(&format!("Lesson {word}")),
      })
      .collect();

    let seen = Mutex::new(Vec::<u8>::new());
    let progress = |pct: u8| seen.lock().expect("lock").push(pct);
    let result = run_batch(
      &ctx,
      &files,
      &coursework_params(),
      ProgressWindow::FULL,
      &progress,
      &CancellationToken::new(),
    )
    .await
    .expect("batch succeeds");

    // 0% up front, then one step per completed file.
    assert_eq!(*seen.lock().expect("lock"), vec![0, 33, 66, 100]);
    assert_eq!(result.tests.len(), 3);
    assert_eq!(result.concepts.len(), 3);
    // Preview comes from the first file only.
    assert!(result.text_preview.contains("alpha"), "preview: {}", result.text_preview);

    // Question prompts embed each file's extracted text, so the recorded
    // calls show the files were processed in upload order.
    let recorded = calls.lock().expect("lock");
    let question_calls: Vec<&String> = recorded
      .iter()
      .filter(|c| c.contains("multiple choice questions"))
      .collect();
    assert_eq!(question_calls.len(), 3);
    for (call, word) in question_calls.iter().zip(["alpha", "bravo", "charlie"]) {
      assert!(call.contains(word), "expected '{word}' in question prompt");
    }
  }

  #[tokio::test]
  async fn oversize_file_is_rejected_before_extraction() {
    let (openai, prompts, store) = test_ctx_parts();
    let ctx = PipelineContext { openai: &openai, prompts: &prompts, store: &store };
    let files = vec![UploadedFile { filename: "big.pdf".into(), bytes: vec![0u8; MAX_UPLOAD_BYTES] }];
    let progress = |_pct: u8| {};
    let err = run_batch(
      &ctx, &files, &weekly_params(), ProgressWindow::FULL, &progress, &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::FileTooLarge { .. }), "got: {err:?}");
  }

  #[tokio::test]
  async fn empty_batch_is_invalid() {
    let (openai, prompts, store) = test_ctx_parts();
    let ctx = PipelineContext { openai: &openai, prompts: &prompts, store: &store };
    let progress = |_pct: u8| {};
    let err = run_batch(
      &ctx, &[], &weekly_params(), ProgressWindow::FULL, &progress, &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
  }

  #[tokio::test]
  async fn cancelled_batch_aborts_before_extraction() {
    let (openai, prompts, store) = test_ctx_parts();
    let ctx = PipelineContext { openai: &openai, prompts: &prompts, store: &store };
    let files = vec![UploadedFile { filename: "a.pdf".into(), bytes: vec![1u8; 64] }];
    let cancel = CancellationToken::new();
    cancel.cancel();
    let seen = Mutex::new(Vec::<u8>::new());
    let progress = |pct: u8| seen.lock().expect("lock").push(pct);
    let err = run_batch(&ctx, &files, &weekly_params(), ProgressWindow::FULL, &progress, &cancel)
      .await
      .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    // Only the initial 0% was emitted; no file completed.
    assert_eq!(*seen.lock().expect("lock"), vec![0]);
  }

  #[tokio::test]
  async fn unparseable_pdf_aborts_the_batch() {
    let (openai, prompts, store) = test_ctx_parts();
    let ctx = PipelineContext { openai: &openai, prompts: &prompts, store: &store };
    let files = vec![UploadedFile { filename: "broken.pdf".into(), bytes: b"not a pdf".to_vec() }];
    let progress = |_pct: u8| {};
    let err = run_batch(
      &ctx, &files, &weekly_params(), ProgressWindow::FULL, &progress, &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::Extraction(_)), "got: {err:?}");
  }
}
