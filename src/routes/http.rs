//! HTTP endpoint handlers. These are thin wrappers that parse the upload
//! form and forward to the pipeline; all generation logic lives there.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::{Multipart, State}, response::IntoResponse, Json};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::domain::{AssessmentKind, UploadParams, UploadedFile};
use crate::error::{PipelineError, Result};
use crate::pipeline::{run_batch, PipelineContext, ProgressWindow};
use crate::protocol::{GenerateOut, HealthOut};
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

/// Multipart upload -> pipeline run -> result envelope. Failures come back
/// as `success: false` with a single human-readable error; the caller may
/// retry the same files. No automatic retries happen here.
#[instrument(level = "info", skip(state, multipart))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  mut multipart: Multipart,
) -> impl IntoResponse {
  let (files, params) = match parse_generate_form(&mut multipart).await {
    Ok(parsed) => parsed,
    Err(e) => return Json(GenerateOut::fail(e.to_string())),
  };

  let Some(openai) = state.openai.as_ref() else {
    return Json(GenerateOut::fail(PipelineError::GenerationDisabled.to_string()));
  };

  let ctx = PipelineContext {
    openai,
    prompts: &state.prompts,
    store: &state.image_store,
  };
  // HTTP callers get the whole progress range; progress lands in the logs.
  let progress = |pct: u8| info!(target: "pipeline", pct, "Batch progress");
  let cancel = CancellationToken::new();

  match run_batch(&ctx, &files, &params, ProgressWindow::FULL, &progress, &cancel).await {
    Ok(result) => {
      info!(target: "pipeline", tests = result.tests.len(), "Generate request served");
      Json(GenerateOut::ok(result))
    }
    Err(e) => Json(GenerateOut::fail(e.to_string())),
  }
}

/// Drain the multipart stream into file buffers and named text fields.
async fn parse_generate_form(multipart: &mut Multipart) -> Result<(Vec<UploadedFile>, UploadParams)> {
  let mut files = Vec::new();
  let mut fields: HashMap<String, String> = HashMap::new();

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| PipelineError::InvalidRequest(format!("bad multipart body: {e}")))?
  {
    let name = field.name().unwrap_or_default().to_string();
    if name == "file" || name == "files" {
      let filename = field.file_name().unwrap_or("upload.pdf").to_string();
      let bytes = field
        .bytes()
        .await
        .map_err(|e| PipelineError::InvalidRequest(format!("failed to read '{filename}': {e}")))?
        .to_vec();
      files.push(UploadedFile { filename, bytes });
    } else {
      let value = field
        .text()
        .await
        .map_err(|e| PipelineError::InvalidRequest(format!("failed to read field '{name}': {e}")))?;
      fields.insert(name, value);
    }
  }

  let params = params_from_fields(&fields)?;
  Ok((files, params))
}

fn params_from_fields(fields: &HashMap<String, String>) -> Result<UploadParams> {
  let get = |key: &str| {
    fields
      .get(key)
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
  };
  let required =
    |key: &str| get(key).ok_or_else(|| PipelineError::InvalidRequest(format!("{key} is required")));
  let int = |key: &str, value: String| {
    value
      .parse::<usize>()
      .map_err(|_| PipelineError::InvalidRequest(format!("{key} must be an integer")))
  };

  // u32 straight from the form; no lossy narrowing.
  let duration_minutes = required("duration")?
    .parse::<u32>()
    .map_err(|_| PipelineError::InvalidRequest("duration must be an integer".into()))?;

  let kind = match required("type")?.as_str() {
    "coursework" => AssessmentKind::Coursework,
    "weekly" => AssessmentKind::Weekly,
    other => {
      return Err(PipelineError::InvalidRequest(format!("unknown test type '{other}'")));
    }
  };

  let params = UploadParams {
    subject: required("subject")?,
    grade: required("grade")?,
    board: required("board")?,
    kind,
    duration_minutes,
    custom_prompt: get("customPrompt"),
    chapter: get("chapter"),
    start_date: get("startDate"),
    end_date: get("endDate"),
    num_tests: int("numTests", required("numTests")?)?,
    questions_per_test: int("questionsPerTest", required("questionsPerTest")?)?,
  };
  params.validate()?;
  Ok(params)
}
