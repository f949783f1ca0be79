//! Loading prompt configuration from TOML.
//!
//! See `PromptConfig` and `Prompts` for the expected schema. Defaults are
//! compiled in so the binary runs without any config file.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts used by the OpenAI client. Override them in TOML to tune tone
/// or structure; the templates use `{key}` placeholders (see util.rs).
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  // Concept identification
  pub concept_system: String,
  pub concept_user_template: String,
  // Question generation
  pub question_system: String,
  pub question_user_template: String,
  // Diagram generation
  pub image_prompt_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      concept_system:
        "You are a curriculum analyst. Respond ONLY with a strict JSON array of strings.".into(),
      concept_user_template:
        "Identify 2-3 short testable concepts covered by this {grade} {subject} material. \
         Return ONLY a JSON array of concept names, e.g. [\"Photosynthesis\", \"Plant Cells\"].\n\n\
         Material:\n{text}".into(),
      question_system:
        "You are an exam setter for school assessments. Respond ONLY with a strict JSON array; \
         no prose, no Markdown.".into(),
      question_user_template:
        "Write {count} multiple choice questions on \"{concept}\" for {grade} {subject}, based \
         strictly on the material below. Each question MUST have exactly 4 options, one correct \
         answer, and a short explanation. Do NOT reference page numbers, figures, images, or any \
         visual content from the material; only its text is available. Return a JSON array of \
         objects shaped {\"question\": string, \"options\": [string, string, string, string], \
         \"correctAnswer\": 0|1|2|3, \"explanation\": string}.\n\nMaterial:\n{text}".into(),
      image_prompt_template:
        "A clean, labelled {kind} suitable for a {grade} student, illustrating the concept \
         \"{concept}\" for this question: {question}. Simple educational style, white \
         background, no text other than labels.".into(),
    }
  }
}

/// Attempt to load `PromptConfig` from PROMPT_CONFIG_PATH. On any
/// parsing/IO error, returns None and the defaults are used.
pub fn load_prompt_config_from_env() -> Option<PromptConfig> {
  let path = std::env::var("PROMPT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PromptConfig>(&s) {
      Ok(cfg) => {
        info!(target: "testforge_backend", %path, "Loaded prompt config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "testforge_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "testforge_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::fill_template;

  #[test]
  fn default_question_prompt_carries_the_contract() {
    let p = Prompts::default();
    let user = fill_template(
      &p.question_user_template,
      &[
        ("count", "5"),
        ("concept", "Fractions"),
        ("grade", "Grade 4"),
        ("subject", "Mathematics"),
        ("text", "some material"),
      ],
    );
    assert!(user.contains("5 multiple choice questions"));
    assert!(user.contains("exactly 4 options"));
    assert!(user.contains("explanation"));
    // Visual references are forbidden because only text survives extraction.
    assert!(user.contains("Do NOT reference page numbers"));
    for placeholder in ["{count}", "{concept}", "{grade}", "{subject}", "{text}"] {
      assert!(!user.contains(placeholder), "unfilled {placeholder} left in: {user}");
    }
  }

  #[test]
  fn prompt_overrides_parse_from_toml() {
    let toml_src = r#"
      [prompts]
      concept_system = "sys"
      concept_user_template = "user {subject}"
      question_system = "qsys"
      question_user_template = "quser"
      image_prompt_template = "img"
    "#;
    let cfg: PromptConfig = toml::from_str(toml_src).expect("parse");
    assert_eq!(cfg.prompts.concept_system, "sys");
    assert_eq!(cfg.prompts.image_prompt_template, "img");
  }
}
