//! Application state shared by handlers: prompts, the optional OpenAI
//! client, and the image store seam.
//!
//! There is deliberately no per-run state here. Each pipeline run owns its
//! own extracted text, concepts, and question arrays exclusively, so runs
//! for different uploads never share mutable state and need no locking.

use tracing::{info, instrument, warn};

use crate::config::{load_prompt_config_from_env, Prompts};
use crate::images::ImageStore;
use crate::openai::OpenAI;

#[derive(Clone)]
pub struct AppState {
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub image_store: ImageStore,
}

impl AppState {
    /// Build state from env: load prompt config, init OpenAI, pick the
    /// image directory.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let prompts = load_prompt_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(
                target: "testforge_backend",
                base_url = %oa.base_url,
                text_model = %oa.text_model,
                image_model = %oa.image_model,
                "OpenAI enabled."
            );
        } else {
            warn!(
                target: "testforge_backend",
                "OpenAI disabled (no OPENAI_API_KEY). Generation requests will be rejected."
            );
        }

        Self {
            openai,
            prompts,
            image_store: ImageStore::from_env(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
