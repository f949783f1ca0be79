//! TestForge · Assessment Generation Backend
//!
//! - Axum HTTP API: upload PDFs + pedagogical parameters, get back
//!   generated multiple-choice tests
//! - OpenAI integration (via environment variables)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   OPENAI_API_KEY     : enables generation if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_TEXT_MODEL  : default "gpt-4o-mini"
//!   OPENAI_IMAGE_MODEL : default "dall-e-3"
//!   PROMPT_CONFIG_PATH : path to TOML config overriding the prompts
//!   GENERATED_IMAGE_DIR: where diagram PNGs land (default ./generated-images)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod state;
mod protocol;
mod openai;
mod extract;
mod concepts;
mod questions;
mod images;
mod assemble;
mod pipeline;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (prompts, OpenAI client, image store).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "testforge_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
