//! Kotoba Quiz · word-guessing game backend
//!
//! The player describes a secret word without naming it; a language model first
//! checks the description against the rules, then tries to guess the word.
//!
//! - Axum HTTP + WebSocket API
//! - Two interchangeable model backends (local Ollama-compatible server, hosted OpenAI)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   GAME_CONFIG_PATH   : path to TOML config (backends, prompts, topic pools)
//!   PREFERRED_BACKEND  : "local" (default) or "hosted"
//!   OPENAI_API_KEY     : enables the hosted backend if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_MODEL       : default "gpt-4o-mini"
//!   LOCAL_MODEL_URL    : default "http://localhost:11434"
//!   LOCAL_MODEL_NAME   : default "gemma2:2b"
//!   TOPIC_ORDER        : "random" (default) or "sequential"
//!   DEFAULT_DIFFICULTY : "normal" (default) or "hard"
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod topics;
mod prompts;
mod backend;
mod game;
mod error;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (config, backend selector, session store).
  let state = Arc::new(AppState::new());
  state.warm_up().await;

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "kotoba_quiz", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  // Release the local model handle, if one is live.
  state.selector.shutdown().await;
  info!(target: "kotoba_quiz", "Shut down cleanly");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "kotoba_quiz", error = %e, "Failed to listen for ctrl-c; running until killed");
    std::future::pending::<()>().await;
  }
  info!(target: "kotoba_quiz", "Shutdown signal received");
}
