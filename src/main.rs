//! Nurse Mentor · study aid backend
//!
//! - Axum HTTP API for lessons, lesson files, generated tests and quiz attempts
//! - Test generation through an OpenAI-compatible chat completions endpoint
//! - Supabase (PostgREST + Storage) persistence, in-memory when not configured
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   OPENAI_API_KEY       : enables test generation if present
//!   OPENAI_BASE_URL      : default "https://api.openai.com/v1"
//!   OPENAI_MODEL         : overrides the configured generation model
//!   SUPABASE_URL         : project URL, enables the Supabase backend together with
//!   SUPABASE_SERVICE_KEY : service role key
//!   MENTOR_CONFIG_PATH   : path to TOML config (prompt template, generation, storage names)
//!   STATIC_DIR           : frontend directory (default "./static")
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod store;
mod openai;
mod parse;
mod generate;
mod quiz;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Storage backend, completion model and config, all chosen from env.
  let state = Arc::new(AppState::from_env());

  let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string());
  let app = build_router(state, &static_dir);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "nurse_mentor", %addr, %static_dir, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "nurse_mentor", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "nurse_mentor", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "nurse_mentor", "Shutdown requested");
}
