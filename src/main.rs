//! Recognition service binary.
//!
//! Restores the fingerprint index from disk when present, then serves the
//! HTTP API until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use resound::engine::EngineConfig;
use resound::server::{self, AppState};
use resound::persist;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let index_path: PathBuf = std::env::var("RESOUND_INDEX")
        .unwrap_or_else(|_| "fingerprint_index.json".to_string())
        .into();
    let addr = std::env::var("RESOUND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let engine = persist::load_or_create(&index_path, EngineConfig::default())?;
    let state = Arc::new(AppState {
        engine,
        index_path: Some(index_path),
    });

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "serving recognition api");
    axum::serve(listener, app).await?;

    Ok(())
}
