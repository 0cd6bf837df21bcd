//! Router wiring for the recognition API.

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::engine::Engine;
use crate::routes;

/// State shared across handlers: the engine plus the snapshot location.
pub struct AppState {
    pub engine: Engine,
    /// Where to persist the index after each ingest; `None` disables saving.
    pub index_path: Option<PathBuf>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/songs/add", post(routes::add_song))
        .route("/songs/recognize", post(routes::recognize_song))
        .route("/songs/list", get(routes::list_songs))
        .route("/health", get(routes::health))
        .with_state(state)
}
