//! HTTP route handlers for the recognition service.
//!
//! Thin glue over the engine: multipart extraction in, JSON out. All
//! CPU-bound work runs on the blocking pool.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::audio;
use crate::engine::{IngestReceipt, MatchResult};
use crate::persist;
use crate::server::AppState;

#[derive(Serialize)]
pub struct AddSongResponse {
    success: bool,
    track_id: u32,
    song_name: String,
    fingerprints_count: usize,
    message: String,
}

#[derive(Serialize)]
pub struct RecognitionResponse {
    matched: bool,
    song: Option<String>,
    position_in_song: Option<String>,
    confidence: Option<String>,
    raw_score: u32,
    message: Option<String>,
}

#[derive(Serialize)]
pub struct SongEntry {
    track_id: u32,
    name: String,
    fingerprints_count: usize,
    duration_seconds: Option<f64>,
}

#[derive(Serialize)]
pub struct SongsListResponse {
    songs: Vec<SongEntry>,
    total_songs: usize,
    total_hashes: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    songs_count: usize,
    hashes_count: u64,
}

type HandlerError = (StatusCode, String);

/// Register a reference track. Expects multipart fields `name` and `file`.
pub async fn add_song(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<AddSongResponse>, HandlerError> {
    let upload = read_upload(multipart).await?;
    let song_name = upload
        .name
        .ok_or_else(|| bad_request("missing `name` field"))?;
    let audio_bytes = upload
        .file
        .ok_or_else(|| bad_request("missing `file` field"))?;

    let task_state = state.clone();
    let task_name = song_name.clone();
    let receipt = tokio::task::spawn_blocking(move || -> anyhow::Result<IngestReceipt> {
        let rate = task_state.engine.config().sample_rate;
        let samples = audio::load_samples(&audio_bytes, rate)?;
        let receipt = task_state.engine.ingest(&task_name, &samples, rate)?;
        if let Some(path) = &task_state.index_path {
            persist::save(&task_state.engine, path)?;
        }
        Ok(receipt)
    })
    .await
    .map_err(internal)?
    .map_err(bad_request)?;

    tracing::info!(
        song = %song_name,
        fingerprints = receipt.fingerprint_count,
        "ingested track"
    );

    Ok(Json(AddSongResponse {
        success: true,
        track_id: receipt.track_id.0,
        song_name: song_name.clone(),
        fingerprints_count: receipt.fingerprint_count,
        message: format!("Successfully added {song_name}"),
    }))
}

/// Identify an uploaded clip. Expects a multipart field `file`.
pub async fn recognize_song(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<RecognitionResponse>, HandlerError> {
    let upload = read_upload(multipart).await?;
    let audio_bytes = upload
        .file
        .ok_or_else(|| bad_request("missing `file` field"))?;

    let task_state = state.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<MatchResult> {
        let rate = task_state.engine.config().sample_rate;
        let samples = audio::load_samples(&audio_bytes, rate)?;
        Ok(task_state.engine.recognize(&samples, rate)?)
    })
    .await
    .map_err(internal)?
    .map_err(bad_request)?;

    let response = match result {
        MatchResult::Matched(m) => RecognitionResponse {
            matched: true,
            song: Some(m.name),
            position_in_song: Some(seconds_to_mmss(m.offset_seconds)),
            confidence: Some(m.confidence.label().to_string()),
            raw_score: m.score,
            message: None,
        },
        MatchResult::NoMatch { score } => RecognitionResponse {
            matched: false,
            song: None,
            position_in_song: None,
            confidence: None,
            raw_score: score,
            message: Some("No matching song detected".to_string()),
        },
    };

    Ok(Json(response))
}

pub async fn list_songs(State(state): State<Arc<AppState>>) -> Json<SongsListResponse> {
    let songs: Vec<SongEntry> = state
        .engine
        .list_tracks()
        .into_iter()
        .map(|track| SongEntry {
            track_id: track.track_id.0,
            name: track.name,
            fingerprints_count: track.fingerprint_count,
            duration_seconds: track.duration_seconds,
        })
        .collect();
    let stats = state.engine.stats();

    Json(SongsListResponse {
        total_songs: songs.len(),
        total_hashes: stats.hash_count,
        songs,
    })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.engine.stats();
    Json(HealthResponse {
        status: "healthy",
        songs_count: stats.track_count,
        hashes_count: stats.hash_count,
    })
}

struct Upload {
    name: Option<String>,
    file: Option<Vec<u8>>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, HandlerError> {
    let mut upload = Upload {
        name: None,
        file: None,
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => upload.name = Some(field.text().await.map_err(bad_request)?),
            "file" => upload.file = Some(field.bytes().await.map_err(bad_request)?.to_vec()),
            _ => {}
        }
    }

    Ok(upload)
}

/// Render a clip-start position as `M:SS`, whole seconds, sign dropped.
fn seconds_to_mmss(seconds: f64) -> String {
    let total = seconds.abs().floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn bad_request<E: std::fmt::Display>(err: E) -> HandlerError {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn internal<E: std::fmt::Display>(err: E) -> HandlerError {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_render_as_minutes_and_seconds() {
        assert_eq!(seconds_to_mmss(0.0), "0:00");
        assert_eq!(seconds_to_mmss(9.99), "0:09");
        assert_eq!(seconds_to_mmss(61.0), "1:01");
        assert_eq!(seconds_to_mmss(154.9), "2:34");
        // padding can push the reported start slightly negative
        assert_eq!(seconds_to_mmss(-0.4), "0:00");
    }
}
