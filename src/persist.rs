//! Index snapshot persistence.
//!
//! The engine's snapshot format is opaque; this module only moves it between
//! the engine and a file. Loaded at boot, written after every ingest.

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::engine::{Engine, EngineConfig};

/// Restore an engine from `path` if a snapshot exists there, otherwise start
/// empty.
pub fn load_or_create(path: &Path, config: EngineConfig) -> anyhow::Result<Engine> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no index snapshot, starting empty");
        return Ok(Engine::new(config)?);
    }

    let bytes = fs::read(path)
        .with_context(|| format!("reading index snapshot {}", path.display()))?;
    let engine = Engine::restore(config, &bytes)?;

    let stats = engine.stats();
    tracing::info!(
        path = %path.display(),
        tracks = stats.track_count,
        hashes = stats.hash_count,
        "loaded index snapshot"
    );
    Ok(engine)
}

/// Write the engine's snapshot to `path`.
///
/// Writes a sibling temp file first and renames it over the target, so a
/// crash mid-write leaves the previous snapshot intact.
pub fn save(engine: &Engine, path: &Path) -> anyhow::Result<()> {
    let bytes = engine.snapshot()?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)
        .with_context(|| format!("writing index snapshot {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("replacing index snapshot {}", path.display()))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved index snapshot");
    Ok(())
}
