//! Recognition engine.
//!
//! Wires the spectral front-end, peak picker and fingerprint generator around
//! a shared index. Ingests and queries may run concurrently from any thread:
//! all per-call state is owned, and the index sits behind a single-writer /
//! many-reader lock. Fingerprints are computed in full before the write lock
//! is taken, so a concurrent reader observes each ingest all-or-nothing.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod matcher;
pub mod peaks;
pub mod spectrogram;

pub use self::config::EngineConfig;
pub use self::error::EngineError;
pub use self::matcher::Confidence;

use self::fingerprint::Fingerprint;
use self::index::{FingerprintIndex, TrackId};
use self::spectrogram::Spectrogram;

pub struct Engine {
    config: EngineConfig,
    index: RwLock<FingerprintIndex>,
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub track_id: TrackId,
    pub fingerprint_count: usize,
}

/// Recognition outcome. A query that hits nothing is still a success.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched(MatchedTrack),
    NoMatch { score: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedTrack {
    pub track_id: TrackId,
    pub name: String,
    pub offset_frames: i64,
    /// Clip-start position within the matched track. Can go slightly negative
    /// when the query starts inside the edge padding.
    pub offset_seconds: f64,
    pub score: u32,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub track_id: TrackId,
    pub name: String,
    pub fingerprint_count: usize,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub track_count: usize,
    pub hash_count: u64,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    config: &'a EngineConfig,
    index: &'a FingerprintIndex,
}

#[derive(Deserialize)]
struct Snapshot {
    config: EngineConfig,
    index: FingerprintIndex,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            index: RwLock::new(FingerprintIndex::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fingerprint audio and file it under `name`.
    pub fn ingest(
        &self,
        name: &str,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<IngestReceipt, EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidInput(
                "track name must not be empty".to_string(),
            ));
        }

        let fingerprints = self.fingerprint_samples(samples, sample_rate)?;
        let duration = samples.len() as f64 / sample_rate as f64;

        let mut index = self.index.write();
        let track_id = index.insert(name.to_string(), &fingerprints, Some(duration));

        Ok(IngestReceipt {
            track_id,
            fingerprint_count: fingerprints.len(),
        })
    }

    /// Identify a clip against everything ingested so far.
    pub fn recognize(&self, samples: &[f32], sample_rate: u32) -> Result<MatchResult, EngineError> {
        let query = self.fingerprint_samples(samples, sample_rate)?;

        let index = self.index.read();
        match matcher::best_alignment(&query, &index) {
            Some((track_id, offset, score)) if score >= matcher::LOW_SCORE => {
                let meta = index.track(track_id).ok_or_else(|| {
                    EngineError::CorruptIndex(format!(
                        "posting references unknown track {}",
                        track_id.0
                    ))
                })?;
                let offset_seconds =
                    offset as f64 * self.config.hop() as f64 / self.config.sample_rate as f64;
                Ok(MatchResult::Matched(MatchedTrack {
                    track_id,
                    name: meta.name.clone(),
                    offset_frames: offset,
                    offset_seconds,
                    score,
                    confidence: Confidence::from_score(score),
                }))
            }
            Some((_, _, score)) => Ok(MatchResult::NoMatch { score }),
            None => Ok(MatchResult::NoMatch { score: 0 }),
        }
    }

    pub fn list_tracks(&self) -> Vec<TrackSummary> {
        let index = self.index.read();
        index
            .tracks()
            .map(|(track_id, meta)| TrackSummary {
                track_id,
                name: meta.name.clone(),
                fingerprint_count: meta.fingerprint_count,
                duration_seconds: meta.duration_seconds,
            })
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        let index = self.index.read();
        IndexStats {
            track_count: index.track_count(),
            hash_count: index.hash_count(),
        }
    }

    /// Serialize the index (and the config it was built under) to an opaque
    /// byte blob.
    pub fn snapshot(&self) -> Result<Vec<u8>, EngineError> {
        let index = self.index.read();
        serde_json::to_vec(&SnapshotRef {
            config: &self.config,
            index: &index,
        })
        .map_err(|e| EngineError::CorruptIndex(format!("snapshot encode failed: {e}")))
    }

    /// Rebuild an engine from a snapshot. The snapshot must have been taken
    /// under the same configuration, and its bookkeeping must be internally
    /// consistent.
    pub fn restore(config: EngineConfig, bytes: &[u8]) -> Result<Self, EngineError> {
        config.validate()?;

        let snapshot: Snapshot = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::CorruptIndex(format!("snapshot decode failed: {e}")))?;
        if snapshot.config != config {
            return Err(EngineError::CorruptIndex(
                "snapshot was built under a different configuration".to_string(),
            ));
        }
        snapshot.index.verify()?;

        Ok(Self {
            config,
            index: RwLock::new(snapshot.index),
        })
    }

    /// The pure transform chain: spectrogram, peaks, anchor-target pairs.
    /// Touches no shared state.
    fn fingerprint_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Vec<Fingerprint>, EngineError> {
        if sample_rate != self.config.sample_rate {
            return Err(EngineError::InvalidInput(format!(
                "sample rate {} does not match engine rate {}",
                sample_rate, self.config.sample_rate
            )));
        }

        let spec = Spectrogram::compute(samples, &self.config)?;
        let peaks = peaks::find_peaks(&spec, &self.config);
        Ok(fingerprint::generate(peaks, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    const SR: u32 = 44_100;

    /// Harmonic sweep over a noise bed: spectrally rich enough that every
    /// band yields peaks, fully determined by the seed.
    fn rich_signal(seed: u64, seconds: f64) -> Vec<f32> {
        let len = (seconds * SR as f64) as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        let f0 = 200.0;
        let f1 = 2000.0;

        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let t = i as f64 / SR as f64;
            let phase = 2.0 * PI * (f0 * t + 0.5 * (f1 - f0) * t * t / seconds);
            let mut v = 0.0;
            for (h, amp) in [(1.0, 0.10), (2.0, 0.07), (3.0, 0.05), (5.0, 0.03)] {
                v += amp * (phase * h).sin();
            }
            v += (rng.gen::<f64>() - 0.5) * 0.6;
            out.push(v as f32);
        }
        out
    }

    /// Stationary tone mixture over a noise bed.
    fn tone_mixture(seed: u64, seconds: f64) -> Vec<f32> {
        let len = (seconds * SR as f64) as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        let tones = [440.0, 1230.0, 2770.0, 5010.0, 9300.0];

        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let t = i as f64 / SR as f64;
            let mut v = 0.0;
            for (k, freq) in tones.iter().enumerate() {
                v += 0.08 / (k + 1) as f64 * (2.0 * PI * freq * t).sin();
            }
            v += (rng.gen::<f64>() - 0.5) * 0.6;
            out.push(v as f32);
        }
        out
    }

    /// Descending sweep, structurally unrelated to `rich_signal`.
    fn falling_signal(seed: u64, seconds: f64) -> Vec<f32> {
        let len = (seconds * SR as f64) as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        let f0 = 3000.0;
        let f1 = 300.0;

        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let t = i as f64 / SR as f64;
            let phase = 2.0 * PI * (f0 * t + 0.5 * (f1 - f0) * t * t / seconds);
            let mut v = 0.0;
            for (h, amp) in [(1.0, 0.10), (2.0, 0.06), (4.0, 0.04)] {
                v += amp * (phase * h).sin();
            }
            v += (rng.gen::<f64>() - 0.5) * 0.6;
            out.push(v as f32);
        }
        out
    }

    fn white_noise(seed: u64, seconds: f64) -> Vec<f32> {
        let len = (seconds * SR as f64) as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen::<f32>() - 0.5).collect()
    }

    /// Cut a clip starting on an exact hop boundary so the expected offset is
    /// a whole frame count.
    fn hop_aligned_clip(track: &[f32], engine: &Engine, start_frame: usize, seconds: f64) -> Vec<f32> {
        let start = start_frame * engine.config().hop();
        let len = (seconds * SR as f64) as usize;
        track[start..start + len].to_vec()
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn clip_is_located_at_its_true_position() {
        let engine = engine();
        let track = rich_signal(42, 60.0);
        engine.ingest("chirp", &track, SR).unwrap();

        // ~30s in, on a hop boundary
        let start_frame = 2583;
        let clip = hop_aligned_clip(&track, &engine, start_frame, 6.0);

        let result = engine.recognize(&clip, SR).unwrap();
        let MatchResult::Matched(m) = result else {
            panic!("expected a match");
        };
        assert_eq!(m.name, "chirp");
        assert!((m.offset_frames - start_frame as i64).abs() <= 1);
        let expected_seconds = start_frame as f64 * 512.0 / SR as f64;
        assert!((m.offset_seconds - expected_seconds).abs() < 0.05);
        assert!(m.score >= matcher::MEDIUM_SCORE, "score {}", m.score);
        assert!(m.confidence >= Confidence::Medium);
    }

    #[test]
    fn identification_does_not_depend_on_clip_position() {
        let engine = engine();
        let track = rich_signal(7, 40.0);
        let receipt = engine.ingest("shifting", &track, SR).unwrap();

        for start_frame in [430, 1290, 2150] {
            let clip = hop_aligned_clip(&track, &engine, start_frame, 6.0);
            let result = engine.recognize(&clip, SR).unwrap();
            let MatchResult::Matched(m) = result else {
                panic!("clip at frame {start_frame} did not match");
            };
            assert_eq!(m.track_id, receipt.track_id);
            assert!((m.offset_frames - start_frame as i64).abs() <= 1);
        }
    }

    #[test]
    fn clip_matches_its_own_track_not_a_sibling() {
        let engine = engine();
        let a = white_noise(7, 30.0);
        let b = tone_mixture(8, 30.0);
        engine.ingest("A", &a, SR).unwrap();
        let receipt_b = engine.ingest("B", &b, SR).unwrap();

        let clip = hop_aligned_clip(&b, &engine, 861, 6.0); // ~10s in
        let result = engine.recognize(&clip, SR).unwrap();
        let MatchResult::Matched(m) = result else {
            panic!("expected a match");
        };
        assert_eq!(m.track_id, receipt_b.track_id);
        assert_eq!(m.name, "B");
    }

    #[test]
    fn unknown_audio_is_not_matched() {
        let engine = engine();
        engine.ingest("A", &white_noise(1, 60.0), SR).unwrap();

        let unknown = white_noise(99, 6.0);
        let result = engine.recognize(&unknown, SR).unwrap();
        let MatchResult::NoMatch { score } = result else {
            panic!("independent noise should not match");
        };
        assert!(score < matcher::LOW_SCORE);
    }

    #[test]
    fn empty_query_is_invalid_input() {
        let engine = engine();
        engine.ingest("A", &rich_signal(3, 10.0), SR).unwrap();

        let err = engine.recognize(&[], SR).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn sample_rate_mismatch_is_invalid_input() {
        let engine = engine();
        let err = engine.ingest("x", &rich_signal(3, 2.0), 22_050).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn three_tracks_all_resolve_correctly() {
        let engine = engine();
        let tracks = [
            ("alpha", rich_signal(11, 30.0)),
            ("beta", tone_mixture(22, 30.0)),
            ("gamma", falling_signal(33, 30.0)),
        ];
        let mut ids = Vec::new();
        for (name, samples) in &tracks {
            ids.push(engine.ingest(name, samples, SR).unwrap().track_id);
        }

        for (i, (name, samples)) in tracks.iter().enumerate() {
            let clip = hop_aligned_clip(samples, &engine, 861, 6.0);
            let result = engine.recognize(&clip, SR).unwrap();
            let MatchResult::Matched(m) = result else {
                panic!("{name} clip did not match");
            };
            assert_eq!(m.track_id, ids[i], "clip of {name} matched {}", m.name);
            assert!(m.score >= matcher::MEDIUM_SCORE, "{name} score {}", m.score);
        }
    }

    #[test]
    fn ingest_receipt_and_stats_agree() {
        let engine = engine();
        let receipt = engine.ingest("one", &rich_signal(5, 10.0), SR).unwrap();
        assert!(receipt.fingerprint_count > 0);

        let stats = engine.stats();
        assert_eq!(stats.track_count, 1);
        assert_eq!(stats.hash_count, receipt.fingerprint_count as u64);

        let listed = engine.list_tracks();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "one");
        assert_eq!(listed[0].fingerprint_count, receipt.fingerprint_count);
        let duration = listed[0].duration_seconds.unwrap();
        assert!((duration - 10.0).abs() < 0.01);
    }

    #[test]
    fn fingerprints_honor_the_configured_bounds() {
        let engine = engine();
        let samples = rich_signal(17, 8.0);
        let fps = engine.fingerprint_samples(&samples, SR).unwrap();
        assert!(!fps.is_empty());

        let config = engine.config();
        for fp in &fps {
            assert!((fp.dt as usize) >= config.dt_min);
            assert!((fp.dt as usize) <= config.dt_max_frames());
            assert!((fp.f1 as usize) < config.bins());
            assert!((fp.f2 as usize) < config.bins());
        }

        // at most `fanout` pairs per anchor cell
        let mut per_anchor: std::collections::HashMap<(u32, u16), usize> =
            std::collections::HashMap::new();
        for fp in &fps {
            *per_anchor.entry((fp.t1, fp.f1)).or_insert(0) += 1;
        }
        assert!(per_anchor.values().all(|&n| n <= config.fanout));
    }

    #[test]
    fn peaks_honor_the_amplitude_floor() {
        let engine = engine();
        let samples = rich_signal(19, 5.0);
        let spec = Spectrogram::compute(&samples, engine.config()).unwrap();
        let found = peaks::find_peaks(&spec, engine.config());

        assert!(!found.is_empty());
        for p in &found {
            assert!(p.amplitude_db >= engine.config().amplitude_threshold_db);
        }
    }

    #[test]
    fn equal_ingests_build_equal_indexes() {
        let samples = rich_signal(23, 10.0);

        let a = engine();
        let b = engine();
        a.ingest("same", &samples, SR).unwrap();
        b.ingest("same", &samples, SR).unwrap();

        assert_eq!(*a.index.read(), *b.index.read());
    }

    #[test]
    fn snapshot_restore_preserves_the_index() {
        let engine = engine();
        engine.ingest("one", &rich_signal(29, 10.0), SR).unwrap();
        engine.ingest("two", &tone_mixture(31, 10.0), SR).unwrap();

        let bytes = engine.snapshot().unwrap();
        let restored = Engine::restore(EngineConfig::default(), &bytes).unwrap();

        assert_eq!(*restored.index.read(), *engine.index.read());
        assert_eq!(restored.stats(), engine.stats());
        assert_eq!(restored.list_tracks(), engine.list_tracks());
    }

    #[test]
    fn restore_rejects_garbage_and_foreign_configs() {
        assert!(matches!(
            Engine::restore(EngineConfig::default(), b"not a snapshot"),
            Err(EngineError::CorruptIndex(_))
        ));

        let engine = engine();
        engine.ingest("one", &rich_signal(37, 5.0), SR).unwrap();
        let bytes = engine.snapshot().unwrap();

        let other = EngineConfig {
            num_bands: 8,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::restore(other, &bytes),
            Err(EngineError::CorruptIndex(_))
        ));
    }

    #[test]
    fn restored_engine_still_recognizes() {
        let engine = engine();
        let track = rich_signal(41, 30.0);
        engine.ingest("persisted", &track, SR).unwrap();

        let bytes = engine.snapshot().unwrap();
        let restored = Engine::restore(EngineConfig::default(), &bytes).unwrap();

        let clip = hop_aligned_clip(&track, &restored, 861, 6.0);
        let result = restored.recognize(&clip, SR).unwrap();
        let MatchResult::Matched(m) = result else {
            panic!("restored engine failed to match");
        };
        assert_eq!(m.name, "persisted");
    }
}
