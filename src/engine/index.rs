//! In-memory fingerprint index.
//!
//! Maps packed hash keys to postings of `(track, anchor frame)`, with a side
//! table interning track names to dense ids. Insertion is append-only;
//! duplicate names and duplicate postings are permitted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;
use crate::engine::fingerprint::Fingerprint;

/// Interned track identifier, dense from 0 in ingest order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub name: String,
    pub fingerprint_count: usize,
    pub duration_seconds: Option<f64>,
}

/// One stored occurrence of a hash key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub track: TrackId,
    pub t1: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintIndex {
    buckets: HashMap<u64, Vec<Posting>>,
    tracks: Vec<TrackMeta>,
    posting_count: u64,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name` as a fresh track and append one posting per fingerprint.
    ///
    /// Re-using a name mints a new id; the old track keeps its postings.
    pub fn insert(
        &mut self,
        name: String,
        fingerprints: &[Fingerprint],
        duration_seconds: Option<f64>,
    ) -> TrackId {
        let track = TrackId(self.tracks.len() as u32);
        self.tracks.push(TrackMeta {
            name,
            fingerprint_count: fingerprints.len(),
            duration_seconds,
        });

        for fp in fingerprints {
            self.buckets.entry(fp.key()).or_default().push(Posting {
                track,
                t1: fp.t1,
            });
        }
        self.posting_count += fingerprints.len() as u64;

        track
    }

    /// All postings stored under `key`, in insertion order.
    pub fn probe(&self, key: u64) -> &[Posting] {
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn track(&self, id: TrackId) -> Option<&TrackMeta> {
        self.tracks.get(id.0 as usize)
    }

    pub fn tracks(&self) -> impl Iterator<Item = (TrackId, &TrackMeta)> + '_ {
        self.tracks
            .iter()
            .enumerate()
            .map(|(i, meta)| (TrackId(i as u32), meta))
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Total stored postings. Grows by exactly the fingerprint count of each
    /// insert.
    pub fn hash_count(&self) -> u64 {
        self.posting_count
    }

    /// Cross-check the redundant bookkeeping against the buckets.
    ///
    /// Run on every restored snapshot before it is trusted.
    pub fn verify(&self) -> Result<(), EngineError> {
        let mut per_track = vec![0u64; self.tracks.len()];
        let mut total = 0u64;

        for (key, postings) in &self.buckets {
            for posting in postings {
                match per_track.get_mut(posting.track.0 as usize) {
                    Some(slot) => *slot += 1,
                    None => {
                        return Err(EngineError::CorruptIndex(format!(
                            "hash {key:#x} references unknown track {}",
                            posting.track.0
                        )))
                    }
                }
                total += 1;
            }
        }

        if total != self.posting_count {
            return Err(EngineError::CorruptIndex(format!(
                "posting count mismatch: counted {total}, recorded {}",
                self.posting_count
            )));
        }

        for (i, meta) in self.tracks.iter().enumerate() {
            if per_track[i] != meta.fingerprint_count as u64 {
                return Err(EngineError::CorruptIndex(format!(
                    "track {i} ({}) has {} postings, metadata claims {}",
                    meta.name, per_track[i], meta.fingerprint_count
                )));
            }
        }

        Ok(())
    }
}
