//! Offset-histogram matching.
//!
//! A true match aligns query frames to database frames at exactly one offset,
//! so its votes pile into a single `(track, offset)` bin while chance hash
//! collisions scatter across offsets.

use std::collections::HashMap;

use crate::engine::fingerprint::Fingerprint;
use crate::engine::index::{FingerprintIndex, TrackId};

/// Scores below this never count as a match.
pub const LOW_SCORE: u32 = 200;
pub const MEDIUM_SCORE: u32 = 1000;
pub const HIGH_SCORE: u32 = 3000;

/// Coarse bucket for a winning bin's vote count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    NoMatch,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_score(score: u32) -> Self {
        if score >= HIGH_SCORE {
            Confidence::High
        } else if score >= MEDIUM_SCORE {
            Confidence::Medium
        } else if score >= LOW_SCORE {
            Confidence::Low
        } else {
            Confidence::NoMatch
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Confidence::NoMatch => "No match",
            Confidence::Low => "Low confidence",
            Confidence::Medium => "Medium confidence",
            Confidence::High => "High confidence",
        }
    }
}

/// The winning histogram bin: `(track, offset in frames, vote count)`.
///
/// Returns `None` when no query hash hits the index at all. Ties on the vote
/// count resolve to the smallest `(track, offset)` pair so equal inputs always
/// produce equal answers.
pub fn best_alignment(
    query: &[Fingerprint],
    index: &FingerprintIndex,
) -> Option<(TrackId, i64, u32)> {
    let mut votes: HashMap<(TrackId, i64), u32> = HashMap::new();

    for fp in query {
        for posting in index.probe(fp.key()) {
            let offset = posting.t1 as i64 - fp.t1 as i64;
            *votes.entry((posting.track, offset)).or_insert(0) += 1;
        }
    }

    let mut best: Option<((TrackId, i64), u32)> = None;
    for (bin, count) in votes {
        let better = match best {
            None => true,
            Some((best_bin, best_count)) => {
                count > best_count || (count == best_count && bin < best_bin)
            }
        };
        if better {
            best = Some((bin, count));
        }
    }

    best.map(|((track, offset), count)| (track, offset, count))
}
