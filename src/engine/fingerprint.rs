//! Anchor-target fingerprint generation.

use crate::engine::config::EngineConfig;
use crate::engine::peaks::Peak;

/// One anchor-target pair plus the absolute anchor frame.
///
/// `(f1, f2, dt)` is the lookup key; `t1` travels alongside as the posting
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub f1: u16,
    pub f2: u16,
    pub dt: u16,
    pub t1: u32,
}

impl Fingerprint {
    /// Pack the hash triple into a single index key.
    pub fn key(&self) -> u64 {
        ((self.f1 as u64) << 32) | ((self.f2 as u64) << 16) | self.dt as u64
    }
}

/// Pair every peak with up to `fanout` later peaks within the configured
/// frame-delta window.
///
/// Peaks are scanned in `(time, freq)` order, so once a candidate target falls
/// past `dt_max_frames` no later one can qualify and the anchor is done.
/// Coincident duplicate pairs are kept; voting is count-weighted.
pub fn generate(mut peaks: Vec<Peak>, config: &EngineConfig) -> Vec<Fingerprint> {
    peaks.sort_by_key(|p| (p.time, p.freq));

    let dt_min = config.dt_min;
    let dt_max = config.dt_max_frames();
    let mut fingerprints = Vec::new();

    for (i, anchor) in peaks.iter().enumerate() {
        let mut emitted = 0usize;

        for target in &peaks[i + 1..] {
            let dt = target.time - anchor.time;
            if dt < dt_min {
                continue;
            }
            if dt > dt_max {
                break;
            }

            fingerprints.push(Fingerprint {
                f1: anchor.freq as u16,
                f2: target.freq as u16,
                dt: dt as u16,
                t1: anchor.time as u32,
            });

            emitted += 1;
            if emitted >= config.fanout {
                break;
            }
        }
    }

    fingerprints
}
