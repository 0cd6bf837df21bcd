//! Spectral front-end.
//!
//! Turns a mono PCM buffer into a time-frequency magnitude grid in dB,
//! normalized so the loudest cell sits at 0 dB.

use std::f32::consts::PI;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;

/// Magnitude floor applied before the dB conversion.
const MAG_FLOOR: f32 = 1e-10;

/// Magnitude grid of `num_frames x bins` cells in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    bins: usize,
    frames: Vec<Vec<f32>>,
}

impl Spectrogram {
    /// Compute the dB spectrogram of `samples` using centered, Hann-windowed
    /// frames with reflection padding at the edges.
    pub fn compute(samples: &[f32], config: &EngineConfig) -> Result<Self, EngineError> {
        let n_fft = config.n_fft;
        let hop = config.hop();

        if samples.len() < n_fft {
            return Err(EngineError::InvalidInput(format!(
                "audio too short: {} samples, need at least {}",
                samples.len(),
                n_fft
            )));
        }

        let num_frames = samples.len() / hop + 1;
        let bins = config.bins();
        let pad = n_fft / 2;
        let window = hann_window(n_fft);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);

        let mut frames: Vec<Vec<f32>> = (0..num_frames)
            .into_par_iter()
            .map(|t| {
                let start = (t * hop) as isize - pad as isize;
                let mut buffer: Vec<Complex<f32>> = (0..n_fft)
                    .map(|i| {
                        let sample = samples[reflect(start + i as isize, samples.len())];
                        Complex {
                            re: sample * window[i],
                            im: 0.0,
                        }
                    })
                    .collect();

                fft.process(&mut buffer);

                buffer[..bins]
                    .iter()
                    .map(|c| (c.re * c.re + c.im * c.im).sqrt())
                    .collect()
            })
            .collect();

        // dB relative to the loudest cell
        let mut max_db = f32::NEG_INFINITY;
        for frame in &mut frames {
            for value in frame.iter_mut() {
                *value = 20.0 * value.max(MAG_FLOOR).log10();
                if *value > max_db {
                    max_db = *value;
                }
            }
        }
        for frame in &mut frames {
            for value in frame.iter_mut() {
                *value -= max_db;
            }
        }

        Ok(Self { bins, frames })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Magnitudes of frame `t`, one value per frequency bin.
    pub fn frame(&self, t: usize) -> &[f32] {
        &self.frames[t]
    }

    pub fn value(&self, t: usize, f: usize) -> f32 {
        self.frames[t][f]
    }

    #[cfg(test)]
    pub(crate) fn from_frames(frames: Vec<Vec<f32>>) -> Self {
        let bins = frames.first().map(Vec::len).unwrap_or(0);
        Self { bins, frames }
    }
}

/// Mirror out-of-range indices back into `0..len` without repeating the edge
/// sample. Callers never reach further than `len - 1` past either end.
fn reflect(i: isize, len: usize) -> usize {
    let last = (len - 1) as isize;
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i > last {
        i = 2 * last - i;
    }
    i as usize
}

fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1.0)).cos()))
        .collect()
}
