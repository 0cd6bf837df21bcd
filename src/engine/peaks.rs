//! Constellation peak picking.
//!
//! Selects cells that dominate a rectangular time-frequency neighborhood,
//! picked independently per frequency band so a loud bass line cannot starve
//! the rest of the spectrum.

use std::collections::VecDeque;

use crate::engine::config::EngineConfig;
use crate::engine::spectrogram::Spectrogram;

/// A locally dominant spectrogram cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Time frame index.
    pub time: usize,
    /// Frequency bin index.
    pub freq: usize,
    /// dB value, relative to the grid maximum.
    pub amplitude_db: f32,
}

/// Find all peaks of `spec`: cells that equal the maximum of their
/// `±freq_neighborhood x ±time_neighborhood` window (clipped to their band and
/// the grid) and sit at or above the amplitude floor.
///
/// Cells tied with their neighborhood maximum are all accepted.
pub fn find_peaks(spec: &Spectrogram, config: &EngineConfig) -> Vec<Peak> {
    let num_frames = spec.num_frames();
    let bins = spec.bins();
    if num_frames == 0 || bins == 0 {
        return Vec::new();
    }

    let num_bands = config.num_bands.min(bins);
    let band_size = bins / num_bands;
    let mut peaks = Vec::new();

    for band in 0..num_bands {
        let f_start = band * band_size;
        let f_end = if band == num_bands - 1 {
            bins
        } else {
            (band + 1) * band_size
        };
        find_band_peaks(spec, config, f_start, f_end, &mut peaks);
    }

    peaks
}

/// Peak test within one band. The rectangular maximum filter is separable, so
/// it runs as a frequency-direction pass followed by a time-direction pass,
/// each a linear sliding-window maximum.
fn find_band_peaks(
    spec: &Spectrogram,
    config: &EngineConfig,
    f_start: usize,
    f_end: usize,
    peaks: &mut Vec<Peak>,
) {
    let num_frames = spec.num_frames();
    let width = f_end - f_start;

    // per-frame maxima over the frequency window, band-clipped
    let freq_max: Vec<Vec<f32>> = (0..num_frames)
        .map(|t| sliding_max(&spec.frame(t)[f_start..f_end], config.freq_neighborhood))
        .collect();

    let threshold = config.amplitude_threshold_db;
    let mut column = vec![0.0f32; num_frames];

    for rel in 0..width {
        for (t, row) in freq_max.iter().enumerate() {
            column[t] = row[rel];
        }
        let window_max = sliding_max(&column, config.time_neighborhood);

        for t in 0..num_frames {
            let value = spec.value(t, f_start + rel);
            if value >= threshold && value == window_max[t] {
                peaks.push(Peak {
                    time: t,
                    freq: f_start + rel,
                    amplitude_db: value,
                });
            }
        }
    }
}

/// Maximum of `values` over a window of `±radius` around each position,
/// clipped at the ends. Monotonic-deque scan, O(len).
fn sliding_max(values: &[f32], radius: usize) -> Vec<f32> {
    let len = values.len();
    let mut out = Vec::with_capacity(len);
    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut next = 0usize;

    for i in 0..len {
        let hi = (i + radius).min(len - 1);
        while next <= hi {
            while let Some(&back) = deque.back() {
                if values[back] <= values[next] {
                    deque.pop_back();
                } else {
                    break;
                }
            }
            deque.push_back(next);
            next += 1;
        }

        let lo = i.saturating_sub(radius);
        while let Some(&front) = deque.front() {
            if front < lo {
                deque.pop_front();
            } else {
                break;
            }
        }

        match deque.front() {
            Some(&front) => out.push(values[front]),
            None => out.push(values[i]),
        }
    }

    out
}
