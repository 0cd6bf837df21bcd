use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;

/// Fingerprinting parameters, fixed at engine construction.
///
/// An index is only meaningful together with the exact configuration it was
/// built under; changing any value requires re-ingesting every track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Audio sample rate in Hz expected at the engine boundary.
    pub sample_rate: u32,
    /// STFT window length in samples.
    pub n_fft: usize,
    /// Hop length is `n_fft / hop_ratio`.
    pub hop_ratio: usize,
    /// Peak picker neighborhood radius along the frequency axis, in bins.
    pub freq_neighborhood: usize,
    /// Peak picker neighborhood radius along the time axis, in frames.
    pub time_neighborhood: usize,
    /// Peak floor in dB, relative to the loudest spectrogram cell.
    pub amplitude_threshold_db: f32,
    /// Number of frequency bands peaks are distributed across.
    pub num_bands: usize,
    /// Maximum target peaks paired with a single anchor.
    pub fanout: usize,
    /// Minimum anchor-to-target distance in frames.
    pub dt_min: usize,
    /// Maximum anchor-to-target span in seconds.
    pub dt_max_seconds: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            n_fft: 2048,
            hop_ratio: 4,
            freq_neighborhood: 20,
            time_neighborhood: 20,
            amplitude_threshold_db: -35.0,
            num_bands: 6,
            fanout: 10,
            dt_min: 2,
            dt_max_seconds: 2.0,
        }
    }
}

impl EngineConfig {
    /// STFT hop length in samples.
    pub fn hop(&self) -> usize {
        self.n_fft / self.hop_ratio
    }

    /// Number of frequency bins per STFT frame.
    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// `dt_max_seconds` converted to whole frames.
    pub fn dt_max_frames(&self) -> usize {
        (self.dt_max_seconds as f64 * self.sample_rate as f64 / self.hop() as f64).floor() as usize
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate must be positive"));
        }
        if self.n_fft < 2 || !self.n_fft.is_power_of_two() {
            return Err(invalid("n_fft must be a power of two, at least 2"));
        }
        if self.hop_ratio == 0 || self.hop_ratio > self.n_fft {
            return Err(invalid("hop_ratio must be in 1..=n_fft"));
        }
        if self.num_bands == 0 {
            return Err(invalid("num_bands must be positive"));
        }
        if self.fanout == 0 {
            return Err(invalid("fanout must be positive"));
        }
        if self.dt_max_seconds <= 0.0 {
            return Err(invalid("dt_max_seconds must be positive"));
        }
        if self.dt_max_frames() < self.dt_min {
            return Err(invalid("dt_max_seconds spans fewer frames than dt_min"));
        }
        // hash keys pack f1/f2/dt into 16 bits each
        if self.bins() > u16::MAX as usize + 1 {
            return Err(invalid("n_fft produces more frequency bins than a hash key can hold"));
        }
        if self.dt_max_frames() > u16::MAX as usize {
            return Err(invalid("dt_max_seconds spans more frames than a hash key can hold"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> EngineError {
    EngineError::InvalidInput(msg.to_string())
}
