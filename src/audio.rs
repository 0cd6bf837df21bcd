//! Audio decode collaborator.
//!
//! Turns uploaded container bytes into mono f32 samples at the engine's
//! sample rate. The engine itself never sees encoded audio.

use std::io::Cursor;

use anyhow::{anyhow, Context};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions},
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

const RESAMPLE_CHUNK: usize = 1024;

/// Decode `bytes`, downmix to mono and resample to `target_rate`.
pub fn load_samples(bytes: &[u8], target_rate: u32) -> anyhow::Result<Vec<f32>> {
    let (samples, rate, channels) = decode(bytes)?;
    tracing::debug!(
        decoded = samples.len(),
        rate,
        channels,
        "decoded audio upload"
    );

    let mono = to_mono(&samples, channels);
    resample(&mono, rate, target_rate)
}

fn decode(bytes: &[u8]) -> anyhow::Result<(Vec<f32>, u32, usize)> {
    let cursor = Cursor::new(bytes.to_vec());
    let stream = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unsupported audio format")?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no decodable track in upload"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("track is missing a sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("track is missing a channel layout"))?
        .count();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("no decoder for track codec")?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }

        // skip undecodable packets, keep whatever else decodes
        let Ok(decoded) = decoder.decode(&packet) else {
            continue;
        };
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() {
        return Err(anyhow!("upload decoded to zero samples"));
    }

    Ok((samples, sample_rate, channels))
}

fn to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample(input: &[f32], input_rate: u32, output_rate: u32) -> anyhow::Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        oversampling_factor: 64,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        2.0,
        params,
        RESAMPLE_CHUNK,
        1,
    )
    .context("resampler construction failed")?;

    let mut output = Vec::new();
    let mut position = 0;

    while position + RESAMPLE_CHUNK <= input.len() {
        let chunk = vec![input[position..position + RESAMPLE_CHUNK].to_vec()];
        let result = resampler.process(&chunk, None)?;
        output.extend_from_slice(&result[0]);
        position += RESAMPLE_CHUNK;
    }

    let remaining = input.len() - position;
    if remaining > 0 {
        let mut padded = vec![0.0; RESAMPLE_CHUNK];
        padded[..remaining].copy_from_slice(&input[position..]);
        let result = resampler.process(&[padded], None)?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output)
}
