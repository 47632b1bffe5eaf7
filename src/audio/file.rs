use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::info;

use super::backend::InputSource;

/// A WAV file loaded into memory (e.g. a captured microphone track)
///
/// Samples are normalized to `f32` in [-1.0, 1.0] and stay interleaved.
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read float samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read integer samples")?
            }
        };

        let channels = spec.channels.max(1);
        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * channels as f64);

        info!(
            "Microphone file loaded: {} ({:.1}s, {}Hz, {} channels, {}-bit)",
            path.display(),
            duration_seconds,
            spec.sample_rate,
            channels,
            spec.bits_per_sample
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels,
            samples,
        })
    }

    /// Mono samples (channels averaged)
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels as usize;
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    /// Adapt this file as a live input for a mix destination
    pub fn into_input(self) -> FileInput {
        FileInput {
            name: self.path.clone(),
            sample_rate: self.sample_rate,
            samples: self.to_mono(),
            position: 0,
        }
    }
}

/// Plays a decoded file into a destination, once, then goes silent
pub struct FileInput {
    name: String,
    sample_rate: u32,
    samples: Vec<f32>,
    position: usize,
}

impl FileInput {
    pub fn new(name: impl Into<String>, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            samples,
            position: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl InputSource for FileInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.remaining());
        out[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        n
    }

    fn name(&self) -> &str {
        &self.name
    }
}
