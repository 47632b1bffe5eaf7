use anyhow::Result;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::MediaError;

/// Default sample rate of pushed speech frames
pub const DEFAULT_FRAME_SAMPLE_RATE: u32 = 16000;

/// PCM sample encoding of a pushed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PcmEncoding {
    /// 16-bit signed little-endian integers
    #[default]
    #[serde(rename = "pcm_s16le")]
    PcmS16le,
    /// 32-bit little-endian IEEE floats
    #[serde(rename = "pcm_f32le")]
    PcmF32le,
}

impl PcmEncoding {
    /// Bytes per sample
    pub fn sample_width(self) -> usize {
        match self {
            Self::PcmS16le => 2,
            Self::PcmF32le => 4,
        }
    }
}

impl fmt::Display for PcmEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PcmS16le => write!(f, "pcm_s16le"),
            Self::PcmF32le => write!(f, "pcm_f32le"),
        }
    }
}

/// One unit of remote audio pushed for playback (mono)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw PCM payload
    pub data: Vec<u8>,
    /// Declared sample rate in Hz
    pub sample_rate: u32,
    /// Declared sample encoding
    pub encoding: PcmEncoding,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>, sample_rate: u32, encoding: PcmEncoding) -> Self {
        Self {
            data,
            sample_rate,
            encoding,
        }
    }

    /// Build an s16le frame at the default rate from integer samples
    pub fn from_i16(samples: &[i16]) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data, DEFAULT_FRAME_SAMPLE_RATE, PcmEncoding::PcmS16le)
    }

    /// Build an f32le frame from float samples
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data, sample_rate, PcmEncoding::PcmF32le)
    }

    /// Number of samples the payload holds, if it is aligned
    pub fn sample_count(&self) -> Option<usize> {
        let width = self.encoding.sample_width();
        (self.data.len() % width == 0).then(|| self.data.len() / width)
    }

    /// Nominal playback duration
    pub fn duration(&self) -> Duration {
        match self.sample_count() {
            Some(n) if self.sample_rate > 0 => {
                Duration::from_secs_f64(n as f64 / self.sample_rate as f64)
            }
            _ => Duration::ZERO,
        }
    }

    /// Convert the payload to normalized `f32` samples.
    ///
    /// s16le samples are divided by 32768 so they land in [-1.0, 1.0);
    /// f32le samples are taken as-is.
    pub fn decode(&self) -> Result<Vec<f32>> {
        if self.sample_rate == 0 {
            return Err(MediaError::MalformedFrame("sample rate is zero".to_string()).into());
        }
        if self.data.is_empty() {
            return Err(MediaError::MalformedFrame("empty payload".to_string()).into());
        }

        let width = self.encoding.sample_width();
        if self.data.len() % width != 0 {
            return Err(MediaError::MalformedFrame(format!(
                "{} bytes is not a multiple of the {}-byte {} sample width",
                self.data.len(),
                width,
                self.encoding
            ))
            .into());
        }

        let samples = match self.encoding {
            PcmEncoding::PcmS16le => self
                .data
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
                .collect(),
            PcmEncoding::PcmF32le => self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        };

        Ok(samples)
    }
}

/// Audio frame as carried on the room data channel
///
/// `audioData` is the base64 form of the raw PCM bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrameMessage {
    pub audio_data: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub encoding: PcmEncoding,
}

fn default_sample_rate() -> u32 {
    DEFAULT_FRAME_SAMPLE_RATE
}

impl AudioFrameMessage {
    pub fn from_frame(frame: &AudioFrame) -> Self {
        Self {
            audio_data: base64::engine::general_purpose::STANDARD.encode(&frame.data),
            sample_rate: frame.sample_rate,
            encoding: frame.encoding,
        }
    }

    pub fn into_frame(self) -> Result<AudioFrame> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(self.audio_data.as_bytes())
            .map_err(|e| MediaError::MalformedFrame(format!("invalid base64 audio data: {}", e)))?;

        Ok(AudioFrame::new(data, self.sample_rate, self.encoding))
    }
}
