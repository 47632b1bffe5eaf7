use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{SchedulerConfig, SoftwareConfig};
use crate::recording::{RecorderConfig, DEFAULT_FORMAT_PREFERENCES};
use crate::room::{ControllerConfig, DEFAULT_END_IDENTITY_MARKERS};
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub room: RoomConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "interview-media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Fade-in / fade-out per scheduled frame, in milliseconds
    pub fade_ms: f64,
    /// Clock rate of the software audio graph
    pub render_sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fade_ms: 1.0,
            render_sample_rate: 48000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub timeslice_ms: u64,
    pub preferred_formats: Vec<String>,
    pub output_dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            timeslice_ms: 1000,
            preferred_formats: DEFAULT_FORMAT_PREFERENCES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            output_dir: PathBuf::from("recordings"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Identity fragments whose departure ends the interview
    pub end_identity_markers: Vec<String>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            end_identity_markers: DEFAULT_END_IDENTITY_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            fade_secs: self.audio.fade_ms / 1000.0,
        }
    }

    pub fn software_config(&self) -> SoftwareConfig {
        SoftwareConfig {
            sample_rate: self.audio.render_sample_rate,
            ..SoftwareConfig::default()
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            timeslice: Duration::from_millis(self.recording.timeslice_ms),
            preferred_formats: self.recording.preferred_formats.clone(),
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            end_identity_markers: self.room.end_identity_markers.clone(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            output_dir: self.recording.output_dir.clone(),
            ..SessionConfig::default()
        }
    }
}
