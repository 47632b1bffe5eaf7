//! Session recording
//!
//! - `format`: container negotiation and file extensions
//! - `recorder`: chunk capture from a streaming encoder
//! - `artifact`: the downloadable result
//! - `service`: owns the audio context shared by playback and capture

pub mod artifact;
pub mod format;
pub mod recorder;
pub mod service;

pub use artifact::RecordingArtifact;
pub use format::{extension_for, RecordingFormat, DEFAULT_FORMAT_PREFERENCES};
pub use recorder::{RecorderConfig, SessionRecorder};
pub use service::AudioRecordingService;
