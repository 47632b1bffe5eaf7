pub mod audio;
pub mod config;
pub mod error;
pub mod recording;
pub mod room;
pub mod session;

pub use audio::{
    AudioContext, AudioFile, AudioFrame, AudioFrameMessage, AudioHardware, FileInput,
    PcmEncoding, PlaybackScheduler, SchedulerConfig, SoftwareAudioHardware, SoftwareConfig,
    StreamEncoder,
};
pub use config::Config;
pub use error::MediaError;
pub use recording::{AudioRecordingService, RecorderConfig, RecordingArtifact, SessionRecorder};
pub use room::{
    ControlMessage, ControllerConfig, EventHandlers, InterviewEnd, ReplayFactory, RoomCredentials,
    RoomTransport, SessionController, TrackSink, TransportFactory,
};
pub use session::{InterviewSession, SessionConfig, SessionStats};
