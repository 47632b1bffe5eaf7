pub mod backend;
pub mod file;
pub mod frame;
pub mod scheduler;
pub mod software;

pub use backend::{
    AudioContext, AudioHardware, ContextState, DestinationId, EncoderState, GainEnvelope,
    GainPoint, InputSource, ScheduledVoice, StreamEncoder, VoiceId,
};
pub use file::{AudioFile, FileInput};
pub use frame::{AudioFrame, AudioFrameMessage, PcmEncoding, DEFAULT_FRAME_SAMPLE_RATE};
pub use scheduler::{PlaybackScheduler, SchedulerConfig, VoiceRecord};
pub use software::{SoftwareAudioHardware, SoftwareConfig, WAV_MIME_TYPE};
