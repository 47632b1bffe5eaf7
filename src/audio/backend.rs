use anyhow::Result;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Lifecycle state of an audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Lifecycle state of a stream encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// Idle; either never started or confirmed stopped
    Inactive,
    Recording,
    Paused,
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Recording => write!(f, "recording"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Handle to a mixing destination node inside a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationId(pub u32);

/// Sequence id of a scheduled playback voice
pub type VoiceId = u64;

/// One point of a gain automation curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainPoint {
    /// Seconds relative to the voice start
    pub offset: f64,
    pub value: f32,
}

/// Piecewise-linear gain automation applied to one voice
#[derive(Debug, Clone, PartialEq)]
pub struct GainEnvelope {
    points: Vec<GainPoint>,
}

impl GainEnvelope {
    /// Unity gain for the whole voice
    pub fn flat() -> Self {
        Self {
            points: vec![GainPoint {
                offset: 0.0,
                value: 1.0,
            }],
        }
    }

    /// Linear fade-in over `fade` seconds and fade-out over the last `fade`
    /// seconds of a voice lasting `duration` seconds.
    ///
    /// The fade is clamped to half the duration so both ramps fit.
    pub fn fade(duration: f64, fade: f64) -> Self {
        let fade = fade.min(duration / 2.0).max(0.0);
        Self {
            points: vec![
                GainPoint { offset: 0.0, value: 0.0 },
                GainPoint { offset: fade, value: 1.0 },
                GainPoint { offset: duration - fade, value: 1.0 },
                GainPoint { offset: duration, value: 0.0 },
            ],
        }
    }

    pub fn points(&self) -> &[GainPoint] {
        &self.points
    }

    /// Gain at `t` seconds after the voice start
    pub fn gain_at(&self, t: f64) -> f32 {
        let first = match self.points.first() {
            Some(p) => p,
            None => return 1.0,
        };
        if t <= first.offset {
            return first.value;
        }

        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.offset {
                let span = b.offset - a.offset;
                if span <= 0.0 {
                    return b.value;
                }
                let ratio = ((t - a.offset) / span) as f32;
                return a.value + (b.value - a.value) * ratio;
            }
        }

        self.points.last().map(|p| p.value).unwrap_or(1.0)
    }
}

/// A mono buffer source routed through a gain envelope into a destination
#[derive(Debug, Clone)]
pub struct ScheduledVoice {
    pub id: VoiceId,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Context time (seconds) at which playback begins
    pub start_at: f64,
    pub envelope: GainEnvelope,
}

impl ScheduledVoice {
    /// Playback duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A live capture feeding a destination (e.g. the local microphone)
pub trait InputSource: Send {
    /// Native sample rate of the source
    fn sample_rate(&self) -> u32;

    /// Fill `out` with mono samples; returns how many were written.
    /// Fewer than `out.len()` means the source ran dry.
    fn read(&mut self, out: &mut [f32]) -> usize;

    fn name(&self) -> &str;
}

/// Streaming encoder bound to a destination
///
/// Emits encoded chunks on the channel returned by `start` once per
/// timeslice. `stop` only requests finalization; the encoder confirms by
/// moving its state to `Inactive`, observable through `subscribe`.
#[async_trait::async_trait]
pub trait StreamEncoder: Send + Sync {
    fn mime_type(&self) -> &str;

    fn state(&self) -> EncoderState;

    /// Watch the encoder state; the current value is visible immediately
    fn subscribe(&self) -> watch::Receiver<EncoderState>;

    /// Begin capture, emitting one chunk per `timeslice`
    async fn start(&mut self, timeslice: Duration) -> Result<mpsc::UnboundedReceiver<Vec<u8>>>;

    /// Request capture to end; remaining data is flushed before `Inactive`
    async fn stop(&mut self) -> Result<()>;
}

/// Audio processing graph owned by one recording service
#[async_trait::async_trait]
pub trait AudioContext: Send + Sync {
    fn state(&self) -> ContextState;

    async fn resume(&mut self) -> Result<()>;

    /// Current context time in seconds
    fn current_time(&self) -> f64;

    /// Create a stream-capturing mix destination
    fn create_destination(&mut self) -> Result<DestinationId>;

    /// Mix a live input into a destination
    fn connect_input(&mut self, destination: DestinationId, input: Box<dyn InputSource>) -> Result<()>;

    /// Start a voice on a destination
    fn start_voice(&mut self, destination: DestinationId, voice: ScheduledVoice) -> Result<()>;

    /// Halt a voice; unknown or finished ids are ignored
    fn stop_voice(&mut self, id: VoiceId);

    /// True once a voice has played out or was stopped
    fn voice_finished(&self, id: VoiceId) -> bool;

    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Bind a streaming encoder to a destination
    fn create_encoder(
        &mut self,
        destination: DestinationId,
        mime_type: &str,
    ) -> Result<Box<dyn StreamEncoder>>;

    /// Release the underlying device
    async fn close(&mut self) -> Result<()>;
}

/// Audio hardware capability
///
/// Platform-specific implementations create contexts bound to a physical
/// output device; `SoftwareAudioHardware` renders in process.
#[async_trait::async_trait]
pub trait AudioHardware: Send + Sync {
    async fn create_context(&self) -> Result<Box<dyn AudioContext>>;

    /// Whether encoders of this MIME type can be created
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}
