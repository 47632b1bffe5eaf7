use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::artifact::RecordingArtifact;
use super::recorder::{RecorderConfig, SessionRecorder};
use crate::audio::{
    AudioContext, AudioFrame, AudioHardware, ContextState, DestinationId, InputSource,
    PlaybackScheduler, SchedulerConfig, VoiceId,
};
use crate::error::MediaError;

/// Plays pushed speech frames and records the mixed session
///
/// Owns the audio context; the playback scheduler and the recorder share
/// its mix destination. Frames are only scheduled while recording.
pub struct AudioRecordingService {
    hardware: Arc<dyn AudioHardware>,
    context: Option<Box<dyn AudioContext>>,
    destination: Option<DestinationId>,
    scheduler: PlaybackScheduler,
    recorder: SessionRecorder,
    recording: bool,
    frames_played: usize,
    frames_dropped: usize,
}

impl AudioRecordingService {
    pub fn new(
        hardware: Arc<dyn AudioHardware>,
        scheduler_config: SchedulerConfig,
        recorder_config: RecorderConfig,
    ) -> Self {
        Self {
            hardware,
            context: None,
            destination: None,
            scheduler: PlaybackScheduler::new(scheduler_config),
            recorder: SessionRecorder::new(recorder_config),
            recording: false,
            frames_played: 0,
            frames_dropped: 0,
        }
    }

    /// Acquire the audio context, create the mix destination and bind the encoder
    pub async fn initialize(&mut self) -> Result<()> {
        if self.context.is_some() {
            debug!("Audio pipeline already initialized");
            return Ok(());
        }

        let hardware = Arc::clone(&self.hardware);
        if let Err(e) = self.recorder.negotiate(|m| hardware.is_type_supported(m)) {
            error!("Recording format negotiation failed: {:#}", e);
            return Err(e);
        }

        let mut context = match self.hardware.create_context().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to create audio context on {}: {:#}", self.hardware.name(), e);
                self.recorder.cleanup().await;
                return Err(e.context(MediaError::AudioUnavailable(self.hardware.name().to_string())));
            }
        };

        match Self::prepare(context.as_mut(), &mut self.recorder).await {
            Ok(destination) => {
                info!(
                    "Audio pipeline initialized ({}, {})",
                    self.hardware.name(),
                    self.recorder.mime_type().unwrap_or("unknown")
                );
                self.destination = Some(destination);
                self.context = Some(context);
                Ok(())
            }
            Err(e) => {
                error!("Audio pipeline setup failed: {:#}", e);
                if let Err(close_err) = context.close().await {
                    warn!("Failed to close audio context: {:#}", close_err);
                }
                self.recorder.cleanup().await;
                Err(e)
            }
        }
    }

    async fn prepare(context: &mut dyn AudioContext, recorder: &mut SessionRecorder) -> Result<DestinationId> {
        if context.state() == ContextState::Suspended {
            context.resume().await.context("Failed to resume audio context")?;
        }

        let destination = context
            .create_destination()
            .context("Failed to create mix destination")?;

        let mime_type = recorder
            .mime_type()
            .ok_or(MediaError::NotInitialized)?
            .to_string();
        let encoder = context
            .create_encoder(destination, &mime_type)
            .context("Failed to create stream encoder")?;
        recorder.attach_encoder(encoder);

        Ok(destination)
    }

    /// Mix a local capture (e.g. the microphone) into the recording
    pub fn connect_microphone(&mut self, input: Box<dyn InputSource>) -> Result<()> {
        let (context, destination) = match (self.context.as_mut(), self.destination) {
            (Some(c), Some(d)) => (c, d),
            _ => return Err(MediaError::NotInitialized.into()),
        };
        context.connect_input(destination, input)
    }

    /// Open the recording gate and start capture
    pub async fn start_recording(&mut self) -> Result<()> {
        if self.context.is_none() {
            warn!("Cannot start recording: not initialized");
            return Err(MediaError::NotInitialized.into());
        }
        if self.recording {
            warn!("Recording already started");
            return Err(MediaError::AlreadyRecording.into());
        }

        if let Err(e) = self.recorder.start().await {
            error!("Failed to start recording: {:#}", e);
            return Err(e);
        }

        self.recording = true;
        self.frames_played = 0;
        self.frames_dropped = 0;
        Ok(())
    }

    /// Close the recording gate and wait for the finished artifact
    pub async fn stop_recording(&mut self) -> Result<RecordingArtifact> {
        if !self.recording {
            warn!("Recording not active");
            return Err(MediaError::NotRecording.into());
        }

        self.recording = false;
        let artifact = self.recorder.stop().await;
        if let Err(e) = &artifact {
            error!("Failed to stop recording: {:#}", e);
        }
        artifact
    }

    /// Decode one pushed frame and schedule it for playback
    ///
    /// Returns the voice id, or `None` when the frame was dropped.
    pub fn process_incoming_audio(&mut self, frame: &AudioFrame) -> Option<VoiceId> {
        let (context, destination) = match (self.context.as_mut(), self.destination) {
            (Some(c), Some(d)) if self.recording => (c, d),
            _ => {
                debug!("Dropping {} byte frame: not recording", frame.data.len());
                return None;
            }
        };

        let samples = match frame.decode() {
            Ok(s) => s,
            Err(e) => {
                warn!("Dropping audio frame: {:#}", e);
                self.frames_dropped += 1;
                return None;
            }
        };

        match self
            .scheduler
            .schedule(context.as_mut(), destination, samples, frame.sample_rate)
        {
            Ok(id) => {
                self.frames_played += 1;
                Some(id)
            }
            Err(e) => {
                warn!("Failed to schedule audio frame: {:#}", e);
                self.frames_dropped += 1;
                None
            }
        }
    }

    /// Artifact from everything recorded so far, without stopping
    pub fn finalize(&mut self) -> Option<RecordingArtifact> {
        self.recorder.finalize()
    }

    /// Stop capture, halt playback, release the audio context; never fails
    pub async fn cleanup(&mut self) {
        self.recorder.cleanup().await;

        if let Some(mut context) = self.context.take() {
            self.scheduler.halt_all(context.as_mut());
            if let Err(e) = context.close().await {
                warn!("Failed to close audio context: {:#}", e);
            }
            info!("Audio pipeline released");
        }

        self.scheduler.reset();
        self.destination = None;
        self.recording = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.recorder.mime_type()
    }

    /// Voices still playing
    pub fn in_flight_voices(&mut self) -> usize {
        if let Some(context) = self.context.as_deref() {
            self.scheduler.prune(context);
        }
        self.scheduler.in_flight()
    }

    pub fn frames_played(&self) -> usize {
        self.frames_played
    }

    pub fn frames_dropped(&self) -> usize {
        self.frames_dropped
    }

    /// Encoded slices captured so far, including any still in flight
    pub fn chunk_count(&mut self) -> usize {
        self.recorder.collect_chunks();
        self.recorder.chunk_count()
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }
}
