use super::config::SessionConfig;
use super::stats::SessionStats;
use crate::audio::InputSource;
use crate::recording::{AudioRecordingService, RecordingArtifact};
use crate::room::{EventHandlers, RoomCredentials, SessionController};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// An interview session: one room connection, its pushed speech playback
/// and the recording of everything that was heard
pub struct InterviewSession {
    /// Session configuration
    config: SessionConfig,

    /// Room connection and event routing
    controller: SessionController,

    /// Playback and capture pipeline
    audio: AudioRecordingService,

    /// Local capture mixed into the recording once the pipeline is up
    microphone: Option<Box<dyn InputSource>>,

    /// When the session started
    started_at: DateTime<Utc>,

    /// Room events dispatched so far
    events_dispatched: usize,
}

impl InterviewSession {
    /// Create a new interview session
    pub fn new(
        config: SessionConfig,
        controller: SessionController,
        audio: AudioRecordingService,
    ) -> Self {
        info!("Creating interview session: {}", config.session_id);

        Self {
            config,
            controller,
            audio,
            microphone: None,
            started_at: Utc::now(),
            events_dispatched: 0,
        }
    }

    /// Mix `input` into the recording when the session starts
    pub fn with_microphone(mut self, input: Box<dyn InputSource>) -> Self {
        self.microphone = Some(input);
        self
    }

    /// Bring up audio, join the room and start recording
    ///
    /// On failure everything acquired so far is released again.
    pub async fn start(&mut self, credentials: &RoomCredentials, handlers: EventHandlers) -> Result<()> {
        info!("Starting interview session: {}", self.config.session_id);

        if let Err(e) = self.try_start(credentials, handlers).await {
            error!("Failed to start interview session: {:#}", e);
            self.controller.disconnect(false).await;
            self.audio.cleanup().await;
            return Err(e);
        }

        self.started_at = Utc::now();
        self.events_dispatched = 0;
        info!("Interview session started successfully");
        Ok(())
    }

    async fn try_start(&mut self, credentials: &RoomCredentials, handlers: EventHandlers) -> Result<()> {
        self.audio
            .initialize()
            .await
            .context("Failed to initialize audio")?;

        if let Some(input) = self.microphone.take() {
            let name = input.name().to_string();
            self.audio
                .connect_microphone(input)
                .with_context(|| format!("Failed to connect microphone {}", name))?;
            info!("Microphone input connected: {}", name);
        }

        self.controller.set_handlers(handlers);
        self.controller
            .connect(credentials)
            .await
            .context("Failed to connect to room")?;

        self.audio
            .start_recording()
            .await
            .context("Failed to start recording")?;

        Ok(())
    }

    /// Dispatch one room event
    ///
    /// Returns `false` once the event stream is exhausted.
    pub async fn pump(&mut self) -> bool {
        let event = match self.controller.next_event().await {
            Some(event) => event,
            None => return false,
        };

        self.events_dispatched += 1;
        if let Some(frame) = self.controller.dispatch(event) {
            match self.audio.process_incoming_audio(&frame) {
                Some(voice) => debug!("Scheduled speech frame as voice {}", voice),
                None => debug!("Speech frame not scheduled"),
            }
        }
        true
    }

    /// Pump events until the stream ends (or the interview ends, if configured)
    ///
    /// Returns the number of events dispatched.
    pub async fn run(&mut self) -> usize {
        let before = self.events_dispatched;

        loop {
            if self.config.stop_on_interview_end && self.controller.interview_ended().is_some() {
                info!("Interview ended; stopping event loop");
                break;
            }
            if !self.pump().await {
                info!("Room event stream ended");
                break;
            }
        }

        self.events_dispatched - before
    }

    /// Stop recording, leave the room and release audio
    ///
    /// Returns whatever was recorded; never fails.
    pub async fn finish(&mut self) -> Option<RecordingArtifact> {
        info!("Finishing interview session: {}", self.config.session_id);

        let artifact = if self.audio.is_recording() {
            match self.audio.stop_recording().await {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    warn!("Stop failed, keeping partial recording: {:#}", e);
                    self.audio.finalize()
                }
            }
        } else {
            self.audio.finalize()
        };

        self.controller.disconnect(true).await;
        self.audio.cleanup().await;

        match &artifact {
            Some(a) => info!("Recording captured: {} bytes ({})", a.size, a.mime_type),
            None => info!("No recording captured"),
        }
        artifact
    }

    /// Finish the session and write the recording to the configured directory
    pub async fn finish_and_save(&mut self) -> Result<Option<PathBuf>> {
        let artifact = match self.finish().await {
            Some(artifact) => artifact,
            None => return Ok(None),
        };

        let path = artifact
            .save(&self.config.output_dir)
            .await
            .context("Failed to save recording")?;
        Ok(Some(path))
    }

    /// Get current session statistics
    pub fn stats(&mut self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.config.session_id.clone(),
            is_recording: self.audio.is_recording(),
            connection_state: self.controller.state(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            events_dispatched: self.events_dispatched,
            frames_played: self.audio.frames_played(),
            frames_dropped: self.audio.frames_dropped(),
            chunks_count: self.audio.chunk_count(),
            participants: self.controller.participants().count(),
            interview_ended: self.controller.interview_ended().cloned(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SessionController {
        &mut self.controller
    }

    pub fn audio(&self) -> &AudioRecordingService {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioRecordingService {
        &mut self.audio
    }
}
