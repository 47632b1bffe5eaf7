use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::artifact::RecordingArtifact;
use super::format::{RecordingFormat, DEFAULT_FORMAT_PREFERENCES};
use crate::audio::{EncoderState, StreamEncoder};
use crate::error::MediaError;

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Encoder timeslice (default: 1 second)
    pub timeslice: Duration,
    /// MIME types to try, most preferred first
    pub preferred_formats: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            timeslice: Duration::from_secs(1),
            preferred_formats: DEFAULT_FORMAT_PREFERENCES
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Captures a mix destination through a streaming encoder
///
/// Encoded slices are kept in emission order; an artifact can be
/// materialized from them at any time without consuming them.
pub struct SessionRecorder {
    config: RecorderConfig,
    format: Option<RecordingFormat>,
    encoder: Option<Box<dyn StreamEncoder>>,
    chunk_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    chunks: Vec<Vec<u8>>,
    active: bool,
}

impl SessionRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            format: None,
            encoder: None,
            chunk_rx: None,
            chunks: Vec::new(),
            active: false,
        }
    }

    /// Negotiate the container once; later calls return the same format
    pub fn negotiate<F>(&mut self, is_supported: F) -> Result<&RecordingFormat>
    where
        F: Fn(&str) -> bool,
    {
        if self.format.is_none() {
            let format = RecordingFormat::negotiate(self.config.preferred_formats.as_slice(), is_supported)?;
            self.format = Some(format);
        }

        self.format
            .as_ref()
            .ok_or_else(|| MediaError::NotInitialized.into())
    }

    /// Bind the encoder that will capture the destination
    pub fn attach_encoder(&mut self, encoder: Box<dyn StreamEncoder>) {
        debug!("Encoder attached ({})", encoder.mime_type());
        self.encoder = Some(encoder);
    }

    /// Start a fresh capture
    pub async fn start(&mut self) -> Result<()> {
        if self.active {
            return Err(MediaError::AlreadyRecording.into());
        }

        let encoder = self.encoder.as_mut().ok_or(MediaError::NotInitialized)?;
        let state = encoder.state();
        if state != EncoderState::Inactive {
            return Err(MediaError::EncoderBusy(state.to_string()).into());
        }

        self.chunks.clear();
        self.chunk_rx = None;

        let rx = encoder
            .start(self.config.timeslice)
            .await
            .context("Failed to start encoder")?;

        self.chunk_rx = Some(rx);
        self.active = true;

        info!(
            "Recording started ({}, {}ms slices)",
            encoder.mime_type(),
            self.config.timeslice.as_millis()
        );

        Ok(())
    }

    /// Stop capture and return the finished artifact
    ///
    /// Resolves once the encoder confirms it is inactive.
    pub async fn stop(&mut self) -> Result<RecordingArtifact> {
        if !self.active {
            return Err(MediaError::NotRecording.into());
        }

        let stopped = self.stop_encoder().await;

        // Capture is over either way; partial chunks stay for finalize()
        self.active = false;
        self.collect_chunks();
        self.chunk_rx = None;

        if let Err(e) = stopped {
            warn!(
                "Recording stopped without confirmation, keeping {} chunks",
                self.chunks.len()
            );
            return Err(e);
        }

        let artifact = self.materialize();
        info!(
            "Recording stopped: {} chunks, {} bytes ({})",
            self.chunks.len(),
            artifact.size,
            artifact.mime_type
        );

        Ok(artifact)
    }

    async fn stop_encoder(&mut self) -> Result<()> {
        let encoder = self.encoder.as_mut().ok_or(MediaError::NotInitialized)?;
        let mut states = encoder.subscribe();

        encoder.stop().await.context("Failed to stop encoder")?;

        states
            .wait_for(|state| *state == EncoderState::Inactive)
            .await
            .map_err(|_| MediaError::Transport("encoder dropped before confirming stop".to_string()))?;

        Ok(())
    }

    /// Build an artifact from the chunks accumulated so far
    ///
    /// Does not stop capture and leaves the chunks untouched, so repeated
    /// calls yield the same bytes until new slices arrive.
    pub fn finalize(&mut self) -> Option<RecordingArtifact> {
        self.collect_chunks();
        if self.chunks.is_empty() {
            debug!("Nothing recorded yet");
            return None;
        }
        Some(self.materialize())
    }

    /// Move every slice the encoder has emitted into the chunk list
    pub fn collect_chunks(&mut self) -> usize {
        let rx = match self.chunk_rx.as_mut() {
            Some(rx) => rx,
            None => return 0,
        };

        let mut received = 0;
        while let Ok(chunk) = rx.try_recv() {
            if chunk.is_empty() {
                continue;
            }
            debug!("Chunk {} received ({} bytes)", self.chunks.len(), chunk.len());
            self.chunks.push(chunk);
            received += 1;
        }
        received
    }

    /// Stop any active capture and drop all state; never fails
    pub async fn cleanup(&mut self) {
        if self.active {
            if let Some(encoder) = self.encoder.as_mut() {
                if let Err(e) = encoder.stop().await {
                    warn!("Failed to stop encoder during cleanup: {:#}", e);
                }
            }
        }

        self.active = false;
        self.encoder = None;
        self.chunk_rx = None;
        self.chunks.clear();
        self.format = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn format(&self) -> Option<&RecordingFormat> {
        self.format.as_ref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.format.as_ref().map(|f| f.mime_type.as_str())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    fn materialize(&self) -> RecordingArtifact {
        let mime_type = self
            .encoder
            .as_ref()
            .map(|e| e.mime_type().to_string())
            .or_else(|| self.mime_type().map(str::to_string))
            .unwrap_or_default();
        RecordingArtifact::from_chunks(&self.chunks, &mime_type)
    }
}
