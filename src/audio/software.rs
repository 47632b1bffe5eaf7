// In-process audio graph
//
// Renders the mix destination on demand instead of driving a sound card:
// `render` advances the context clock, sums every connected input and every
// live voice (resampled to the graph rate, scaled by its gain envelope),
// and feeds the result to the encoders tapping that destination.
//
// The bundled encoder writes 16-bit mono WAV. The first chunk starts with a
// streaming header whose size fields are 0xFFFFFFFF, so the concatenation
// of all chunks is a playable file without rewriting the header.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::backend::{
    AudioContext, AudioHardware, ContextState, DestinationId, EncoderState, GainEnvelope,
    InputSource, ScheduledVoice, StreamEncoder, VoiceId,
};
use crate::error::MediaError;

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Configuration for the software graph
#[derive(Debug, Clone)]
pub struct SoftwareConfig {
    /// Render (output) sample rate in Hz
    pub sample_rate: u32,
    /// Create contexts in the suspended state, as browsers do before a gesture
    pub start_suspended: bool,
}

impl Default for SoftwareConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            start_suspended: false,
        }
    }
}

struct Voice {
    samples: Vec<f32>,
    start_frame: u64,
    envelope: GainEnvelope,
}

struct Tap {
    pending: Vec<i16>,
    samples_per_chunk: usize,
    header_sent: bool,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Tap {
    fn push(&mut self, mix: &[f32], sample_rate: u32) {
        self.pending
            .extend(mix.iter().map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16));

        while self.pending.len() >= self.samples_per_chunk {
            let rest = self.pending.split_off(self.samples_per_chunk);
            let slice = std::mem::replace(&mut self.pending, rest);
            self.emit(&slice, sample_rate);
        }
    }

    fn flush(&mut self, sample_rate: u32) {
        if !self.pending.is_empty() || !self.header_sent {
            let slice = std::mem::take(&mut self.pending);
            self.emit(&slice, sample_rate);
        }
    }

    fn emit(&mut self, samples: &[i16], sample_rate: u32) {
        let mut chunk = Vec::with_capacity(44 + samples.len() * 2);
        if !self.header_sent {
            chunk.extend_from_slice(&streaming_wav_header(sample_rate));
            self.header_sent = true;
        }
        chunk.extend(samples.iter().flat_map(|s| s.to_le_bytes()));

        if self.tx.send(chunk).is_err() {
            debug!("Encoder chunk receiver dropped");
        }
    }
}

#[derive(Default)]
struct Destination {
    voices: BTreeMap<VoiceId, Voice>,
    inputs: Vec<Box<dyn InputSource>>,
    taps: BTreeMap<u64, Tap>,
}

struct Graph {
    state: ContextState,
    open: bool,
    sample_rate: u32,
    clock: u64,
    next_destination: u32,
    next_tap: u64,
    destinations: BTreeMap<u32, Destination>,
}

impl Graph {
    fn new(sample_rate: u32) -> Self {
        Self {
            state: ContextState::Closed,
            open: false,
            sample_rate,
            clock: 0,
            next_destination: 0,
            next_tap: 0,
            destinations: BTreeMap::new(),
        }
    }

    fn render(&mut self, frames: usize) -> Vec<f32> {
        if self.state != ContextState::Running {
            return Vec::new();
        }

        let rate = self.sample_rate;
        let clock = self.clock;
        let end = clock + frames as u64;
        let mut first_mix = None;

        for destination in self.destinations.values_mut() {
            let mut mix = vec![0.0f32; frames];

            for input in &mut destination.inputs {
                let input_rate = input.sample_rate();
                let wanted = ((frames as u64 * input_rate as u64) / rate as u64) as usize;
                let mut buf = vec![0.0f32; wanted];
                let read = input.read(&mut buf);
                buf.truncate(read);
                let resampled = resample_linear(&buf, input_rate, rate);
                for (out, s) in mix.iter_mut().zip(resampled) {
                    *out += s;
                }
            }

            for voice in destination.voices.values() {
                let voice_end = voice.start_frame + voice.samples.len() as u64;
                let from = voice.start_frame.max(clock);
                let to = voice_end.min(end);
                for frame in from..to {
                    let local = (frame - voice.start_frame) as usize;
                    let gain = voice.envelope.gain_at(local as f64 / rate as f64);
                    mix[(frame - clock) as usize] += voice.samples[local] * gain;
                }
            }
            destination
                .voices
                .retain(|_, v| v.start_frame + v.samples.len() as u64 > end);

            for s in &mut mix {
                *s = s.clamp(-1.0, 1.0);
            }
            for tap in destination.taps.values_mut() {
                tap.push(&mix, rate);
            }

            if first_mix.is_none() {
                first_mix = Some(mix);
            }
        }

        self.clock = end;
        first_mix.unwrap_or_else(|| vec![0.0; frames])
    }

    fn remove_tap(&mut self, destination: u32, tap_id: u64) {
        let rate = self.sample_rate;
        if let Some(dest) = self.destinations.get_mut(&destination) {
            if let Some(mut tap) = dest.taps.remove(&tap_id) {
                tap.flush(rate);
            }
        }
    }
}

fn lock(graph: &Mutex<Graph>) -> MutexGuard<'_, Graph> {
    graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn mime_supported(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    essence.eq_ignore_ascii_case(WAV_MIME_TYPE) || essence.eq_ignore_ascii_case("audio/wave")
}

/// 44-byte PCM WAV header with unknown (streaming) lengths
pub fn streaming_wav_header(sample_rate: u32) -> [u8; 44] {
    let mut header = [0u8; 44];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&1u16.to_le_bytes()); // mono
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&(sample_rate * 2).to_le_bytes());
    header[32..34].copy_from_slice(&2u16.to_le_bytes());
    header[34..36].copy_from_slice(&16u16.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
    header
}

/// Linear-interpolation resampler
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }

    let out_len = ((samples.len() as u64 * to_rate as u64) / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

/// Software audio hardware
///
/// Owns a single graph; only one context may be open on it at a time.
pub struct SoftwareAudioHardware {
    config: SoftwareConfig,
    graph: Arc<Mutex<Graph>>,
}

impl SoftwareAudioHardware {
    pub fn new(config: SoftwareConfig) -> Self {
        info!("Software audio graph: {}Hz", config.sample_rate);
        let graph = Arc::new(Mutex::new(Graph::new(config.sample_rate)));
        Self { config, graph }
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Advance the clock by `duration`, returning the first destination's mix
    pub fn render(&self, duration: Duration) -> Vec<f32> {
        let frames = (duration.as_secs_f64() * self.config.sample_rate as f64).round() as usize;
        lock(&self.graph).render(frames)
    }

    /// Advance the clock up to `seconds` of context time (no-op if already past)
    pub fn render_until(&self, seconds: f64) -> Vec<f32> {
        let mut graph = lock(&self.graph);
        let target = (seconds * graph.sample_rate as f64).round() as u64;
        let frames = target.saturating_sub(graph.clock) as usize;
        graph.render(frames)
    }

    /// Current context time in seconds
    pub fn current_time(&self) -> f64 {
        let graph = lock(&self.graph);
        graph.clock as f64 / graph.sample_rate as f64
    }

    pub fn active_voices(&self) -> usize {
        lock(&self.graph)
            .destinations
            .values()
            .map(|d| d.voices.len())
            .sum()
    }
}

impl Default for SoftwareAudioHardware {
    fn default() -> Self {
        Self::new(SoftwareConfig::default())
    }
}

#[async_trait::async_trait]
impl AudioHardware for SoftwareAudioHardware {
    async fn create_context(&self) -> Result<Box<dyn AudioContext>> {
        let mut graph = lock(&self.graph);
        if graph.open {
            return Err(MediaError::AudioUnavailable("software graph already in use".to_string()).into());
        }

        *graph = Graph::new(self.config.sample_rate);
        graph.open = true;
        graph.state = if self.config.start_suspended {
            ContextState::Suspended
        } else {
            ContextState::Running
        };

        debug!("Software audio context created ({:?})", graph.state);

        Ok(Box::new(SoftwareContext {
            graph: Arc::clone(&self.graph),
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_supported(mime_type)
    }

    fn name(&self) -> &str {
        "software"
    }
}

/// Context handle onto the software graph
pub struct SoftwareContext {
    graph: Arc<Mutex<Graph>>,
}

#[async_trait::async_trait]
impl AudioContext for SoftwareContext {
    fn state(&self) -> ContextState {
        lock(&self.graph).state
    }

    async fn resume(&mut self) -> Result<()> {
        let mut graph = lock(&self.graph);
        if graph.state == ContextState::Closed {
            bail!(MediaError::AudioUnavailable("context is closed".to_string()));
        }
        graph.state = ContextState::Running;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        let graph = lock(&self.graph);
        graph.clock as f64 / graph.sample_rate as f64
    }

    fn create_destination(&mut self) -> Result<DestinationId> {
        let mut graph = lock(&self.graph);
        if graph.state == ContextState::Closed {
            bail!(MediaError::AudioUnavailable("context is closed".to_string()));
        }

        let id = graph.next_destination;
        graph.next_destination += 1;
        graph.destinations.insert(id, Destination::default());
        Ok(DestinationId(id))
    }

    fn connect_input(&mut self, destination: DestinationId, input: Box<dyn InputSource>) -> Result<()> {
        let mut graph = lock(&self.graph);
        let dest = match graph.destinations.get_mut(&destination.0) {
            Some(d) => d,
            None => bail!("unknown destination {:?}", destination),
        };

        info!("Input '{}' connected ({}Hz)", input.name(), input.sample_rate());
        dest.inputs.push(input);
        Ok(())
    }

    fn start_voice(&mut self, destination: DestinationId, voice: ScheduledVoice) -> Result<()> {
        let mut graph = lock(&self.graph);
        let rate = graph.sample_rate;
        let start_frame = (voice.start_at * rate as f64).round() as u64;
        let samples = resample_linear(&voice.samples, voice.sample_rate, rate);

        let dest = match graph.destinations.get_mut(&destination.0) {
            Some(d) => d,
            None => bail!("unknown destination {:?}", destination),
        };

        dest.voices.insert(
            voice.id,
            Voice {
                samples,
                start_frame,
                envelope: voice.envelope,
            },
        );
        Ok(())
    }

    fn stop_voice(&mut self, id: VoiceId) {
        let mut graph = lock(&self.graph);
        for dest in graph.destinations.values_mut() {
            dest.voices.remove(&id);
        }
    }

    fn voice_finished(&self, id: VoiceId) -> bool {
        !lock(&self.graph)
            .destinations
            .values()
            .any(|d| d.voices.contains_key(&id))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_supported(mime_type)
    }

    fn create_encoder(
        &mut self,
        destination: DestinationId,
        mime_type: &str,
    ) -> Result<Box<dyn StreamEncoder>> {
        if !mime_supported(mime_type) {
            bail!(MediaError::NoSupportedFormat(vec![mime_type.to_string()]));
        }
        if !lock(&self.graph).destinations.contains_key(&destination.0) {
            bail!("unknown destination {:?}", destination);
        }

        let (state_tx, _) = watch::channel(EncoderState::Inactive);
        Ok(Box::new(WavStreamEncoder {
            graph: Arc::clone(&self.graph),
            destination: destination.0,
            tap_id: None,
            mime_type: mime_type.to_string(),
            state_tx,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        let mut graph = lock(&self.graph);
        if !graph.open {
            return Ok(());
        }

        let rate = graph.sample_rate;
        for dest in graph.destinations.values_mut() {
            for tap in dest.taps.values_mut() {
                warn!("Closing context with an active encoder tap");
                tap.flush(rate);
            }
        }
        graph.destinations.clear();
        graph.state = ContextState::Closed;
        graph.open = false;

        debug!("Software audio context closed");
        Ok(())
    }
}

/// Streaming WAV encoder tapping a software destination
pub struct WavStreamEncoder {
    graph: Arc<Mutex<Graph>>,
    destination: u32,
    tap_id: Option<u64>,
    mime_type: String,
    state_tx: watch::Sender<EncoderState>,
}

#[async_trait::async_trait]
impl StreamEncoder for WavStreamEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn state(&self) -> EncoderState {
        *self.state_tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<EncoderState> {
        self.state_tx.subscribe()
    }

    async fn start(&mut self, timeslice: Duration) -> Result<mpsc::UnboundedReceiver<Vec<u8>>> {
        if self.state() != EncoderState::Inactive {
            bail!(MediaError::EncoderBusy(self.state().to_string()));
        }

        let mut graph = lock(&self.graph);
        let rate = graph.sample_rate;
        let tap_id = graph.next_tap;
        graph.next_tap += 1;

        let dest = match graph.destinations.get_mut(&self.destination) {
            Some(d) => d,
            None => bail!(MediaError::AudioUnavailable("destination closed".to_string())),
        };

        let samples_per_chunk =
            ((timeslice.as_secs_f64() * rate as f64).round() as usize).max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        dest.taps.insert(
            tap_id,
            Tap {
                pending: Vec::with_capacity(samples_per_chunk),
                samples_per_chunk,
                header_sent: false,
                tx,
            },
        );

        self.tap_id = Some(tap_id);
        self.state_tx.send_replace(EncoderState::Recording);

        debug!("WAV encoder started ({} samples per chunk)", samples_per_chunk);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let tap_id = match self.tap_id.take() {
            Some(id) => id,
            None => bail!(MediaError::NotRecording),
        };

        lock(&self.graph).remove_tap(self.destination, tap_id);
        self.state_tx.send_replace(EncoderState::Inactive);

        debug!("WAV encoder stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: VoiceId, samples: Vec<f32>, start_at: f64) -> ScheduledVoice {
        ScheduledVoice {
            id,
            samples,
            sample_rate: 16000,
            start_at,
            envelope: GainEnvelope::flat(),
        }
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_upsample_length() {
        let samples = vec![0.0f32; 160];
        assert_eq!(resample_linear(&samples, 16000, 48000).len(), 480);
    }

    #[test]
    fn test_header_layout() {
        let header = streaming_wav_header(16000);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u32::from_le_bytes([header[24], header[25], header[26], header[27]]), 16000);
    }

    #[tokio::test]
    async fn test_voice_mixed_and_retired() -> Result<()> {
        let hardware = SoftwareAudioHardware::new(SoftwareConfig {
            sample_rate: 16000,
            start_suspended: false,
        });
        let mut ctx = hardware.create_context().await?;
        let dest = ctx.create_destination()?;

        ctx.start_voice(dest, voice(0, vec![0.5; 160], 0.0))?;
        assert!(!ctx.voice_finished(0));

        let mix = hardware.render(Duration::from_millis(5));
        assert_eq!(mix.len(), 80);
        assert!(mix.iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert!(!ctx.voice_finished(0));

        hardware.render(Duration::from_millis(5));
        assert!(ctx.voice_finished(0));
        assert_eq!(hardware.active_voices(), 0);

        ctx.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_single_open_context() -> Result<()> {
        let hardware = SoftwareAudioHardware::default();
        let mut ctx = hardware.create_context().await?;
        assert!(hardware.create_context().await.is_err());

        ctx.close().await?;
        assert!(hardware.create_context().await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_suspended_context_does_not_render() -> Result<()> {
        let hardware = SoftwareAudioHardware::new(SoftwareConfig {
            sample_rate: 16000,
            start_suspended: true,
        });
        let mut ctx = hardware.create_context().await?;
        assert_eq!(ctx.state(), ContextState::Suspended);
        assert!(hardware.render(Duration::from_millis(10)).is_empty());

        ctx.resume().await?;
        assert_eq!(hardware.render(Duration::from_millis(10)).len(), 160);
        Ok(())
    }

    #[tokio::test]
    async fn test_wav_encoder_chunks_per_timeslice() -> Result<()> {
        let hardware = SoftwareAudioHardware::new(SoftwareConfig {
            sample_rate: 1000,
            start_suspended: false,
        });
        let mut ctx = hardware.create_context().await?;
        let dest = ctx.create_destination()?;
        let mut encoder = ctx.create_encoder(dest, "audio/wav")?;

        let mut rx = encoder.start(Duration::from_millis(100)).await?;
        assert_eq!(encoder.state(), EncoderState::Recording);

        hardware.render(Duration::from_millis(250));
        let first = rx.try_recv()?;
        let second = rx.try_recv()?;
        assert_eq!(first.len(), 44 + 200);
        assert_eq!(second.len(), 200);
        assert!(rx.try_recv().is_err());

        encoder.stop().await?;
        assert_eq!(encoder.state(), EncoderState::Inactive);
        let tail = rx.try_recv()?;
        assert_eq!(tail.len(), 100);
        Ok(())
    }
}
