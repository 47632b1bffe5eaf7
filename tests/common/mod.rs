// Shared test doubles for the integration tests
//
// MockHardware records every voice and encoder interaction; MockFactory hands
// out transports whose event stream is fed by the test.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use futures::channel::mpsc as fmpsc;
use futures::stream::{BoxStream, StreamExt};
use interview_media::audio::{
    AudioContext, AudioHardware, ContextState, DestinationId, EncoderState, InputSource,
    ScheduledVoice, StreamEncoder, VoiceId,
};
use interview_media::room::{
    LocalTrack, LocalTrackPublication, RemoteTrack, RoomEvent, RoomTransport, TrackKind,
    TrackSink, TransportFactory,
};
use interview_media::MediaError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap()
}

// ---------------------------------------------------------------------------
// Audio

/// Test-side handle onto the encoder created by the mock context
#[derive(Clone)]
pub struct EncoderHandle {
    chunk_tx: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
    state_tx: Arc<watch::Sender<EncoderState>>,
    state: watch::Receiver<EncoderState>,
    pub stop_calls: Arc<Mutex<usize>>,
    pub timeslice: Arc<Mutex<Option<Duration>>>,
}

impl EncoderHandle {
    /// Emit one encoded slice, as the encoder would at a timeslice boundary
    pub fn emit(&self, chunk: impl Into<Vec<u8>>) -> bool {
        match lock(&self.chunk_tx).as_ref() {
            Some(tx) => tx.send(chunk.into()).is_ok(),
            None => false,
        }
    }

    pub fn state(&self) -> EncoderState {
        *self.state.borrow()
    }

    /// Force the device state, as if another client drove the encoder
    pub fn set_state(&self, state: EncoderState) {
        self.state_tx.send_replace(state);
    }

    pub fn stop_calls(&self) -> usize {
        *lock(&self.stop_calls)
    }
}

pub struct MockEncoder {
    mime_type: String,
    state: Arc<watch::Sender<EncoderState>>,
    handle: EncoderHandle,
    stop_delay: Duration,
    final_chunk: Option<Vec<u8>>,
    fail_stop: bool,
}

#[async_trait::async_trait]
impl StreamEncoder for MockEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn state(&self) -> EncoderState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<EncoderState> {
        self.state.subscribe()
    }

    async fn start(&mut self, timeslice: Duration) -> Result<mpsc::UnboundedReceiver<Vec<u8>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.handle.chunk_tx) = Some(tx);
        *lock(&self.handle.timeslice) = Some(timeslice);
        self.state.send_replace(EncoderState::Recording);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        *lock(&self.handle.stop_calls) += 1;
        let current = *self.state.borrow();
        if current == EncoderState::Inactive {
            return Err(MediaError::NotRecording.into());
        }

        if self.fail_stop {
            // Device shuts down but the flush errors out
            lock(&self.handle.chunk_tx).take();
            self.state.send_replace(EncoderState::Inactive);
            return Err(anyhow!("encoder flush failed"));
        }

        let tx = lock(&self.handle.chunk_tx).take();
        let final_chunk = self.final_chunk.clone();
        let state = Arc::clone(&self.state);
        let delay = self.stop_delay;

        let confirm = async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let (Some(tx), Some(chunk)) = (tx, final_chunk) {
                let _ = tx.send(chunk);
            }
            state.send_replace(EncoderState::Inactive);
        };

        if delay.is_zero() {
            confirm.await;
        } else {
            tokio::spawn(confirm);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockGraph {
    pub state: Option<ContextState>,
    pub time: f64,
    pub contexts_created: usize,
    pub contexts_closed: usize,
    pub resumed: usize,
    pub destinations: u32,
    pub inputs: Vec<String>,
    pub voices: Vec<ScheduledVoice>,
    pub stopped: Vec<VoiceId>,
    pub finished: HashSet<VoiceId>,
    pub encoder: Option<EncoderHandle>,
}

#[derive(Clone)]
pub struct MockHardware {
    pub graph: Arc<Mutex<MockGraph>>,
    supported: Vec<String>,
    fail_create: bool,
    start_suspended: bool,
    stop_delay: Duration,
    final_chunk: Option<Vec<u8>>,
    fail_stop: bool,
}

impl MockHardware {
    /// Hardware that only supports `audio/webm`
    pub fn new() -> Self {
        Self {
            graph: Arc::new(Mutex::new(MockGraph::default())),
            supported: vec!["audio/webm".to_string()],
            fail_create: false,
            start_suspended: false,
            stop_delay: Duration::ZERO,
            final_chunk: None,
            fail_stop: false,
        }
    }

    pub fn supporting(mut self, mime_types: &[&str]) -> Self {
        self.supported = mime_types.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }

    /// Confirm `stop` only after `delay`, flushing `final_chunk` first
    pub fn with_stop_delay(mut self, delay: Duration, final_chunk: Option<Vec<u8>>) -> Self {
        self.stop_delay = delay;
        self.final_chunk = final_chunk;
        self
    }

    /// Encoder whose `stop` reports an error
    pub fn with_failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn graph(&self) -> MutexGuard<'_, MockGraph> {
        lock(&self.graph)
    }

    pub fn encoder(&self) -> EncoderHandle {
        self.graph()
            .encoder
            .clone()
            .expect("encoder has not been created")
    }

    pub fn set_time(&self, seconds: f64) {
        self.graph().time = seconds;
    }

    pub fn finish_voice(&self, id: VoiceId) {
        self.graph().finished.insert(id);
    }
}

#[async_trait::async_trait]
impl AudioHardware for MockHardware {
    async fn create_context(&self) -> Result<Box<dyn AudioContext>> {
        if self.fail_create {
            return Err(anyhow!("audio device busy"));
        }

        let mut graph = self.graph();
        graph.contexts_created += 1;
        graph.state = Some(if self.start_suspended {
            ContextState::Suspended
        } else {
            ContextState::Running
        });

        Ok(Box::new(MockContext {
            hardware: self.clone(),
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|m| m == mime_type)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockContext {
    hardware: MockHardware,
}

#[async_trait::async_trait]
impl AudioContext for MockContext {
    fn state(&self) -> ContextState {
        self.hardware.graph().state.unwrap_or(ContextState::Closed)
    }

    async fn resume(&mut self) -> Result<()> {
        let mut graph = self.hardware.graph();
        graph.resumed += 1;
        graph.state = Some(ContextState::Running);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.hardware.graph().time
    }

    fn create_destination(&mut self) -> Result<DestinationId> {
        let mut graph = self.hardware.graph();
        graph.destinations += 1;
        Ok(DestinationId(graph.destinations))
    }

    fn connect_input(&mut self, _destination: DestinationId, input: Box<dyn InputSource>) -> Result<()> {
        self.hardware.graph().inputs.push(input.name().to_string());
        Ok(())
    }

    fn start_voice(&mut self, _destination: DestinationId, voice: ScheduledVoice) -> Result<()> {
        self.hardware.graph().voices.push(voice);
        Ok(())
    }

    fn stop_voice(&mut self, id: VoiceId) {
        let mut graph = self.hardware.graph();
        graph.stopped.push(id);
        graph.finished.insert(id);
    }

    fn voice_finished(&self, id: VoiceId) -> bool {
        self.hardware.graph().finished.contains(&id)
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.hardware.is_type_supported(mime_type)
    }

    fn create_encoder(
        &mut self,
        _destination: DestinationId,
        mime_type: &str,
    ) -> Result<Box<dyn StreamEncoder>> {
        let (state_tx, state_rx) = watch::channel(EncoderState::Inactive);
        let state_tx = Arc::new(state_tx);
        let handle = EncoderHandle {
            chunk_tx: Arc::new(Mutex::new(None)),
            state_tx: Arc::clone(&state_tx),
            state: state_rx,
            stop_calls: Arc::new(Mutex::new(0)),
            timeslice: Arc::new(Mutex::new(None)),
        };
        self.hardware.graph().encoder = Some(handle.clone());

        Ok(Box::new(MockEncoder {
            mime_type: mime_type.to_string(),
            state: state_tx,
            handle,
            stop_delay: self.hardware.stop_delay,
            final_chunk: self.hardware.final_chunk.clone(),
            fail_stop: self.hardware.fail_stop,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        let mut graph = self.hardware.graph();
        graph.contexts_closed += 1;
        graph.state = Some(ContextState::Closed);
        Ok(())
    }
}

/// Input source that yields silence forever
pub struct SilentInput(pub &'static str);

impl InputSource for SilentInput {
    fn sample_rate(&self) -> u32 {
        16000
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        out.fill(0.0);
        out.len()
    }

    fn name(&self) -> &str {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Room

#[derive(Default)]
pub struct MockRoom {
    pub identity: String,
    pub events: Option<fmpsc::UnboundedSender<RoomEvent>>,
    pub connects: usize,
    pub disconnects: usize,
    pub fail_connect: bool,
    pub reject_publish: bool,
    pub reject_toggle: bool,
    pub published: Vec<LocalTrackPublication>,
    pub microphone: Option<bool>,
    pub camera: Option<bool>,
}

#[derive(Clone)]
pub struct MockFactory {
    pub room: Arc<Mutex<MockRoom>>,
}

impl MockFactory {
    pub fn new(identity: &str) -> Self {
        Self {
            room: Arc::new(Mutex::new(MockRoom {
                identity: identity.to_string(),
                ..MockRoom::default()
            })),
        }
    }

    pub fn room(&self) -> MutexGuard<'_, MockRoom> {
        lock(&self.room)
    }

    /// Queue an event on the current connection's stream
    pub fn emit(&self, event: RoomEvent) -> bool {
        match self.room().events.as_ref() {
            Some(tx) => tx.unbounded_send(event).is_ok(),
            None => false,
        }
    }

    /// End the current connection's event stream
    pub fn close_stream(&self) {
        self.room().events = None;
    }
}

impl TransportFactory for MockFactory {
    fn create(&self) -> Box<dyn RoomTransport> {
        Box::new(MockTransport {
            room: Arc::clone(&self.room),
        })
    }
}

pub struct MockTransport {
    room: Arc<Mutex<MockRoom>>,
}

#[async_trait::async_trait]
impl RoomTransport for MockTransport {
    async fn connect(&mut self, _url: &str, _token: &str) -> Result<BoxStream<'static, RoomEvent>> {
        let mut room = lock(&self.room);
        room.connects += 1;
        if room.fail_connect {
            return Err(MediaError::Transport("connection refused".to_string()).into());
        }

        let (tx, rx) = fmpsc::unbounded();
        room.events = Some(tx);
        Ok(rx.boxed())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut room = lock(&self.room);
        room.disconnects += 1;
        room.events = None;
        Ok(())
    }

    async fn publish_track(&mut self, track: LocalTrack) -> Result<LocalTrackPublication> {
        let mut room = lock(&self.room);
        if room.reject_publish {
            return Err(MediaError::Transport("publish rejected".to_string()).into());
        }
        let publication = LocalTrackPublication {
            sid: format!("TR_{}", room.published.len() + 1),
            kind: track.kind,
            source: track.source,
            stream_id: track.stream.id,
        };
        room.published.push(publication.clone());
        Ok(publication)
    }

    async fn set_microphone_enabled(&mut self, enabled: bool) -> Result<()> {
        let mut room = lock(&self.room);
        if room.reject_toggle {
            return Err(anyhow!("permission denied"));
        }
        room.microphone = Some(enabled);
        Ok(())
    }

    async fn set_camera_enabled(&mut self, enabled: bool) -> Result<()> {
        let mut room = lock(&self.room);
        if room.reject_toggle {
            return Err(anyhow!("permission denied"));
        }
        room.camera = Some(enabled);
        Ok(())
    }

    fn local_identity(&self) -> String {
        lock(&self.room).identity.clone()
    }

    fn local_video_tracks(&self) -> Vec<LocalTrackPublication> {
        lock(&self.room)
            .published
            .iter()
            .filter(|p| p.kind == TrackKind::Video)
            .cloned()
            .collect()
    }
}

/// Sink that remembers what it was asked to play through
#[derive(Default)]
pub struct RecordingSink {
    pub attached: Mutex<Vec<String>>,
    pub detached: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn attached(&self) -> Vec<String> {
        lock(&self.attached).clone()
    }

    pub fn detached(&self) -> Vec<String> {
        lock(&self.detached).clone()
    }
}

impl TrackSink for RecordingSink {
    fn attach(&self, track: &RemoteTrack) -> Result<()> {
        lock(&self.attached).push(track.sid.clone());
        Ok(())
    }

    fn detach(&self, track_sid: &str) {
        lock(&self.detached).push(track_sid.to_string());
    }
}
