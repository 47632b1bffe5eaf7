use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::handlers::{EventHandlers, InterviewEnd, SpeakerActivity};
use super::messages::ControlMessage;
use super::transport::{
    CaptureStream, ConnectionState, DisconnectReason, LocalTrack, LocalTrackPublication,
    ParticipantInfo, RemoteTrack, RoomEvent, RoomTransport, TrackKind, TrackSink,
    TransportFactory,
};
use crate::audio::AudioFrame;
use crate::error::MediaError;

/// Identity fragments that mark the remote interviewer
pub const DEFAULT_END_IDENTITY_MARKERS: &[&str] = &["interviewer", "agent", "bot"];

/// Address and access token for a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCredentials {
    pub url: String,
    pub token: String,
}

impl RoomCredentials {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Case-insensitive identity fragments whose departure ends the interview
    pub end_identity_markers: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            end_identity_markers: DEFAULT_END_IDENTITY_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl ControllerConfig {
    /// Whether `identity` looks like the remote interviewer
    pub fn is_interviewer(&self, identity: &str) -> bool {
        let identity = identity.to_lowercase();
        self.end_identity_markers
            .iter()
            .any(|marker| identity.contains(&marker.to_lowercase()))
    }
}

/// Owns one room connection and turns its events into session signals
///
/// Events are pulled by the caller (`next_event` + `dispatch`); nothing runs
/// in the background.
pub struct SessionController {
    config: ControllerConfig,
    factory: Arc<dyn TransportFactory>,
    sink: Arc<dyn TrackSink>,
    handlers: EventHandlers,
    transport: Option<Box<dyn RoomTransport>>,
    events: Option<BoxStream<'static, RoomEvent>>,
    state: ConnectionState,
    connected: bool,
    participants: HashMap<String, ParticipantInfo>,
    local_tracks: Vec<LocalTrackPublication>,
    attached: BTreeSet<String>,
    speakers: SpeakerActivity,
    interview_ended: Option<InterviewEnd>,
}

impl SessionController {
    pub fn new(
        config: ControllerConfig,
        factory: Arc<dyn TransportFactory>,
        sink: Arc<dyn TrackSink>,
    ) -> Self {
        Self {
            config,
            factory,
            sink,
            handlers: EventHandlers::default(),
            transport: None,
            events: None,
            state: ConnectionState::Disconnected,
            connected: false,
            participants: HashMap::new(),
            local_tracks: Vec::new(),
            attached: BTreeSet::new(),
            speakers: SpeakerActivity::default(),
            interview_ended: None,
        }
    }

    /// Replace the callback table
    pub fn set_handlers(&mut self, handlers: EventHandlers) {
        self.handlers = handlers;
    }

    /// Connect to a room, replacing any existing connection
    pub async fn connect(&mut self, credentials: &RoomCredentials) -> Result<()> {
        if credentials.url.trim().is_empty() {
            error!("Cannot connect: room URL is missing");
            return Err(MediaError::MissingCredentials("room url").into());
        }
        if credentials.token.trim().is_empty() {
            error!("Cannot connect: access token is missing");
            return Err(MediaError::MissingCredentials("access token").into());
        }

        if self.transport.is_some() {
            info!("Replacing existing room connection");
            self.teardown().await;
        }

        info!("Connecting to room at {}", credentials.url);
        self.state = ConnectionState::Connecting;
        self.interview_ended = None;

        let mut transport = self.factory.create();
        match transport.connect(&credentials.url, &credentials.token).await {
            Ok(events) => {
                self.transport = Some(transport);
                self.events = Some(events);
                self.state = ConnectionState::Connected;
                self.connected = true;

                info!("Connected to room");
                if let Some(cb) = self.handlers.on_connected.as_mut() {
                    cb();
                }
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.connected = false;

                error!("Failed to connect to room: {:#}", e);
                if let Some(cb) = self.handlers.on_error.as_mut() {
                    cb(&e);
                }
                Err(e)
            }
        }
    }

    /// Next transport event, or `None` when not connected or the stream ended
    pub async fn next_event(&mut self) -> Option<RoomEvent> {
        match self.events.as_mut() {
            Some(events) => events.next().await,
            None => None,
        }
    }

    /// Handle one transport event
    ///
    /// Returns a frame when the event carried pushed speech audio; the
    /// caller routes it to the playback path.
    pub fn dispatch(&mut self, event: RoomEvent) -> Option<AudioFrame> {
        debug!("Room event: {}", event.name());

        match event {
            RoomEvent::TrackSubscribed { track, participant } => {
                self.on_track_subscribed(track, participant);
                None
            }
            RoomEvent::TrackUnsubscribed { track, participant } => {
                self.on_track_unsubscribed(track, participant);
                None
            }
            RoomEvent::ParticipantConnected(info) => {
                info!("Participant connected: {}", info.identity);
                if let Some(cb) = self.handlers.on_participant_connected.as_mut() {
                    cb(&info);
                }
                self.participants.insert(info.identity.clone(), info);
                None
            }
            RoomEvent::ParticipantDisconnected(info) => {
                self.on_participant_disconnected(info);
                None
            }
            RoomEvent::ConnectionStateChanged(state) => {
                info!("Connection state: {} -> {}", self.state, state);
                self.state = state;
                self.connected = state == ConnectionState::Connected;
                if let Some(cb) = self.handlers.on_connection_state_changed.as_mut() {
                    cb(state);
                }
                None
            }
            RoomEvent::Disconnected(reason) => {
                self.on_room_disconnected(reason);
                None
            }
            RoomEvent::ActiveSpeakersChanged(speakers) => {
                self.on_active_speakers(speakers);
                None
            }
            RoomEvent::DataReceived {
                payload,
                participant,
            } => self.on_data(&payload, participant.as_deref()),
        }
    }

    fn on_track_subscribed(&mut self, track: RemoteTrack, participant: String) {
        info!(
            "Track subscribed: {} ({:?}) from {}",
            track.sid, track.kind, participant
        );

        if track.kind == TrackKind::Audio {
            match self.sink.attach(&track) {
                Ok(()) => {
                    self.attached.insert(track.sid.clone());
                }
                Err(e) => warn!("Failed to attach playthrough for {}: {:#}", track.sid, e),
            }
        }

        if let Some(cb) = self.handlers.on_track_subscribed.as_mut() {
            cb(&track, &participant);
        }

        let entry = self
            .participants
            .entry(participant.clone())
            .or_insert_with(|| ParticipantInfo::new(participant));
        if !entry.tracks.iter().any(|t| t.sid == track.sid) {
            entry.tracks.push(track);
        }
    }

    fn on_track_unsubscribed(&mut self, track: RemoteTrack, participant: String) {
        info!("Track unsubscribed: {} from {}", track.sid, participant);

        if self.attached.remove(&track.sid) {
            self.sink.detach(&track.sid);
        }

        if let Some(entry) = self.participants.get_mut(&participant) {
            entry.tracks.retain(|t| t.sid != track.sid);
        }

        if let Some(cb) = self.handlers.on_track_unsubscribed.as_mut() {
            cb(&track, &participant);
        }
    }

    fn on_participant_disconnected(&mut self, info: ParticipantInfo) {
        info!("Participant disconnected: {}", info.identity);

        if let Some(known) = self.participants.remove(&info.identity) {
            for track in &known.tracks {
                if self.attached.remove(&track.sid) {
                    self.sink.detach(&track.sid);
                }
            }
        }

        if let Some(cb) = self.handlers.on_participant_disconnected.as_mut() {
            cb(&info);
        }

        if self.config.is_interviewer(&info.identity) {
            self.end_interview(InterviewEnd::ParticipantLeft {
                identity: info.identity,
            });
        }
    }

    fn on_room_disconnected(&mut self, reason: DisconnectReason) {
        info!("Room disconnected: {:?}", reason);

        self.state = ConnectionState::Disconnected;
        self.connected = false;

        let mut handlers = std::mem::take(&mut self.handlers);
        if let Some(cb) = handlers.on_disconnected.as_mut() {
            cb(&reason);
        }
    }

    fn on_active_speakers(&mut self, speakers: Vec<String>) {
        let local = match self.local_identity() {
            Some(identity) if !identity.is_empty() => identity,
            _ => {
                warn!("Ignoring active speakers: local identity unknown");
                return;
            }
        };

        let user_speaking = speakers.iter().any(|s| *s == local);
        let ai_speaking = speakers.iter().any(|s| *s != local);

        self.speakers = SpeakerActivity {
            user_speaking,
            ai_speaking,
            speakers,
        };

        debug!(
            "Active speakers: user={} ai={}",
            self.speakers.user_speaking, self.speakers.ai_speaking
        );

        if let Some(cb) = self.handlers.on_active_speakers_changed.as_mut() {
            cb(&self.speakers);
        }
    }

    fn on_data(&mut self, payload: &[u8], participant: Option<&str>) -> Option<AudioFrame> {
        let text = match std::str::from_utf8(payload) {
            Ok(t) => t,
            Err(e) => {
                warn!("Dropping data packet: invalid UTF-8: {}", e);
                return None;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse data packet: {}", e);
                return None;
            }
        };

        if let Some(cb) = self.handlers.on_data_received.as_mut() {
            cb(&value, participant);
        }

        match ControlMessage::from_value(&value) {
            Some(ControlMessage::AudioFrame(message)) => match message.into_frame() {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!("Dropping audio frame message: {:#}", e);
                    None
                }
            },
            Some(ControlMessage::InterviewEnded { reason }) => {
                self.end_interview(InterviewEnd::ControlMessage { reason });
                None
            }
            None => None,
        }
    }

    fn end_interview(&mut self, end: InterviewEnd) {
        if self.interview_ended.is_some() {
            debug!("Interview already ended; ignoring {:?}", end);
            return;
        }

        info!("Interview ended: {:?}", end);
        if let Some(cb) = self.handlers.on_interview_ended.as_mut() {
            cb(&end);
        }
        self.interview_ended = Some(end);
    }

    /// Toggle publication of the local microphone
    pub async fn set_microphone_enabled(&mut self, enabled: bool) -> bool {
        let transport = match self.transport.as_mut() {
            Some(t) => t,
            None => {
                warn!("Cannot toggle microphone: not connected");
                return false;
            }
        };

        match transport.set_microphone_enabled(enabled).await {
            Ok(()) => {
                info!("Microphone {}", if enabled { "enabled" } else { "disabled" });
                true
            }
            Err(e) => {
                error!("Failed to toggle microphone: {:#}", e);
                false
            }
        }
    }

    /// Toggle publication of the local camera
    pub async fn set_camera_enabled(&mut self, enabled: bool) -> bool {
        let transport = match self.transport.as_mut() {
            Some(t) => t,
            None => {
                warn!("Cannot toggle camera: not connected");
                return false;
            }
        };

        match transport.set_camera_enabled(enabled).await {
            Ok(()) => {
                info!("Camera {}", if enabled { "enabled" } else { "disabled" });
                true
            }
            Err(e) => {
                error!("Failed to toggle camera: {:#}", e);
                false
            }
        }
    }

    /// Publish capture streams acquired outside the controller
    ///
    /// Either stream may be absent. Video is skipped when a local video
    /// track is already published.
    pub async fn publish_existing_tracks(
        &mut self,
        audio: Option<CaptureStream>,
        video: Option<CaptureStream>,
    ) -> bool {
        let transport = match self.transport.as_mut() {
            Some(t) => t,
            None => {
                warn!("Cannot publish tracks: not connected");
                return false;
            }
        };

        let mut tracks = Vec::new();
        if let Some(stream) = audio {
            tracks.push(LocalTrack::microphone(stream));
        }
        if let Some(stream) = video {
            if transport.local_video_tracks().is_empty() {
                tracks.push(LocalTrack::camera(stream));
            } else {
                info!("Local video already published; skipping {}", stream.id);
            }
        }

        for track in tracks {
            let kind = track.kind;
            match transport.publish_track(track).await {
                Ok(publication) => {
                    info!("Published {:?} track {}", kind, publication.sid);
                    self.local_tracks.push(publication);
                }
                Err(e) => {
                    error!("Failed to publish {:?} track: {:#}", kind, e);
                    return false;
                }
            }
        }

        true
    }

    /// Leave the room and reset to the initial state; never fails
    pub async fn disconnect(&mut self, intentional: bool) {
        info!("Disconnecting from room (intentional={})", intentional);
        self.teardown().await;
        self.handlers = EventHandlers::default();
        self.interview_ended = None;
    }

    async fn teardown(&mut self) {
        for sid in std::mem::take(&mut self.attached) {
            self.sink.detach(&sid);
        }

        self.events = None;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.disconnect().await {
                warn!("Transport disconnect failed: {:#}", e);
            }
        }

        self.state = ConnectionState::Disconnected;
        self.connected = false;
        self.participants.clear();
        self.local_tracks.clear();
        self.speakers = SpeakerActivity::default();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantInfo> {
        self.participants.values()
    }

    pub fn participant(&self, identity: &str) -> Option<&ParticipantInfo> {
        self.participants.get(identity)
    }

    pub fn local_tracks(&self) -> &[LocalTrackPublication] {
        &self.local_tracks
    }

    pub fn active_speakers(&self) -> &SpeakerActivity {
        &self.speakers
    }

    pub fn local_identity(&self) -> Option<String> {
        self.transport.as_ref().map(|t| t.local_identity())
    }

    /// How the interview ended, if it has
    pub fn interview_ended(&self) -> Option<&InterviewEnd> {
        self.interview_ended.as_ref()
    }

    pub fn attached_sinks(&self) -> usize {
        self.attached.len()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
