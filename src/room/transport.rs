use anyhow::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a room, as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    Unknown,
}

/// A track subscribed from a remote participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub sid: String,
    pub kind: TrackKind,
    #[serde(default = "unknown_source")]
    pub source: TrackSource,
}

fn unknown_source() -> TrackSource {
    TrackSource::Unknown
}

/// A remote participant and the tracks subscribed from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub identity: String,
    #[serde(default)]
    pub tracks: Vec<RemoteTrack>,
}

impl ParticipantInfo {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            tracks: Vec::new(),
        }
    }
}

/// Why the room went away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    ClientInitiated,
    ServerShutdown,
    ParticipantRemoved,
    RoomDeleted,
    JoinFailure,
    Unknown(String),
}

/// Low-level notifications delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    TrackSubscribed {
        track: RemoteTrack,
        participant: String,
    },
    TrackUnsubscribed {
        track: RemoteTrack,
        participant: String,
    },
    ParticipantConnected(ParticipantInfo),
    ParticipantDisconnected(ParticipantInfo),
    ConnectionStateChanged(ConnectionState),
    Disconnected(DisconnectReason),
    /// Identities currently speaking
    ActiveSpeakersChanged(Vec<String>),
    DataReceived {
        payload: Vec<u8>,
        participant: Option<String>,
    },
}

impl RoomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrackSubscribed { .. } => "track_subscribed",
            Self::TrackUnsubscribed { .. } => "track_unsubscribed",
            Self::ParticipantConnected(_) => "participant_connected",
            Self::ParticipantDisconnected(_) => "participant_disconnected",
            Self::ConnectionStateChanged(_) => "connection_state_changed",
            Self::Disconnected(_) => "disconnected",
            Self::ActiveSpeakersChanged(_) => "active_speakers_changed",
            Self::DataReceived { .. } => "data_received",
        }
    }
}

/// An externally acquired capture stream (microphone or camera)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStream {
    pub id: String,
    pub label: String,
}

impl CaptureStream {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// A local track ready to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub kind: TrackKind,
    pub source: TrackSource,
    pub stream: CaptureStream,
}

impl LocalTrack {
    pub fn microphone(stream: CaptureStream) -> Self {
        Self {
            kind: TrackKind::Audio,
            source: TrackSource::Microphone,
            stream,
        }
    }

    pub fn camera(stream: CaptureStream) -> Self {
        Self {
            kind: TrackKind::Video,
            source: TrackSource::Camera,
            stream,
        }
    }
}

/// A track the local participant has published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrackPublication {
    pub sid: String,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub stream_id: String,
}

/// Realtime room transport capability
///
/// The room service itself lives outside this crate; implementations adapt
/// a concrete SDK. Events for the connection are delivered on the stream
/// returned by `connect`.
#[async_trait::async_trait]
pub trait RoomTransport: Send + Sync {
    async fn connect(&mut self, url: &str, token: &str) -> Result<BoxStream<'static, RoomEvent>>;

    async fn disconnect(&mut self) -> Result<()>;

    async fn publish_track(&mut self, track: LocalTrack) -> Result<LocalTrackPublication>;

    async fn set_microphone_enabled(&mut self, enabled: bool) -> Result<()>;

    async fn set_camera_enabled(&mut self, enabled: bool) -> Result<()>;

    /// Identity of the local participant
    fn local_identity(&self) -> String;

    /// Video tracks currently published by the local participant
    fn local_video_tracks(&self) -> Vec<LocalTrackPublication>;
}

/// Creates one transport per connection attempt
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn RoomTransport>;
}

/// Passive playthrough for subscribed remote audio tracks
pub trait TrackSink: Send + Sync {
    fn attach(&self, track: &RemoteTrack) -> Result<()>;

    fn detach(&self, track_sid: &str);
}

/// Sink that only logs; used when no playthrough device is wanted
#[derive(Debug, Default)]
pub struct LoggingSink;

impl TrackSink for LoggingSink {
    fn attach(&self, track: &RemoteTrack) -> Result<()> {
        tracing::debug!("Playthrough attached for track {}", track.sid);
        Ok(())
    }

    fn detach(&self, track_sid: &str) {
        tracing::debug!("Playthrough detached for track {}", track_sid);
    }
}
