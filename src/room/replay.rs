use anyhow::{Context, Result};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::transport::{
    ConnectionState, DisconnectReason, LocalTrack, LocalTrackPublication, ParticipantInfo,
    RemoteTrack, RoomEvent, RoomTransport, TrackKind, TrackSource, TransportFactory,
};
use crate::audio::SoftwareAudioHardware;
use crate::error::MediaError;

/// Extra render time after the last scripted event
pub const DEFAULT_TAIL_MS: u64 = 500;

/// One scripted room event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    ParticipantConnected {
        identity: String,
    },
    ParticipantDisconnected {
        identity: String,
    },
    TrackSubscribed {
        participant: String,
        sid: String,
        kind: TrackKind,
        #[serde(default = "unknown_source")]
        source: TrackSource,
    },
    TrackUnsubscribed {
        participant: String,
        sid: String,
        kind: TrackKind,
    },
    ConnectionState {
        state: ConnectionState,
    },
    Disconnected {
        #[serde(default)]
        reason: Option<DisconnectReason>,
    },
    ActiveSpeakers {
        speakers: Vec<String>,
    },
    /// JSON payload sent on the data channel
    Data {
        #[serde(default)]
        participant: Option<String>,
        payload: serde_json::Value,
    },
    /// Raw text sent on the data channel, not necessarily JSON
    RawData {
        #[serde(default)]
        participant: Option<String>,
        text: String,
    },
    /// Advances the audio clock without emitting anything
    Tick,
}

fn unknown_source() -> TrackSource {
    TrackSource::Unknown
}

impl ScriptEvent {
    fn into_room_event(self) -> Result<Option<RoomEvent>> {
        let event = match self {
            Self::ParticipantConnected { identity } => {
                RoomEvent::ParticipantConnected(ParticipantInfo::new(identity))
            }
            Self::ParticipantDisconnected { identity } => {
                RoomEvent::ParticipantDisconnected(ParticipantInfo::new(identity))
            }
            Self::TrackSubscribed {
                participant,
                sid,
                kind,
                source,
            } => RoomEvent::TrackSubscribed {
                track: RemoteTrack { sid, kind, source },
                participant,
            },
            Self::TrackUnsubscribed {
                participant,
                sid,
                kind,
            } => RoomEvent::TrackUnsubscribed {
                track: RemoteTrack {
                    sid,
                    kind,
                    source: TrackSource::Unknown,
                },
                participant,
            },
            Self::ConnectionState { state } => RoomEvent::ConnectionStateChanged(state),
            Self::Disconnected { reason } => {
                RoomEvent::Disconnected(reason.unwrap_or(DisconnectReason::ServerShutdown))
            }
            Self::ActiveSpeakers { speakers } => RoomEvent::ActiveSpeakersChanged(speakers),
            Self::Data {
                participant,
                payload,
            } => RoomEvent::DataReceived {
                payload: serde_json::to_vec(&payload).context("Failed to encode data payload")?,
                participant,
            },
            Self::RawData { participant, text } => RoomEvent::DataReceived {
                payload: text.into_bytes(),
                participant,
            },
            Self::Tick => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// A scripted event and its offset from connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: ScriptEvent,
}

/// Load a JSON-lines event script, sorted by `at_ms`
///
/// Blank lines and lines starting with `#` are skipped.
pub async fn load_script(path: impl AsRef<Path>) -> Result<Vec<ScriptEntry>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&text).with_context(|| format!("Invalid script {}", path.display()))
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptEntry>> {
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: ScriptEntry =
            serde_json::from_str(line).with_context(|| format!("line {}", index + 1))?;
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.at_ms);
    Ok(entries)
}

/// Transport that replays a recorded event script
///
/// When bound to a software audio graph the graph is rendered up to each
/// event's timestamp before the event is delivered, so pushed speech plays
/// out and lands in the recording between events.
pub struct ReplayTransport {
    script: Vec<ScriptEntry>,
    hardware: Option<Arc<SoftwareAudioHardware>>,
    identity: String,
    tail_ms: u64,
    published: Vec<LocalTrackPublication>,
    microphone_enabled: bool,
    camera_enabled: bool,
    connected: bool,
}

impl ReplayTransport {
    pub fn new(script: Vec<ScriptEntry>, identity: impl Into<String>) -> Self {
        Self {
            script,
            hardware: None,
            identity: identity.into(),
            tail_ms: DEFAULT_TAIL_MS,
            published: Vec::new(),
            microphone_enabled: false,
            camera_enabled: false,
            connected: false,
        }
    }

    pub fn with_hardware(mut self, hardware: Arc<SoftwareAudioHardware>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    pub fn with_tail(mut self, tail_ms: u64) -> Self {
        self.tail_ms = tail_ms;
        self
    }

    pub fn microphone_enabled(&self) -> bool {
        self.microphone_enabled
    }

    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled
    }
}

#[async_trait::async_trait]
impl RoomTransport for ReplayTransport {
    async fn connect(&mut self, url: &str, _token: &str) -> Result<BoxStream<'static, RoomEvent>> {
        info!(
            "Replaying {} scripted events for {} as {}",
            self.script.len(),
            url,
            self.identity
        );

        let mut entries = self.script.clone();
        let end = entries.last().map(|e| e.at_ms).unwrap_or(0) + self.tail_ms;
        entries.push(ScriptEntry {
            at_ms: end,
            event: ScriptEvent::Tick,
        });

        let mut converted = Vec::with_capacity(entries.len());
        for entry in entries {
            let at_ms = entry.at_ms;
            converted.push((at_ms, entry.event.into_room_event()?));
        }

        self.connected = true;
        let hardware = self.hardware.clone();

        let events = stream::iter(converted).filter_map(move |(at_ms, event)| {
            if let Some(hw) = hardware.as_ref() {
                hw.render_until(at_ms as f64 / 1000.0);
            }
            if let Some(event) = event.as_ref() {
                debug!("Replay {}ms: {}", at_ms, event.name());
            }
            futures::future::ready(event)
        });

        Ok(events.boxed())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        self.published.clear();
        Ok(())
    }

    async fn publish_track(&mut self, track: LocalTrack) -> Result<LocalTrackPublication> {
        if !self.connected {
            return Err(MediaError::NotConnected.into());
        }
        let publication = LocalTrackPublication {
            sid: format!("local-{}", self.published.len() + 1),
            kind: track.kind,
            source: track.source,
            stream_id: track.stream.id,
        };
        self.published.push(publication.clone());
        Ok(publication)
    }

    async fn set_microphone_enabled(&mut self, enabled: bool) -> Result<()> {
        self.microphone_enabled = enabled;
        Ok(())
    }

    async fn set_camera_enabled(&mut self, enabled: bool) -> Result<()> {
        self.camera_enabled = enabled;
        Ok(())
    }

    fn local_identity(&self) -> String {
        self.identity.clone()
    }

    fn local_video_tracks(&self) -> Vec<LocalTrackPublication> {
        self.published
            .iter()
            .filter(|p| p.kind == TrackKind::Video)
            .cloned()
            .collect()
    }
}

/// Hands out a fresh `ReplayTransport` for every connection
pub struct ReplayFactory {
    script: Vec<ScriptEntry>,
    identity: String,
    hardware: Option<Arc<SoftwareAudioHardware>>,
    tail_ms: u64,
}

impl ReplayFactory {
    pub fn new(script: Vec<ScriptEntry>, identity: impl Into<String>) -> Self {
        Self {
            script,
            identity: identity.into(),
            hardware: None,
            tail_ms: DEFAULT_TAIL_MS,
        }
    }

    pub fn with_hardware(mut self, hardware: Arc<SoftwareAudioHardware>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    pub fn with_tail(mut self, tail_ms: u64) -> Self {
        self.tail_ms = tail_ms;
        self
    }
}

impl TransportFactory for ReplayFactory {
    fn create(&self) -> Box<dyn RoomTransport> {
        let mut transport =
            ReplayTransport::new(self.script.clone(), self.identity.clone()).with_tail(self.tail_ms);
        if let Some(hw) = self.hardware.as_ref() {
            transport = transport.with_hardware(Arc::clone(hw));
        }
        Box::new(transport)
    }
}
