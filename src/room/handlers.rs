use serde::Serialize;

use super::transport::{ConnectionState, DisconnectReason, ParticipantInfo, RemoteTrack};

/// Speaker partition reported on every active-speakers change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpeakerActivity {
    /// The local participant is among the speakers
    pub user_speaking: bool,
    /// Some remote participant (the AI interviewer) is speaking
    pub ai_speaking: bool,
    pub speakers: Vec<String>,
}

/// What signalled the end of the interview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum InterviewEnd {
    /// The remote agent sent an explicit end-of-session message
    ControlMessage { reason: Option<String> },
    /// A participant whose identity looks like the interviewer left
    ParticipantLeft { identity: String },
}

/// Optional callbacks for session events; unset entries are skipped
#[derive(Default)]
pub struct EventHandlers {
    pub(crate) on_connected: Option<Box<dyn FnMut() + Send>>,
    pub(crate) on_disconnected: Option<Box<dyn FnMut(&DisconnectReason) + Send>>,
    pub(crate) on_error: Option<Box<dyn FnMut(&anyhow::Error) + Send>>,
    pub(crate) on_track_subscribed: Option<Box<dyn FnMut(&RemoteTrack, &str) + Send>>,
    pub(crate) on_track_unsubscribed: Option<Box<dyn FnMut(&RemoteTrack, &str) + Send>>,
    pub(crate) on_participant_connected: Option<Box<dyn FnMut(&ParticipantInfo) + Send>>,
    pub(crate) on_participant_disconnected: Option<Box<dyn FnMut(&ParticipantInfo) + Send>>,
    pub(crate) on_interview_ended: Option<Box<dyn FnMut(&InterviewEnd) + Send>>,
    pub(crate) on_connection_state_changed: Option<Box<dyn FnMut(ConnectionState) + Send>>,
    pub(crate) on_active_speakers_changed: Option<Box<dyn FnMut(&SpeakerActivity) + Send>>,
    pub(crate) on_data_received: Option<Box<dyn FnMut(&serde_json::Value, Option<&str>) + Send>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_connected = Some(Box::new(f));
        self
    }

    pub fn on_disconnected(mut self, f: impl FnMut(&DisconnectReason) + Send + 'static) -> Self {
        self.on_disconnected = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&anyhow::Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_track_subscribed(mut self, f: impl FnMut(&RemoteTrack, &str) + Send + 'static) -> Self {
        self.on_track_subscribed = Some(Box::new(f));
        self
    }

    pub fn on_track_unsubscribed(mut self, f: impl FnMut(&RemoteTrack, &str) + Send + 'static) -> Self {
        self.on_track_unsubscribed = Some(Box::new(f));
        self
    }

    pub fn on_participant_connected(mut self, f: impl FnMut(&ParticipantInfo) + Send + 'static) -> Self {
        self.on_participant_connected = Some(Box::new(f));
        self
    }

    pub fn on_participant_disconnected(
        mut self,
        f: impl FnMut(&ParticipantInfo) + Send + 'static,
    ) -> Self {
        self.on_participant_disconnected = Some(Box::new(f));
        self
    }

    pub fn on_interview_ended(mut self, f: impl FnMut(&InterviewEnd) + Send + 'static) -> Self {
        self.on_interview_ended = Some(Box::new(f));
        self
    }

    pub fn on_connection_state_changed(mut self, f: impl FnMut(ConnectionState) + Send + 'static) -> Self {
        self.on_connection_state_changed = Some(Box::new(f));
        self
    }

    pub fn on_active_speakers_changed(mut self, f: impl FnMut(&SpeakerActivity) + Send + 'static) -> Self {
        self.on_active_speakers_changed = Some(Box::new(f));
        self
    }

    pub fn on_data_received(
        mut self,
        f: impl FnMut(&serde_json::Value, Option<&str>) + Send + 'static,
    ) -> Self {
        self.on_data_received = Some(Box::new(f));
        self
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        [
            self.on_connected.is_some(),
            self.on_disconnected.is_some(),
            self.on_error.is_some(),
            self.on_track_subscribed.is_some(),
            self.on_track_unsubscribed.is_some(),
            self.on_participant_connected.is_some(),
            self.on_participant_disconnected.is_some(),
            self.on_interview_ended.is_some(),
            self.on_connection_state_changed.is_some(),
            self.on_active_speakers_changed.is_some(),
            self.on_data_received.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
