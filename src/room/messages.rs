use serde::{Deserialize, Serialize};

use crate::audio::AudioFrameMessage;

/// Control messages recognized on the room data channel
///
/// Any other JSON payload is still forwarded to the data handler; these
/// are additionally routed by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Synthesized speech pushed for playback
    AudioFrame(AudioFrameMessage),
    /// Explicit end-of-session notice from the remote agent
    InterviewEnded {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ControlMessage {
    /// Recognize a parsed data packet
    ///
    /// Frames may arrive without the `type` tag; any untagged object with an
    /// `audioData` field is read as an audio frame.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if let Ok(message) = Self::deserialize(value) {
            return Some(message);
        }

        if value.get("type").is_none() && value.get("audioData").is_some() {
            return AudioFrameMessage::deserialize(value)
                .ok()
                .map(Self::AudioFrame);
        }

        None
    }
}
