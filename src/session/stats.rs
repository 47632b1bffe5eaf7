use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::room::{ConnectionState, InterviewEnd};

/// Statistics about an interview session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Whether recording is currently active
    pub is_recording: bool,

    pub connection_state: ConnectionState,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Room events dispatched so far
    pub events_dispatched: usize,

    /// Pushed speech frames scheduled for playback
    pub frames_played: usize,

    /// Pushed speech frames dropped as malformed or unschedulable
    pub frames_dropped: usize,

    /// Encoder chunks captured so far
    pub chunks_count: usize,

    /// Remote participants currently in the room
    pub participants: usize,

    /// How the interview ended, if it has
    pub interview_ended: Option<InterviewEnd>,
}
