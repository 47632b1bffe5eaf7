//! Interview session orchestration
//!
//! This module provides the `InterviewSession` abstraction that ties together:
//! - The room connection and its event stream
//! - Playback of pushed speech frames
//! - Recording of the mixed session audio
//! - Session statistics

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::InterviewSession;
pub use stats::SessionStats;
