use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for an interview session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "interview-2025-10-28-backend")
    pub session_id: String,

    /// Where finished recordings are written
    pub output_dir: PathBuf,

    /// Stop pumping events once the interview has ended
    pub stop_on_interview_end: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("interview-{}", uuid::Uuid::new_v4()),
            output_dir: PathBuf::from("recordings"),
            stop_on_interview_end: true,
        }
    }
}
