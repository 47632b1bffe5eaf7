use anyhow::Result;
use tracing::{debug, info};

use crate::error::MediaError;

/// Container/codec candidates in preference order
pub const DEFAULT_FORMAT_PREFERENCES: &[&str] = &[
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/mp4",
    "audio/ogg;codecs=opus",
    "audio/wav",
];

/// The container negotiated for a recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFormat {
    pub mime_type: String,
}

impl RecordingFormat {
    /// Pick the first candidate `is_supported` accepts
    pub fn negotiate<S, F>(candidates: &[S], is_supported: F) -> Result<Self>
    where
        S: AsRef<str>,
        F: Fn(&str) -> bool,
    {
        for candidate in candidates {
            let mime_type = candidate.as_ref();
            if is_supported(mime_type) {
                info!("Negotiated recording format: {}", mime_type);
                return Ok(Self {
                    mime_type: mime_type.to_string(),
                });
            }
            debug!("Recording format not supported: {}", mime_type);
        }

        Err(MediaError::NoSupportedFormat(
            candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        )
        .into())
    }

    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }
}

/// File extension for a negotiated MIME type
pub fn extension_for(mime_type: &str) -> &'static str {
    let mime_type = mime_type.to_ascii_lowercase();
    if mime_type.contains("webm") {
        "webm"
    } else if mime_type.contains("mp4") {
        "mp4"
    } else if mime_type.contains("ogg") {
        "ogg"
    } else {
        "audio"
    }
}
