use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use super::format::extension_for;

/// A finalized recording: the concatenated encoder chunks
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    /// Encoded container bytes
    pub data: Vec<u8>,
    /// Negotiated MIME type
    pub mime_type: String,
    /// Size in bytes
    pub size: usize,
    /// When the artifact was materialized
    pub created_at: DateTime<Utc>,
}

impl RecordingArtifact {
    /// Concatenate chunks in order
    pub fn from_chunks(chunks: &[Vec<u8>], mime_type: &str) -> Self {
        let data = chunks.concat();
        Self {
            size: data.len(),
            data,
            mime_type: mime_type.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }

    /// Download name, e.g. `interview-recording-2026-10-16T09-30-12-345Z.webm`
    pub fn file_name(&self) -> String {
        let stamp = self
            .created_at
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
            .replace(|c: char| c == ':' || c == '.', "-");
        format!("interview-recording-{}.{}", stamp, self.extension())
    }

    /// Write the artifact into `dir` under its download name
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

        let path = dir.join(self.file_name());
        tokio::fs::write(&path, &self.data)
            .await
            .with_context(|| format!("Failed to write recording: {}", path.display()))?;

        info!(
            "Recording saved: {} ({} bytes, {})",
            path.display(),
            self.size,
            self.mime_type
        );

        Ok(path)
    }
}
