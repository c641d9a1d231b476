//! Evaluation log storage: append-only segments with compressed archives.
//!
//! Every evaluation appends one JSON line to the check's active segment
//! (`<id>.log`). Rotation compresses the whole segment into
//! `<archive-id>.gz.b64` (gzip, then base64, preserving the segment
//! byte-for-byte) and truncates the active file only once the archive is
//! safely on disk. Archives are never deleted or re-opened here.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::monitoring::types::EvalLogEntry;

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("log segment io: {0}")]
    Io(#[from] std::io::Error),
    #[error("log entry serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait EvalLogStore: Send + Sync {
    /// Append one entry to the check's active segment, creating it on
    /// first use.
    async fn append(&self, id: &str, entry: &EvalLogEntry) -> Result<(), LogStoreError>;

    /// Ids of segments with at least one entry waiting to be rotated.
    async fn list_active(&self) -> Result<Vec<String>, LogStoreError>;

    /// Archive the active segment's content under `archive_id`.
    async fn compress(&self, id: &str, archive_id: &str) -> Result<(), LogStoreError>;

    /// Reset the active segment to empty.
    async fn truncate(&self, id: &str) -> Result<(), LogStoreError>;
}

/// File-backed log store under `<root>/logs/`.
pub struct FileLogStore {
    dir: PathBuf,
}

impl FileLogStore {
    pub fn new(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = data_dir.as_ref().join("logs");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn segment_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.log"))
    }

    fn archive_path(&self, archive_id: &str) -> PathBuf {
        self.dir.join(format!("{archive_id}.gz.b64"))
    }
}

#[async_trait]
impl EvalLogStore for FileLogStore {
    async fn append(&self, id: &str, entry: &EvalLogEntry) -> Result<(), LogStoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut segment = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.segment_path(id))
            .await?;
        segment.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<String>, LogStoreError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Archives carry a `.b64` extension, so this picks up active
            // segments only; freshly truncated ones are skipped until
            // they grow again.
            if path.extension().is_some_and(|ext| ext == "log")
                && entry.metadata().await?.len() > 0
            {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    ids.push(stem.to_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn compress(&self, id: &str, archive_id: &str) -> Result<(), LogStoreError> {
        let contents = fs::read(self.segment_path(id)).await?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&contents)?;
        let compressed = encoder.finish()?;

        fs::write(self.archive_path(archive_id), BASE64.encode(compressed)).await?;
        Ok(())
    }

    async fn truncate(&self, id: &str) -> Result<(), LogStoreError> {
        fs::File::create(self.segment_path(id)).await?;
        Ok(())
    }
}
