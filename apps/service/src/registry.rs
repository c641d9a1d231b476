//! Check registry: the authoritative store of check records.
//!
//! The engine only ever lists, reads and rewrites existing records;
//! creating and deleting checks belongs to the account-facing flow.
//! Reads return the raw JSON record on purpose: coercion into a typed
//! [`Check`] is the validator's job, and a malformed record must be
//! observable (and droppable) rather than a deserialization error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use crate::monitoring::types::Check;

#[async_trait]
pub trait CheckRegistry: Send + Sync {
    /// Ids of every registered check.
    async fn list(&self) -> Result<Vec<String>>;

    /// Raw record for one check.
    async fn read(&self, id: &str) -> Result<Value>;

    /// Persist an updated check under its id.
    async fn update(&self, id: &str, check: &Check) -> Result<()>;
}

/// Flat-file registry: one JSON file per check under `<root>/checks/`.
pub struct FileRegistry {
    dir: PathBuf,
}

impl FileRegistry {
    pub fn new(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = data_dir.as_ref().join("checks");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl CheckRegistry for FileRegistry {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await.context("listing check records")?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    ids.push(stem.to_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn read(&self, id: &str) -> Result<Value> {
        let raw = fs::read_to_string(self.record_path(id))
            .await
            .with_context(|| format!("reading check {id}"))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing check {id}"))
    }

    async fn update(&self, id: &str, check: &Check) -> Result<()> {
        let serialized = serde_json::to_string(check)?;
        fs::write(self.record_path(id), serialized)
            .await
            .with_context(|| format!("writing check {id}"))
    }
}
