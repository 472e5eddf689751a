//! Per-asset failure counter, persisted as a `.fail` sidecar beside the
//! vault blob so it survives reboots.

use std::path::PathBuf;

use lumenwall_model::{Fingerprint, StorageKey};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{FrameError, Result};

/// Attempts at or above this count make an asset terminal: skipped by the
/// scheduler until explicitly cleared by a successful fetch.
pub const TERMINAL_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
struct FailureRecord {
    count: u32,
}

/// Tracks download failure counts for storage keys, one `.fail` JSON sidecar
/// per key, written with the vault's atomic temp-rename discipline.
#[derive(Clone, Debug)]
pub struct FailureTracker {
    root: PathBuf,
}

impl FailureTracker {
    pub fn new(vault_root: PathBuf) -> Self {
        Self { root: vault_root }
    }

    fn path_for(&self, key: &StorageKey) -> PathBuf {
        let fingerprint = Fingerprint::of(key);
        let (hh1, hh2, hh3) = fingerprint.shard_hex();
        self.root
            .join(hh1)
            .join(hh2)
            .join(hh3)
            .join(format!("{}.fail", key.as_str()))
    }

    async fn read(&self, key: &StorageKey) -> FailureRecord {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => FailureRecord::default(),
        }
    }

    async fn write(&self, key: &StorageKey, record: FailureRecord) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(FrameError::IoFailure)?;
        }
        let tmp = path.with_extension(format!("fail.tmp-{}", Uuid::new_v4().simple()));
        let body = serde_json::to_vec(&record)
            .map_err(|err| FrameError::InvalidResponse(err.to_string()))?;

        let result: Result<()> = async {
            let mut file = tokio::fs::File::create(&tmp)
                .await
                .map_err(FrameError::IoFailure)?;
            file.write_all(&body).await.map_err(FrameError::IoFailure)?;
            file.sync_all().await.map_err(FrameError::IoFailure)?;
            drop(file);
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(FrameError::IoFailure)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    /// False iff the counter has reached [`TERMINAL_THRESHOLD`].
    pub async fn can_download(&self, key: &StorageKey) -> bool {
        self.read(key).await.count < TERMINAL_THRESHOLD
    }

    pub async fn record_failure(&self, key: &StorageKey) -> Result<u32> {
        let mut record = self.read(key).await;
        record.count += 1;
        self.write(key, record).await?;
        if record.count >= TERMINAL_THRESHOLD {
            debug!(key = %key, count = record.count, "asset now terminal");
        }
        Ok(record.count)
    }

    /// Called on successful fetch, or on a successful playback that renders
    /// a previously-failing object.
    pub async fn clear(&self, key: &StorageKey) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FrameError::IoFailure(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenwall_model::AssetId;

    fn key() -> StorageKey {
        AssetId::from_bytes([0x42; 16]).storage_key()
    }

    #[tokio::test]
    async fn fresh_key_can_download() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FailureTracker::new(dir.path().to_path_buf());
        assert!(tracker.can_download(&key()).await);
    }

    #[tokio::test]
    async fn becomes_terminal_after_threshold_failures() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FailureTracker::new(dir.path().to_path_buf());
        let k = key();
        for _ in 0..TERMINAL_THRESHOLD {
            tracker.record_failure(&k).await.unwrap();
        }
        assert!(!tracker.can_download(&k).await);
    }

    #[tokio::test]
    async fn clear_resets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FailureTracker::new(dir.path().to_path_buf());
        let k = key();
        for _ in 0..TERMINAL_THRESHOLD {
            tracker.record_failure(&k).await.unwrap();
        }
        assert!(!tracker.can_download(&k).await);
        tracker.clear(&k).await.unwrap();
        assert!(tracker.can_download(&k).await);
    }
}
