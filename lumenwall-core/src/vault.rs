//! Content-addressed, power-loss-safe artifact storage.
//!
//! Grounded on the teacher's atomic temp-rename blob store
//! (`infra/cache/image_file_store.rs`'s `write_if_missing`), generalized to
//! the three-level lowercase-hex shard layout, the `.json`/`.404`/`.tmp`
//! sibling family, and `ensure_cache_limit` LRU-by-mtime eviction (not
//! present in the teacher; added here, grounded on the same file's
//! mtime-keyed bookkeeping idiom).

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use lumenwall_model::{ContainerTag, StorageKey};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FrameError, Result};

/// Content-addressed, shard-hashed blob store rooted at a single directory.
#[derive(Clone, Debug)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pure path derivation: storage key -> fingerprint -> sharded path.
    /// Three shard levels, lowercase hex, extension from the container tag.
    pub fn path_for(&self, key: &StorageKey, container: ContainerTag) -> PathBuf {
        let fingerprint = lumenwall_model::Fingerprint::of(key);
        let (hh1, hh2, hh3) = fingerprint.shard_hex();
        self.root
            .join(hh1)
            .join(hh2)
            .join(hh3)
            .join(format!("{}.{}", key.as_str(), container.extension()))
    }

    fn sidecar_path(&self, final_path: &Path, extension: &str) -> PathBuf {
        final_path.with_extension(extension)
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                FrameError::IoFailure(err)
            })?;
        }
        Ok(())
    }

    /// Materialize shard directories if absent, then atomically write
    /// `bytes` to `final_path` via `<final>.tmp` + fsync + rename. A
    /// pre-existing final path is a successful no-op (deduplication).
    pub async fn store(
        &self,
        key: &StorageKey,
        container: ContainerTag,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let final_path = self.path_for(key, container);
        if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            return Ok(final_path);
        }

        self.ensure_parent(&final_path).await?;
        let tmp_path = final_path.with_extension(format!(
            "{}.tmp-{}",
            container.extension(),
            Uuid::new_v4().simple()
        ));

        let result = self.write_tmp_and_rename(&tmp_path, &final_path, bytes).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }
        result?;
        Ok(final_path)
    }

    async fn write_tmp_and_rename(
        &self,
        tmp_path: &Path,
        final_path: &Path,
        bytes: &[u8],
    ) -> Result<()> {
        let mut file = tokio::fs::File::create(tmp_path)
            .await
            .map_err(FrameError::IoFailure)?;
        file.write_all(bytes).await.map_err(FrameError::IoFailure)?;
        file.sync_all().await.map_err(FrameError::IoFailure)?;
        drop(file);

        if tokio::fs::try_exists(final_path).await.unwrap_or(false) {
            // Another writer won the race; our copy is redundant.
            return Ok(());
        }

        tokio::fs::rename(tmp_path, final_path)
            .await
            .map_err(FrameError::IoFailure)
    }

    /// True iff `final_path` is a regular file. Performs lazy cleanup of an
    /// abandoned `<final>.tmp` first, which is how the system recovers from
    /// a mid-write power loss without a boot-time scan.
    pub async fn exists(&self, key: &StorageKey, container: ContainerTag) -> bool {
        let final_path = self.path_for(key, container);
        self.cleanup_stale_tmp(&final_path).await;
        tokio::fs::try_exists(&final_path).await.unwrap_or(false)
    }

    async fn cleanup_stale_tmp(&self, final_path: &Path) {
        let Some(parent) = final_path.parent() else {
            return;
        };
        let Some(stem) = final_path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let Ok(mut entries) = tokio::fs::read_dir(parent).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(stem) && name.contains(".tmp-") {
                if let Ok(meta) = entry.metadata().await {
                    if meta.is_file() {
                        let _ = tokio::fs::remove_file(entry.path()).await;
                    }
                }
            }
        }
    }

    pub async fn delete(&self, key: &StorageKey, container: ContainerTag) -> Result<()> {
        let path = self.path_for(key, container);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FrameError::IoFailure(err)),
        }
    }

    pub async fn store_sidecar(
        &self,
        key: &StorageKey,
        container: ContainerTag,
        json: &str,
    ) -> Result<()> {
        let final_path = self.path_for(key, container);
        let sidecar = self.sidecar_path(&final_path, "json");
        self.ensure_parent(&sidecar).await?;
        let tmp = sidecar.with_extension(format!("json.tmp-{}", Uuid::new_v4().simple()));
        let result = self
            .write_tmp_and_rename(&tmp, &sidecar, json.as_bytes())
            .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    pub async fn read_sidecar(
        &self,
        key: &StorageKey,
        container: ContainerTag,
    ) -> Result<Option<String>> {
        let final_path = self.path_for(key, container);
        let sidecar = self.sidecar_path(&final_path, "json");
        match tokio::fs::read_to_string(&sidecar).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FrameError::IoFailure(err)),
        }
    }

    pub async fn delete_sidecar(
        &self,
        key: &StorageKey,
        container: ContainerTag,
    ) -> Result<()> {
        let final_path = self.path_for(key, container);
        let sidecar = self.sidecar_path(&final_path, "json");
        match tokio::fs::remove_file(&sidecar).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FrameError::IoFailure(err)),
        }
    }

    /// Writes a `.404` marker containing the decimal epoch-seconds timestamp
    /// the marker was created at.
    pub async fn mark_missing(
        &self,
        key: &StorageKey,
        container: ContainerTag,
    ) -> Result<()> {
        let final_path = self.path_for(key, container);
        let marker = self.sidecar_path(&final_path, "404");
        self.ensure_parent(&marker).await?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        tokio::fs::write(&marker, format!("{now}\n")).await.map_err(FrameError::IoFailure)
    }

    pub async fn is_marked_missing(
        &self,
        key: &StorageKey,
        container: ContainerTag,
    ) -> bool {
        let final_path = self.path_for(key, container);
        let marker = self.sidecar_path(&final_path, "404");
        tokio::fs::try_exists(&marker).await.unwrap_or(false)
    }

    /// Walk the vault, collect all regular blob files with their mtimes, and
    /// if the count exceeds `n`, unlink the `(count - n)` oldest by mtime.
    /// Touching an asset's mtime on playback (the renderer's job) is the
    /// mechanism that protects hot items from eviction.
    pub async fn ensure_cache_limit(&self, n: usize) -> Result<usize> {
        let mut files = Vec::new();
        self.collect_blob_files(&self.root, &mut files).await?;

        if files.len() <= n {
            return Ok(0);
        }

        files.sort_by_key(|(_, mtime)| *mtime);
        let evict_count = files.len() - n;
        let mut evicted = 0;
        for (path, _) in files.into_iter().take(evict_count) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => evicted += 1,
                Err(err) => warn!(?path, %err, "failed to evict vault entry"),
            }
        }
        debug!(evicted, limit = n, "vault cache limit enforced");
        Ok(evicted)
    }

    fn collect_blob_files<'a>(
        &'a self,
        dir: &'a Path,
        out: &'a mut Vec<(PathBuf, SystemTime)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(FrameError::IoFailure(err)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(FrameError::IoFailure)?
            {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(FrameError::IoFailure)?;
                if file_type.is_dir() {
                    self.collect_blob_files(&path, out).await?;
                    continue;
                }
                if !is_blob_path(&path) {
                    continue;
                }
                if let Ok(meta) = entry.metadata().await {
                    let mtime = meta.modified().unwrap_or(UNIX_EPOCH);
                    out.push((path, mtime));
                }
            }
            Ok(())
        })
    }
}

fn is_blob_path(path: &Path) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") | Some("404") | Some("fail") => false,
        Some(ext) => !ext.starts_with("tmp"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenwall_model::{AssetId, StorageKey};

    fn key() -> StorageKey {
        AssetId::from_bytes([0x11; 16]).storage_key()
    }

    fn key_n(n: u8) -> StorageKey {
        AssetId::from_bytes([n; 16]).storage_key()
    }

    #[tokio::test]
    async fn store_is_idempotent_and_exists_reports_it() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());
        let k = key();

        assert!(!vault.exists(&k, ContainerTag::Png).await);
        vault.store(&k, ContainerTag::Png, b"hello").await.unwrap();
        assert!(vault.exists(&k, ContainerTag::Png).await);

        // Second store is a silent no-op, not an error.
        vault.store(&k, ContainerTag::Png, b"hello again").await.unwrap();
        let path = vault.path_for(&k, ContainerTag::Png);
        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents, b"hello");
    }

    #[tokio::test]
    async fn path_uses_three_shard_levels_and_tag_extension() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());
        let k = key();
        let path = vault.path_for(&k, ContainerTag::Jpeg);
        let rel = path.strip_prefix(dir.path()).unwrap();
        assert_eq!(rel.components().count(), 4);
        assert_eq!(path.extension().unwrap(), "jpg");
    }

    #[tokio::test]
    async fn exists_cleans_up_abandoned_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());
        let k = key();
        let final_path = vault.path_for(&k, ContainerTag::Gif);
        tokio::fs::create_dir_all(final_path.parent().unwrap())
            .await
            .unwrap();
        let tmp = final_path.with_extension("gif.tmp-deadbeef");
        tokio::fs::write(&tmp, b"partial").await.unwrap();

        assert!(!vault.exists(&k, ContainerTag::Gif).await);
        assert!(!tokio::fs::try_exists(&tmp).await.unwrap());
    }

    #[tokio::test]
    async fn marker_and_blob_are_tracked_independently() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());
        let k = key();
        assert!(!vault.is_marked_missing(&k, ContainerTag::Png).await);
        vault.mark_missing(&k, ContainerTag::Png).await.unwrap();
        assert!(vault.is_marked_missing(&k, ContainerTag::Png).await);
        assert!(!vault.exists(&k, ContainerTag::Png).await);
    }

    #[tokio::test]
    async fn ensure_cache_limit_evicts_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());

        for i in 0..5u8 {
            let k = key_n(i);
            vault.store(&k, ContainerTag::Png, b"x").await.unwrap();
        }

        let evicted = vault.ensure_cache_limit(3).await.unwrap();
        assert_eq!(evicted, 2);
        let mut remaining = Vec::new();
        vault.collect_blob_files(&dir.path().to_path_buf(), &mut remaining).await.unwrap();
        assert_eq!(remaining.len(), 3);
    }

    #[tokio::test]
    async fn sidecar_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path().to_path_buf());
        let k = key();
        assert!(vault.read_sidecar(&k, ContainerTag::Png).await.unwrap().is_none());
        vault
            .store_sidecar(&k, ContainerTag::Png, r#"{"kind":"artwork"}"#)
            .await
            .unwrap();
        let read = vault.read_sidecar(&k, ContainerTag::Png).await.unwrap();
        assert_eq!(read.as_deref(), Some(r#"{"kind":"artwork"}"#));
        vault.delete_sidecar(&k, ContainerTag::Png).await.unwrap();
        assert!(vault.read_sidecar(&k, ContainerTag::Png).await.unwrap().is_none());
    }
}
