//! The download scheduler: a single long-lived worker that round-robins
//! over configured channels, cooperates with the bus coordinator, and hands
//! completed downloads off to playback.
//!
//! Modeled as one Tokio task that yields after every iteration rather than
//! running at a lower OS thread priority — Tokio has no priority scheduling
//! primitive, so "lower priority than the render task" is expressed here as
//! a cooperative yield plus short sleeps, never a tight poll loop. The
//! render task gets its own dedicated OS thread instead (see
//! `lumenwall-render`) precisely so this task competing for CPU on the
//! shared runtime never matters.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lumenwall_model::{ChannelId, ContainerTag, EntryKind, StorageKey};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, instrument, warn};

use crate::bus::BusCoordinator;
use crate::channel::{ChannelHandle, ChannelRegistry};
use crate::error::Result;
use crate::failure::FailureTracker;
use crate::fetch::Fetcher;
use crate::vault::Vault;

/// Vault objects kept on disk before LRU-by-mtime eviction.
pub const DEFAULT_CACHE_LIMIT: usize = 1000;

const BUS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);
const ITERATION_YIELD: Duration = Duration::from_millis(100);

/// Callback interface into the playback coordinator. An external
/// collaborator implements this; the scheduler only calls it.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    async fn on_download_complete(&self, channel: &ChannelId, key: &StorageKey);
    async fn trigger_initial_playback(&self);
}

#[derive(Debug, Clone)]
struct ChannelState {
    id: ChannelId,
    cursor: usize,
    scanned_to_end: bool,
    network_backed: bool,
}

#[derive(Debug, Default)]
struct SchedulerState {
    order: Vec<ChannelState>,
    registry: ChannelRegistry,
    round_robin: usize,
    signature: u64,
}

fn signature_of(order: &[ChannelState]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for ch in order {
        ch.id.as_str().hash(&mut hasher);
    }
    order.len().hash(&mut hasher);
    hasher.finish()
}

struct Candidate {
    channel: ChannelId,
    key: StorageKey,
    path: PathBuf,
    url: String,
    container: ContainerTag,
}

/// Configuration for building origin URLs and budgeting the bus poll.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub catalog_host: String,
    pub bus_acquire_ceiling: Duration,
    pub cache_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            catalog_host: String::new(),
            bus_acquire_ceiling: Duration::from_secs(120),
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

/// Single long-lived download worker. Owns no filesystem state directly;
/// all I/O is delegated to [`Vault`], [`FailureTracker`], and [`Fetcher`].
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    vault: Vault,
    failure_tracker: FailureTracker,
    fetcher: Fetcher,
    bus: Arc<BusCoordinator>,
    config: SchedulerConfig,
    network_ready: AtomicBool,
    storage_mounted: AtomicBool,
    downloads_needed: Notify,
    busy_channel: Mutex<Option<ChannelId>>,
    played_first_download: AtomicBool,
    sink: Arc<dyn PlaybackSink>,
    bus_locked_skips: AtomicU64,
}

impl Scheduler {
    pub fn new(
        vault: Vault,
        bus: Arc<BusCoordinator>,
        config: SchedulerConfig,
        sink: Arc<dyn PlaybackSink>,
    ) -> Result<Self> {
        let failure_tracker = FailureTracker::new(vault.root().to_path_buf());
        let fetcher = Fetcher::new(config.bus_acquire_ceiling)?;
        Ok(Self {
            state: Mutex::new(SchedulerState::default()),
            vault,
            failure_tracker,
            fetcher,
            bus,
            config,
            network_ready: AtomicBool::new(false),
            storage_mounted: AtomicBool::new(false),
            downloads_needed: Notify::new(),
            busy_channel: Mutex::new(None),
            played_first_download: AtomicBool::new(false),
            sink,
            bus_locked_skips: AtomicU64::new(0),
        })
    }

    pub fn set_network_ready(&self, ready: bool) {
        self.network_ready.store(ready, Ordering::Relaxed);
        if ready {
            self.downloads_needed.notify_waiters();
        }
    }

    pub fn set_storage_mounted(&self, mounted: bool) {
        self.storage_mounted.store(mounted, Ordering::Relaxed);
        if mounted {
            self.downloads_needed.notify_waiters();
        }
    }

    /// Replace the configured channel list (ordered, ≤16). Bumps the
    /// signature so any in-flight snapshot's commit is discarded.
    pub async fn set_channels(&self, ids: Vec<ChannelId>) {
        let mut state = self.state.lock().await;
        state.order = ids
            .into_iter()
            .map(|id| ChannelState {
                id,
                cursor: 0,
                scanned_to_end: false,
                network_backed: true,
            })
            .collect();
        state.round_robin = 0;
        state.signature = signature_of(&state.order);
        drop(state);
        self.downloads_needed.notify_waiters();
    }

    pub async fn update_channel_catalog(&self, id: ChannelId, handle: ChannelHandle) {
        let mut state = self.state.lock().await;
        state.registry.insert(id, handle);
    }

    /// Reset all channels to `Scanning` (lowers the scanned-to-end flags)
    /// and wakes the worker. Called when new entries arrive upstream.
    pub async fn signal_work_available(&self) {
        let mut state = self.state.lock().await;
        for ch in &mut state.order {
            ch.scanned_to_end = false;
        }
        drop(state);
        self.downloads_needed.notify_waiters();
    }

    pub async fn reset_cursors(&self) {
        let mut state = self.state.lock().await;
        for ch in &mut state.order {
            ch.cursor = 0;
            ch.scanned_to_end = false;
        }
    }

    pub async fn is_busy(&self) -> bool {
        self.busy_channel.lock().await.is_some()
    }

    pub async fn active_channel(&self) -> Option<ChannelId> {
        self.busy_channel.lock().await.clone()
    }

    /// Number of iterations skipped because the bus was still locked past
    /// the acquire ceiling, for observability.
    pub fn bus_locked_skip_count(&self) -> u64 {
        self.bus_locked_skips.load(Ordering::Relaxed)
    }

    /// Run the scheduler loop forever. Intended to be spawned as its own
    /// `tokio::task`.
    #[instrument(skip(self), name = "scheduler")]
    pub async fn run(&self) {
        loop {
            self.run_once().await;
            tokio::time::sleep(ITERATION_YIELD).await;
        }
    }

    async fn run_once(&self) {
        self.wait_for_readiness().await;

        if !self.wait_for_bus_free().await {
            self.bus_locked_skips.fetch_add(1, Ordering::Relaxed);
            debug!("bus still locked past ceiling, skipping iteration");
            return;
        }

        let (order, registry, round_robin, signature) = {
            let state = self.state.lock().await;
            (
                state.order.clone(),
                state.registry.clone(),
                state.round_robin,
                state.signature,
            )
        };

        let Some((candidate, new_order, new_round_robin)) =
            self.find_candidate(order, &registry, round_robin).await
        else {
            self.downloads_needed.notify_waiters();
            self.wait_for_work_signal().await;
            return;
        };

        self.commit_snapshot(new_order, new_round_robin, signature)
            .await;

        self.dispatch(candidate).await;
    }

    async fn wait_for_readiness(&self) {
        loop {
            if self.network_ready.load(Ordering::Relaxed)
                && self.storage_mounted.load(Ordering::Relaxed)
            {
                return;
            }
            tokio::time::sleep(BUS_POLL_INTERVAL).await;
        }
    }

    /// Poll with 1-second sleeps up to `bus_acquire_ceiling`; returns false
    /// if the bus is still locked once the ceiling is reached.
    async fn wait_for_bus_free(&self) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.bus_acquire_ceiling;
        loop {
            if !self.bus.is_locked() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(BUS_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_work_signal(&self) {
        tokio::select! {
            _ = self.downloads_needed.notified() => {}
            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
        }
    }

    /// The round-robin scan from the spec, operating purely on the owned
    /// snapshot — no lock held, no I/O performed on shared state.
    async fn find_candidate(
        &self,
        mut order: Vec<ChannelState>,
        registry: &ChannelRegistry,
        round_robin: usize,
    ) -> Option<(Candidate, Vec<ChannelState>, usize)> {
        let len = order.len();
        if len == 0 {
            return None;
        }

        for offset in 0..len {
            let idx = (round_robin + offset) % len;

            if !order[idx].network_backed || order[idx].scanned_to_end {
                continue;
            }

            let id = order[idx].id.clone();
            let Some(handle) = registry.find(&id) else {
                continue;
            };

            while let Some(descriptor) = handle.next_missing(&mut order[idx].cursor) {
                if descriptor.kind != EntryKind::Artwork {
                    continue;
                }

                let key = descriptor.id.storage_key();
                if self.vault.exists(&key, descriptor.container).await {
                    continue;
                }
                if self.vault.is_marked_missing(&key, descriptor.container).await {
                    continue;
                }
                if !self.failure_tracker.can_download(&key).await {
                    continue;
                }

                let path = self.vault.path_for(&key, descriptor.container);
                let url = self.origin_url(&key, descriptor.container);
                let new_round_robin = (idx + 1) % len;
                return Some((
                    Candidate {
                        channel: id,
                        key,
                        path,
                        url,
                        container: descriptor.container,
                    },
                    order,
                    new_round_robin,
                ));
            }

            order[idx].scanned_to_end = true;
        }

        None
    }

    fn origin_url(&self, key: &StorageKey, container: ContainerTag) -> String {
        let fingerprint = lumenwall_model::Fingerprint::of(key);
        let (hh1, hh2, hh3) = fingerprint.shard_hex();
        format!(
            "https://{}/api/vault/{hh1}/{hh2}/{hh3}/{}.{}",
            self.config.catalog_host,
            key.as_str(),
            container.extension()
        )
    }

    /// Write back cursor/round-robin advances only if nothing reconfigured
    /// the channel list since the snapshot was taken.
    async fn commit_snapshot(
        &self,
        new_order: Vec<ChannelState>,
        new_round_robin: usize,
        snapshot_signature: u64,
    ) {
        let mut state = self.state.lock().await;
        if state.signature != snapshot_signature {
            debug!("channel list changed mid-scan, discarding snapshot commit");
            return;
        }
        state.order = new_order;
        state.round_robin = new_round_robin;
    }

    async fn dispatch(&self, candidate: Candidate) {
        if tokio::fs::try_exists(&candidate.path).await.unwrap_or(false) {
            self.downloads_needed.notify_waiters();
            return;
        }

        let stale_tmp = candidate.path.with_extension(format!(
            "{}.tmp",
            candidate.container.extension()
        ));
        let _ = tokio::fs::remove_file(&stale_tmp).await;

        if let Err(err) = self.vault.ensure_cache_limit(self.config.cache_limit).await {
            warn!(%err, "cache limit enforcement failed");
        }

        *self.busy_channel.lock().await = Some(candidate.channel.clone());

        let result = self
            .fetcher
            .fetch(
                &self.bus,
                &self.vault,
                &candidate.url,
                &candidate.key,
                candidate.container,
                None,
            )
            .await;

        *self.busy_channel.lock().await = None;

        match result {
            Ok(_) => {
                if let Err(err) = self.failure_tracker.clear(&candidate.key).await {
                    warn!(%err, "failed to clear failure tracker entry");
                }
                self.sink
                    .on_download_complete(&candidate.channel, &candidate.key)
                    .await;
                if !self.played_first_download.swap(true, Ordering::Relaxed) {
                    info!("first successful download of the boot cycle, triggering playback");
                    self.sink.trigger_initial_playback().await;
                }
                self.downloads_needed.notify_waiters();
            }
            Err(crate::error::FrameError::NotFound(_)) => {
                if let Err(err) = self
                    .vault
                    .mark_missing(&candidate.key, candidate.container)
                    .await
                {
                    warn!(%err, "failed to write 404 marker");
                }
            }
            Err(err) => {
                warn!(%err, key = %candidate.key, "download failed");
                if let Err(record_err) = self.failure_tracker.record_failure(&candidate.key).await
                {
                    warn!(%record_err, "failed to record failure");
                }
                tokio::time::sleep(ERROR_BACKOFF).await;
                self.downloads_needed.notify_waiters();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenwall_model::{AssetDescriptor, AssetId, RECORD_LEN};

    struct NullSink;

    #[async_trait]
    impl PlaybackSink for NullSink {
        async fn on_download_complete(&self, _channel: &ChannelId, _key: &StorageKey) {}
        async fn trigger_initial_playback(&self) {}
    }

    fn descriptor(fill: u8) -> AssetDescriptor {
        AssetDescriptor {
            id: AssetId::from_bytes([fill; 16]),
            container: ContainerTag::Png,
            kind: EntryKind::Artwork,
            reserved: [0u8; RECORD_LEN - 18],
        }
    }

    async fn scheduler_with_channels(
        dir: &std::path::Path,
        ids: Vec<&str>,
    ) -> Scheduler {
        let vault = Vault::new(dir.to_path_buf());
        let bus = Arc::new(BusCoordinator::new());
        let config = SchedulerConfig {
            catalog_host: "frames.example.com".to_string(),
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(vault, bus, config, Arc::new(NullSink)).unwrap();
        scheduler
            .set_channels(ids.into_iter().map(|s| ChannelId::new(s).unwrap()).collect())
            .await;
        scheduler
    }

    #[tokio::test]
    async fn find_candidate_skips_already_vaulted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with_channels(dir.path(), vec!["daily"]).await;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&descriptor(1).to_record());
        bytes.extend_from_slice(&descriptor(2).to_record());
        let handle = ChannelHandle::from_bytes(&bytes).unwrap();
        scheduler
            .update_channel_catalog(ChannelId::new("daily").unwrap(), handle)
            .await;

        let already = descriptor(1).id.storage_key();
        scheduler
            .vault
            .store(&already, ContainerTag::Png, b"x")
            .await
            .unwrap();

        let (order, registry, rr, _sig) = {
            let state = scheduler.state.lock().await;
            (
                state.order.clone(),
                state.registry.clone(),
                state.round_robin,
                state.signature,
            )
        };
        let found = scheduler.find_candidate(order, &registry, rr).await;
        let (candidate, _, _) = found.expect("second entry should be a candidate");
        assert_eq!(candidate.key.as_str(), descriptor(2).id.storage_key().as_str());
    }

    #[tokio::test]
    async fn empty_channel_list_yields_no_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with_channels(dir.path(), vec![]).await;
        let (order, registry, rr, _) = {
            let state = scheduler.state.lock().await;
            (
                state.order.clone(),
                state.registry.clone(),
                state.round_robin,
                state.signature,
            )
        };
        assert!(scheduler.find_candidate(order, &registry, rr).await.is_none());
    }

    #[tokio::test]
    async fn round_robin_advances_past_served_channel() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with_channels(dir.path(), vec!["a", "b"]).await;

        for (name, fill) in [("a", 10u8), ("b", 20u8)] {
            let handle = ChannelHandle::from_bytes(&descriptor(fill).to_record()).unwrap();
            scheduler
                .update_channel_catalog(ChannelId::new(name).unwrap(), handle)
                .await;
        }

        let (order, registry, rr, _) = {
            let state = scheduler.state.lock().await;
            (
                state.order.clone(),
                state.registry.clone(),
                state.round_robin,
                state.signature,
            )
        };
        let (candidate, _, new_rr) =
            scheduler.find_candidate(order, &registry, rr).await.unwrap();
        assert_eq!(candidate.channel.as_str(), "a");
        assert_eq!(new_rr, 1);
    }
}
