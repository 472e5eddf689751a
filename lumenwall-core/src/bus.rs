//! Arbitrates the single hardware bus shared by the radio and the storage
//! controller. Collision between the two is a hard fault on this target, so
//! any multi-megabyte fetch or storage-controller operation must hold this
//! lock for its entire duration.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{FrameError, Result};

#[derive(Debug, Default)]
struct Holder {
    tag: Option<String>,
}

/// Named, priority-agnostic lock over the shared radio/storage bus.
///
/// The holder slot is a plain `std::sync::Mutex` (checked and released in a
/// handful of instructions, never held across an `.await`); a
/// `tokio::sync::Notify` wakes waiters on release. This mirrors the
/// channel/queue coordination idiom used elsewhere in the corpus without
/// requiring the guard itself to be `'static`.
#[derive(Debug)]
pub struct BusCoordinator {
    holder: Mutex<Holder>,
    released: Notify,
}

impl Default for BusCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl BusCoordinator {
    pub fn new() -> Self {
        Self {
            holder: Mutex::new(Holder::default()),
            released: Notify::new(),
        }
    }

    /// Block up to `timeout` for exclusive access, recording `requester_tag`
    /// as the holder on success. Not reentrant: a second `acquire` from the
    /// same logical caller contends like any other.
    pub async fn acquire(
        &self,
        timeout: Duration,
        requester_tag: impl Into<String>,
    ) -> Result<BusGuard<'_>> {
        let requester_tag = requester_tag.into();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.try_claim(&requester_tag) {
                debug!(holder = %requester_tag, "bus acquired");
                return Ok(BusGuard { bus: self });
            }

            let remaining = deadline.saturating_duration_since(
                tokio::time::Instant::now(),
            );
            if remaining.is_zero() {
                return Err(FrameError::Timeout(format!(
                    "bus not acquired by {requester_tag} within {timeout:?}"
                )));
            }

            tokio::select! {
                _ = self.released.notified() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    fn try_claim(&self, requester_tag: &str) -> bool {
        let mut holder = self.holder.lock().expect("bus mutex poisoned");
        if holder.tag.is_none() {
            holder.tag = Some(requester_tag.to_string());
            true
        } else {
            false
        }
    }

    fn release(&self) {
        let mut holder = self.holder.lock().expect("bus mutex poisoned");
        if holder.tag.take().is_none() {
            warn!("bus release called with no holder; ignoring");
        }
        drop(holder);
        self.released.notify_waiters();
    }

    /// Non-blocking, best-effort observer for low-priority work to defer
    /// voluntarily rather than contend.
    pub fn is_locked(&self) -> bool {
        self.holder.lock().expect("bus mutex poisoned").tag.is_some()
    }

    pub fn holder(&self) -> Option<String> {
        self.holder.lock().expect("bus mutex poisoned").tag.clone()
    }
}

/// RAII handle returned by [`BusCoordinator::acquire`]; releases on drop.
#[derive(Debug)]
pub struct BusGuard<'a> {
    bus: &'a BusCoordinator,
}

impl Drop for BusGuard<'_> {
    fn drop(&mut self) {
        self.bus.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let bus = BusCoordinator::new();
        let guard = bus.acquire(Duration::from_secs(1), "fetch").await.unwrap();
        assert!(bus.is_locked());

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        let second = bus
            .acquire(Duration::from_millis(500), "scheduler")
            .await
            .unwrap();
        assert_eq!(bus.holder().as_deref(), Some("scheduler"));
        drop(second);
    }

    #[tokio::test]
    async fn acquire_times_out_when_never_released() {
        let bus = BusCoordinator::new();
        let _guard = bus.acquire(Duration::from_secs(5), "fetch").await.unwrap();
        let result = bus.acquire(Duration::from_millis(50), "scheduler").await;
        assert!(matches!(result, Err(FrameError::Timeout(_))));
    }

    #[tokio::test]
    async fn holder_tag_is_observable() {
        let bus = BusCoordinator::new();
        assert_eq!(bus.holder(), None);
        let _guard = bus.acquire(Duration::from_secs(1), "fetch").await.unwrap();
        assert_eq!(bus.holder().as_deref(), Some("fetch"));
    }

    #[test]
    fn double_release_logs_but_does_not_panic() {
        let bus = BusCoordinator::new();
        bus.release();
        assert!(!bus.is_locked());
    }
}
