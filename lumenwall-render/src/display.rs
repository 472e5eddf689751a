//! Double/triple-buffered display engine: acquires a Free buffer, hands it
//! to a frame producer, applies overlays, flushes cache, and submits to DMA.
//! With three buffers this is the full triple-buffer state machine from the
//! data model; with two it degrades to vsync-gated ping-pong.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use lumenwall_model::{BufferState, Rotation};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::decode::BorderColor;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("display engine not initialized")]
    NotInitialized,
    #[error("mode switch timed out waiting for the GUI toolkit")]
    ModeSwitchTimeout,
    #[error("invalid buffer count {0}, must be 2 or 3")]
    InvalidBufferCount(usize),
}

pub type Result<T> = std::result::Result<T, DisplayError>;

/// Render task operating mode. UI mode yields scan-out to the external GUI
/// toolkit; Animation is the bypass path this pipeline drives directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Animation,
    Ui,
}

/// Hook for the panel driver's DMA engine. A real implementation submits
/// `buffer_index` for scan-out and, on completion, calls the engine's vsync
/// callback; this trait only models the submission side.
pub trait Dma: Send + Sync {
    fn submit(&self, buffer_index: usize);
}

/// Hook for flushing CPU caches before DMA reads an uncached SPI-mapped
/// framebuffer. A no-op on targets where the buffer is already coherent.
pub trait CacheFlush: Send + Sync {
    fn flush(&self, buffer_index: usize);
}

/// Vsync source: the real ISR signals completion; tests and the dedicated
/// render thread use a `Condvar`-backed implementation.
pub trait VsyncSource: Send + Sync {
    fn wait_for_vsync(&self);
}

fn state_from_u8(raw: u8) -> BufferState {
    match raw {
        0 => BufferState::Free,
        1 => BufferState::Rendering,
        2 => BufferState::Pending,
        _ => BufferState::Displaying,
    }
}

fn u8_from_state(state: BufferState) -> u8 {
    match state {
        BufferState::Free => 0,
        BufferState::Rendering => 1,
        BufferState::Pending => 2,
        BufferState::Displaying => 3,
    }
}

/// One framebuffer slot's state, tracked with an atomic rather than a mutex
/// so the hot render path never blocks on the state itself.
struct Slot {
    state: AtomicU8,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(u8_from_state(BufferState::Free)),
        }
    }

    fn get(&self) -> BufferState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    /// Attempt `current -> next`, enforcing the state machine's legal
    /// transitions. Returns false (no-op) on an illegal transition rather
    /// than panicking, since a racing promotion is a recoverable condition.
    fn transition(&self, next: BufferState) -> bool {
        let current = self.get();
        if !current.can_transition_to(next) {
            warn!(?current, ?next, "rejected illegal buffer state transition");
            return false;
        }
        self.state.store(u8_from_state(next), Ordering::Release);
        true
    }
}

/// Counting semaphore over Free buffers, implemented with a `Condvar` so it
/// works from the dedicated render OS thread without a Tokio runtime.
struct FreeSemaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl FreeSemaphore {
    fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        while *count == 0 {
            count = self.cond.wait(count).expect("semaphore mutex poisoned");
        }
        *count -= 1;
    }

    fn release(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        *count += 1;
        self.cond.notify_one();
    }
}

/// Owns the framebuffer slots and drives the triple/double-buffer state
/// machine. Pixel memory itself is out of scope here (owned by the panel
/// driver); this type only tracks which slot is in which state.
pub struct DisplayEngine {
    slots: Vec<Slot>,
    free_permits: FreeSemaphore,
    pending: Mutex<Option<usize>>,
    displaying: Mutex<Option<usize>>,
    rotation: Mutex<Rotation>,
    background: Mutex<BorderColor>,
    mode: Mutex<DisplayMode>,
}

impl DisplayEngine {
    pub fn new(buffer_count: usize) -> Result<Self> {
        if buffer_count != 2 && buffer_count != 3 {
            return Err(DisplayError::InvalidBufferCount(buffer_count));
        }
        Ok(Self {
            slots: (0..buffer_count).map(|_| Slot::new()).collect(),
            free_permits: FreeSemaphore::new(buffer_count),
            pending: Mutex::new(None),
            displaying: Mutex::new(None),
            rotation: Mutex::new(Rotation::default()),
            background: Mutex::new(BorderColor::from_rgb(0, 0, 0)),
            mode: Mutex::new(DisplayMode::Animation),
        })
    }

    pub fn buffer_count(&self) -> usize {
        self.slots.len()
    }

    pub fn mode(&self) -> DisplayMode {
        *self.mode.lock().expect("mode mutex poisoned")
    }

    pub fn set_rotation(&self, rotation: Rotation) {
        *self.rotation.lock().expect("rotation mutex poisoned") = rotation;
    }

    pub fn rotation(&self) -> Rotation {
        *self.rotation.lock().expect("rotation mutex poisoned")
    }

    /// Background color the hardware scale path fills the border strips
    /// with (§4.7). Set once from configuration; read by the frame
    /// producer before every `compose_scaled_frame` call.
    pub fn set_background(&self, color: BorderColor) {
        *self.background.lock().expect("background mutex poisoned") = color;
    }

    pub fn background(&self) -> BorderColor {
        *self.background.lock().expect("background mutex poisoned")
    }

    /// Block (on the Free semaphore) until a buffer is available, then mark
    /// it Rendering. Returns the slot index.
    #[instrument(skip(self))]
    pub fn acquire_free(&self) -> usize {
        self.free_permits.acquire();
        let idx = self
            .slots
            .iter()
            .position(|slot| slot.get() == BufferState::Free)
            .expect("semaphore permit implies a Free slot exists");
        self.slots[idx].transition(BufferState::Rendering);
        idx
    }

    /// Submit a Rendering buffer to DMA, marking it Pending. If another
    /// buffer is already Pending, waits on vsync first so at most one
    /// Pending ever exists (the invariant from the data model).
    pub fn submit(
        &self,
        idx: usize,
        dma: &dyn Dma,
        cache: &dyn CacheFlush,
        vsync: &dyn VsyncSource,
    ) {
        cache.flush(idx);

        while self.pending.lock().expect("pending mutex poisoned").is_some() {
            vsync.wait_for_vsync();
            self.promote_pending_to_displaying();
        }

        self.slots[idx].transition(BufferState::Pending);
        *self.pending.lock().expect("pending mutex poisoned") = Some(idx);
        dma.submit(idx);
    }

    /// Vsync completion callback: promotes Pending -> Displaying, demotes
    /// the previous Displaying -> Free, and releases the Free semaphore.
    pub fn promote_pending_to_displaying(&self) {
        let pending_idx = {
            let mut pending = self.pending.lock().expect("pending mutex poisoned");
            pending.take()
        };
        let Some(pending_idx) = pending_idx else {
            return;
        };

        if !self.slots[pending_idx].transition(BufferState::Displaying) {
            return;
        }

        let previous = {
            let mut displaying = self.displaying.lock().expect("displaying mutex poisoned");
            displaying.replace(pending_idx)
        };

        if let Some(previous_idx) = previous {
            self.slots[previous_idx].transition(BufferState::Free);
            self.free_permits.release();
        }

        debug!(buffer = pending_idx, "promoted to displaying");
    }

    pub fn slot_state(&self, idx: usize) -> BufferState {
        self.slots[idx].get()
    }

    /// Cooperative mode switch: the caller (render task) unwinds the
    /// current mode and calls this once ready; a bounded poll elsewhere
    /// detects a hang (this type just records the intent).
    pub fn request_mode(&self, mode: DisplayMode) {
        *self.mode.lock().expect("mode mutex poisoned") = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct NullDma;
    impl Dma for NullDma {
        fn submit(&self, _buffer_index: usize) {}
    }

    struct NullCache;
    impl CacheFlush for NullCache {
        fn flush(&self, _buffer_index: usize) {}
    }

    struct ImmediateVsync(AtomicUsize);
    impl VsyncSource for ImmediateVsync {
        fn wait_for_vsync(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn rejects_invalid_buffer_counts() {
        assert!(DisplayEngine::new(1).is_err());
        assert!(DisplayEngine::new(4).is_err());
        assert!(DisplayEngine::new(2).is_ok());
        assert!(DisplayEngine::new(3).is_ok());
    }

    #[test]
    fn full_cycle_free_rendering_pending_displaying_free() {
        let engine = DisplayEngine::new(3).unwrap();
        let dma = NullDma;
        let cache = NullCache;
        let vsync = ImmediateVsync(AtomicUsize::new(0));

        let first = engine.acquire_free();
        assert_eq!(engine.slot_state(first), BufferState::Rendering);

        engine.submit(first, &dma, &cache, &vsync);
        assert_eq!(engine.slot_state(first), BufferState::Pending);

        engine.promote_pending_to_displaying();
        assert_eq!(engine.slot_state(first), BufferState::Displaying);

        let second = engine.acquire_free();
        engine.submit(second, &dma, &cache, &vsync);
        engine.promote_pending_to_displaying();

        assert_eq!(engine.slot_state(first), BufferState::Free);
        assert_eq!(engine.slot_state(second), BufferState::Displaying);
    }

    #[test]
    fn at_most_one_pending_and_one_displaying() {
        let engine = DisplayEngine::new(3).unwrap();
        let dma = NullDma;
        let cache = NullCache;
        let vsync = ImmediateVsync(AtomicUsize::new(0));

        for _ in 0..3 {
            let idx = engine.acquire_free();
            engine.submit(idx, &dma, &cache, &vsync);
            engine.promote_pending_to_displaying();
        }

        let pending_count = engine
            .slots
            .iter()
            .filter(|s| s.get() == BufferState::Pending)
            .count();
        let displaying_count = engine
            .slots
            .iter()
            .filter(|s| s.get() == BufferState::Displaying)
            .count();
        assert_eq!(pending_count, 0);
        assert_eq!(displaying_count, 1);
    }

    #[test]
    fn rotation_round_trips() {
        let engine = DisplayEngine::new(2).unwrap();
        assert_eq!(engine.rotation(), Rotation::Deg0);
        engine.set_rotation(Rotation::Deg90);
        assert_eq!(engine.rotation(), Rotation::Deg90);
    }

    #[test]
    fn background_round_trips() {
        let engine = DisplayEngine::new(2).unwrap();
        assert_eq!(engine.background(), BorderColor::from_rgb(0, 0, 0));
        engine.set_background(BorderColor::from_rgb(12, 34, 56));
        assert_eq!(engine.background(), BorderColor::from_rgb(12, 34, 56));
    }
}
