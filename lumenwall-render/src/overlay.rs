//! Overlay compositing: the FPS counter and the processing-indicator
//! tri-state, both drawn into the back buffer after frame rendering and
//! before cache flush.

use std::time::{Duration, Instant};

/// 5x7 bitmap font glyph set, ASCII digits and a handful of symbols used by
/// the FPS overlay. Each glyph is 7 rows of a 5-bit mask, MSB-first.
pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
pub const OVERLAY_UPSCALE: u32 = 2;

const FPS_REFRESH: Duration = Duration::from_secs(1);
const PROCESSING_TIMEOUT: Duration = Duration::from_secs(5);
const FAILED_HOLD: Duration = Duration::from_secs(3);

/// Throttles FPS computation/redraw to 1 Hz regardless of actual frame rate.
#[derive(Debug)]
pub struct FpsOverlay {
    enabled: bool,
    frames_since_refresh: u32,
    last_refresh: Option<Instant>,
    displayed_fps: u32,
}

impl FpsOverlay {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            frames_since_refresh: 0,
            last_refresh: None,
            displayed_fps: 0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Call once per rendered frame. Returns the value to display if this
    /// call crossed a 1-second boundary, `None` otherwise.
    pub fn note_frame(&mut self, now: Instant) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        self.frames_since_refresh += 1;
        match self.last_refresh {
            None => {
                self.last_refresh = Some(now);
                None
            }
            Some(last) if now.duration_since(last) >= FPS_REFRESH => {
                self.displayed_fps = self.frames_since_refresh;
                self.frames_since_refresh = 0;
                self.last_refresh = Some(now);
                Some(self.displayed_fps)
            }
            Some(_) => None,
        }
    }

    pub fn displayed_fps(&self) -> u32 {
        self.displayed_fps
    }
}

/// Tri-state processing indicator: Idle while nothing is happening,
/// Processing while a playback swap is pending, Failed for a few seconds
/// after a timeout before returning to Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Idle,
    Processing,
    Failed,
}

#[derive(Debug)]
pub struct ProcessingIndicator {
    enabled: bool,
    state: IndicatorState,
    started_at: Option<Instant>,
    failed_at: Option<Instant>,
}

impl ProcessingIndicator {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: IndicatorState::Idle,
            started_at: None,
            failed_at: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    /// Called when the user requests a playback swap.
    pub fn start(&mut self, now: Instant) {
        self.state = IndicatorState::Processing;
        self.started_at = Some(now);
        self.failed_at = None;
    }

    /// Called on completion; clears back to Idle from any state.
    pub fn success(&mut self) {
        self.state = IndicatorState::Idle;
        self.started_at = None;
        self.failed_at = None;
    }

    /// Drive the timeout/hold state machine; call once per frame (or
    /// overlay refresh tick) with the current time.
    pub fn tick(&mut self, now: Instant) {
        match self.state {
            IndicatorState::Processing => {
                if let Some(started) = self.started_at {
                    if now.duration_since(started) >= PROCESSING_TIMEOUT {
                        self.state = IndicatorState::Failed;
                        self.failed_at = Some(now);
                    }
                }
            }
            IndicatorState::Failed => {
                if let Some(failed) = self.failed_at {
                    if now.duration_since(failed) >= FAILED_HOLD {
                        self.state = IndicatorState::Idle;
                        self.failed_at = None;
                    }
                }
            }
            IndicatorState::Idle => {}
        }
    }
}

/// A single glyph cell position for the 5x7 font, already 2x-upscaled.
#[derive(Debug, Clone, Copy)]
pub struct GlyphCell {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Lay out `text` (digits only, for the FPS counter) starting at
/// `(origin_x, origin_y)`, top-right anchored by the caller.
pub fn layout_digits(text: &str, origin_x: u32, origin_y: u32) -> Vec<GlyphCell> {
    let cell_w = GLYPH_WIDTH * OVERLAY_UPSCALE;
    let cell_h = GLYPH_HEIGHT * OVERLAY_UPSCALE;
    text.chars()
        .enumerate()
        .map(|(i, _)| GlyphCell {
            x: origin_x + i as u32 * (cell_w + OVERLAY_UPSCALE),
            y: origin_y,
            width: cell_w,
            height: cell_h,
        })
        .collect()
}

/// Checkerboard fill pattern for the processing-indicator triangle: true
/// where the pixel should be drawn in the indicator color, false where the
/// background shows through.
pub fn checkerboard(x: u32, y: u32) -> bool {
    (x / 2 + y / 2) % 2 == 0
}

/// Indicator color for a given state; `None` when nothing should be drawn
/// (Idle, or disabled by config).
pub fn indicator_color(state: IndicatorState) -> Option<(u8, u8, u8)> {
    match state {
        IndicatorState::Idle => None,
        IndicatorState::Processing => Some((0, 0, 255)),
        IndicatorState::Failed => Some((255, 0, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_overlay_refreshes_once_per_second() {
        let mut overlay = FpsOverlay::new(true);
        let t0 = Instant::now();
        assert_eq!(overlay.note_frame(t0), None);
        assert_eq!(overlay.note_frame(t0 + Duration::from_millis(500)), None);
        let fps = overlay.note_frame(t0 + Duration::from_secs(1));
        assert_eq!(fps, Some(2));
    }

    #[test]
    fn fps_overlay_disabled_never_reports() {
        let mut overlay = FpsOverlay::new(false);
        let t0 = Instant::now();
        assert_eq!(overlay.note_frame(t0), None);
        assert_eq!(overlay.note_frame(t0 + Duration::from_secs(2)), None);
    }

    #[test]
    fn processing_indicator_times_out_to_failed_then_idle() {
        let mut indicator = ProcessingIndicator::new(true);
        let t0 = Instant::now();
        indicator.start(t0);
        assert_eq!(indicator.state(), IndicatorState::Processing);

        indicator.tick(t0 + Duration::from_secs(6));
        assert_eq!(indicator.state(), IndicatorState::Failed);

        indicator.tick(t0 + Duration::from_secs(6) + Duration::from_secs(4));
        assert_eq!(indicator.state(), IndicatorState::Idle);
    }

    #[test]
    fn processing_indicator_success_clears_from_any_state() {
        let mut indicator = ProcessingIndicator::new(true);
        let t0 = Instant::now();
        indicator.start(t0);
        indicator.success();
        assert_eq!(indicator.state(), IndicatorState::Idle);
    }

    #[test]
    fn indicator_colors_match_processing_and_failed() {
        assert_eq!(indicator_color(IndicatorState::Idle), None);
        assert_eq!(indicator_color(IndicatorState::Processing), Some((0, 0, 255)));
        assert_eq!(indicator_color(IndicatorState::Failed), Some((255, 0, 0)));
    }
}
