//! Iterative animation decode, stripe tiling, and nearest-neighbor (or
//! hardware-assisted) upscale into the panel's BGR888 storage order.
//!
//! The actual codec is an external collaborator behind [`AnimationDecoder`];
//! this module owns tiling, color conversion, scale-table precomputation,
//! and frame pacing only.

use std::time::{Duration, Instant};

use lumenwall_model::Rotation;
use rayon::prelude::*;
use thiserror::Error;

/// Default stripe height in rows; halved on allocation failure.
pub const DEFAULT_STRIPE_HEIGHT: u16 = 80;
/// Floor the stripe pipeline will not shrink below.
pub const STRIPE_FLOOR: u16 = 16;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("codec error: {0}")]
    Codec(String),
    #[error("allocation failed at stripe height {0}")]
    OutOfMemory(u16),
    #[error("invalid dimensions: {0}x{1}")]
    InvalidDimensions(u32, u32),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Source pixel layout a decoder hands back. webp decodes to RGBA (alpha
/// channel present even if unused by this panel); gif decodes to RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba,
    Rgb,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Rgb => 3,
        }
    }
}

/// One decoded animation frame, native source size.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
    pub delay: Duration,
}

/// A decoder that yields frames one at a time. The real codec (animated
/// webp / gif) implements this; `SoftwareReferenceDecoder` below exists for
/// tests and as a documented fallback.
pub trait AnimationDecoder: Send {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>>;
    fn reset(&mut self);
    fn loops(&self) -> bool {
        true
    }
}

/// Minimal decoder over an in-memory frame list, used in tests and as the
/// software reference path when no hardware-accelerated codec is linked.
pub struct SoftwareReferenceDecoder {
    frames: Vec<DecodedFrame>,
    cursor: usize,
    looping: bool,
}

impl SoftwareReferenceDecoder {
    pub fn new(frames: Vec<DecodedFrame>, looping: bool) -> Self {
        Self {
            frames,
            cursor: 0,
            looping,
        }
    }
}

impl AnimationDecoder for SoftwareReferenceDecoder {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if self.cursor >= self.frames.len() {
            if self.looping {
                self.cursor = 0;
            } else {
                return Ok(None);
            }
        }
        let frame = self.frames.get(self.cursor).cloned();
        self.cursor += 1;
        Ok(frame)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn loops(&self) -> bool {
        self.looping
    }
}

/// One horizontal slice of a frame, already converted to panel BGR888.
#[derive(Debug, Clone)]
pub struct Stripe {
    pub y_offset: u32,
    pub height: u32,
    pub width: u32,
    pub pixels: Vec<u8>,
}

/// Convert a source buffer to BGR888, dropping alpha if present.
pub fn to_bgr888(src: &[u8], format: PixelFormat) -> Vec<u8> {
    let bpp = format.bytes_per_pixel();
    let pixel_count = src.len() / bpp;
    let mut out = Vec::with_capacity(pixel_count * 3);
    for chunk in src.chunks_exact(bpp) {
        out.push(chunk[2]);
        out.push(chunk[1]);
        out.push(chunk[0]);
    }
    out
}

/// Tile a BGR888-converted frame into stripes of `stripe_height` rows (the
/// last stripe is shorter if height doesn't divide evenly).
pub fn tile_into_stripes(
    width: u32,
    height: u32,
    bgr: &[u8],
    stripe_height: u16,
) -> Vec<Stripe> {
    let stripe_height = stripe_height as u32;
    let row_bytes = width as usize * 3;
    let mut stripes = Vec::with_capacity(height.div_ceil(stripe_height) as usize);

    let mut y = 0u32;
    while y < height {
        let this_height = stripe_height.min(height - y);
        let start = y as usize * row_bytes;
        let end = start + this_height as usize * row_bytes;
        stripes.push(Stripe {
            y_offset: y,
            height: this_height,
            width,
            pixels: bgr[start..end].to_vec(),
        });
        y += this_height;
    }
    stripes
}

/// Halve `current` down to [`STRIPE_FLOOR`] on allocation failure; returns
/// `None` once the floor itself has failed.
pub fn degrade_stripe_height(current: u16) -> Option<u16> {
    if current <= STRIPE_FLOOR {
        return None;
    }
    Some((current / 2).max(STRIPE_FLOOR))
}

/// Precomputed per-axis nearest-neighbor index tables, built once on
/// animation load and reused for every frame until unload.
#[derive(Debug, Clone)]
pub struct ScaleTables {
    pub x_map: Vec<u32>,
    pub y_map: Vec<u32>,
}

impl ScaleTables {
    pub fn nearest_neighbor(
        src_w: u32,
        src_h: u32,
        dst_w: u32,
        dst_h: u32,
    ) -> Result<Self> {
        if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
            return Err(DecodeError::InvalidDimensions(dst_w, dst_h));
        }
        let x_map = (0..dst_w)
            .map(|x| (x * src_w / dst_w).min(src_w - 1))
            .collect();
        let y_map = (0..dst_h)
            .map(|y| (y * src_h / dst_h).min(src_h - 1))
            .collect();
        Ok(Self { x_map, y_map })
    }
}

/// A uniform, floor-quantized 1/16-precision scale used by the hardware
/// scale/rotate path, plus the integer offsets that center the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareScale {
    /// Scale factor in 1/16ths, e.g. 16 == 1.0x.
    pub scale_sixteenths: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_w: u32,
    pub scaled_h: u32,
}

impl HardwareScale {
    /// `src * s <= dst` on both axes, floor-quantized to 1/16 precision.
    pub fn compute(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Result<Self> {
        if src_w == 0 || src_h == 0 {
            return Err(DecodeError::InvalidDimensions(src_w, src_h));
        }
        let scale_x = (dst_w as u64 * 16) / src_w as u64;
        let scale_y = (dst_h as u64 * 16) / src_h as u64;
        let scale_sixteenths = scale_x.min(scale_y).max(1) as u32;

        let scaled_w = (src_w * scale_sixteenths) / 16;
        let scaled_h = (src_h * scale_sixteenths) / 16;
        let offset_x = (dst_w.saturating_sub(scaled_w)) / 2;
        let offset_y = (dst_h.saturating_sub(scaled_h)) / 2;

        Ok(Self {
            scale_sixteenths,
            offset_x,
            offset_y,
            scaled_w,
            scaled_h,
        })
    }
}

/// Background color for the border strips surrounding a centered
/// hardware-scaled image, already in the panel's BGR888 byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderColor {
    r: u8,
    g: u8,
    b: u8,
}

impl BorderColor {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Swap source width/height for a 90/270 rotation: the addressing scheme
/// reads the source through its own rotated axes, so the box the hardware
/// scale centers is proportioned for the rotated content, not the raw
/// decode dimensions.
fn effective_source_dims(src_w: u32, src_h: u32, rotation: Rotation) -> (u32, u32) {
    match rotation {
        Rotation::Deg0 | Rotation::Deg180 => (src_w, src_h),
        Rotation::Deg90 | Rotation::Deg270 => (src_h, src_w),
    }
}

/// One of the four source-addressing schemes the upscaler indexes through.
/// `tables` is built against the rotation's effective (possibly swapped)
/// source dimensions; `box_x`/`box_y` are coordinates within the centered
/// scaled box. Returns the pixel position in the original, unrotated
/// source frame.
fn rotated_source_index(
    box_x: u32,
    box_y: u32,
    src_w: u32,
    src_h: u32,
    tables: &ScaleTables,
    rotation: Rotation,
) -> (u32, u32) {
    match rotation {
        Rotation::Deg0 => (tables.x_map[box_x as usize], tables.y_map[box_y as usize]),
        Rotation::Deg180 => (
            src_w - 1 - tables.x_map[box_x as usize],
            src_h - 1 - tables.y_map[box_y as usize],
        ),
        Rotation::Deg90 => (
            src_w - 1 - tables.y_map[box_y as usize],
            tables.x_map[box_x as usize],
        ),
        Rotation::Deg270 => (
            tables.y_map[box_y as usize],
            src_h - 1 - tables.x_map[box_x as usize],
        ),
    }
}

/// Fill the border strips (top, bottom, left, right of the centered scaled
/// region) of a `dst_w`x`dst_h` BGR888 frame with `color`. Must run before
/// the scaled pixels are written into the centered box.
pub fn fill_borders(dst: &mut [u8], dst_w: u32, dst_h: u32, scale: &HardwareScale, color: BorderColor) {
    debug_assert_eq!(dst.len(), dst_w as usize * dst_h as usize * 3);
    let row_bytes = dst_w as usize * 3;
    for y in 0..dst_h {
        let in_box_y = y >= scale.offset_y && y < scale.offset_y + scale.scaled_h;
        let row = &mut dst[y as usize * row_bytes..(y as usize + 1) * row_bytes];
        for x in 0..dst_w {
            let in_box_x = x >= scale.offset_x && x < scale.offset_x + scale.scaled_w;
            if in_box_y && in_box_x {
                continue;
            }
            let idx = x as usize * 3;
            row[idx] = color.b;
            row[idx + 1] = color.g;
            row[idx + 2] = color.r;
        }
    }
}

/// Compose one full destination frame on the hardware scale/rotate path:
/// centers the scaled image per [`HardwareScale`], fills the surrounding
/// border with `background`, and writes the scaled box by indexing the
/// source through `rotation`'s addressing scheme. Work is split two
/// destination rows at a time across a rayon thread-pool. The result is a
/// complete BGR888 `dst_w`x`dst_h` frame, ready to be handed to
/// [`tile_into_stripes`] for DMA submission.
pub fn compose_scaled_frame(
    src_bgr: &[u8],
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    rotation: Rotation,
    background: BorderColor,
) -> Result<Vec<u8>> {
    let (eff_w, eff_h) = effective_source_dims(src_w, src_h, rotation);
    let scale = HardwareScale::compute(eff_w, eff_h, dst_w, dst_h)?;
    let tables = ScaleTables::nearest_neighbor(eff_w, eff_h, scale.scaled_w, scale.scaled_h)?;

    let mut dst = vec![0u8; dst_w as usize * dst_h as usize * 3];
    fill_borders(&mut dst, dst_w, dst_h, &scale, background);

    let row_bytes = dst_w as usize * 3;
    dst.par_chunks_mut(row_bytes * 2)
        .enumerate()
        .for_each(|(chunk_idx, rows)| {
            let rows_in_chunk = rows.len() / row_bytes;
            for r in 0..rows_in_chunk {
                let y = chunk_idx as u32 * 2 + r as u32;
                if y < scale.offset_y || y >= scale.offset_y + scale.scaled_h {
                    continue;
                }
                let box_y = y - scale.offset_y;
                let row = &mut rows[r * row_bytes..(r + 1) * row_bytes];
                for x in scale.offset_x..scale.offset_x + scale.scaled_w {
                    let box_x = x - scale.offset_x;
                    let (sx, sy) =
                        rotated_source_index(box_x, box_y, src_w, src_h, &tables, rotation);
                    let src_idx = (sy as usize * src_w as usize + sx as usize) * 3;
                    let dst_idx = x as usize * 3;
                    row[dst_idx..dst_idx + 3].copy_from_slice(&src_bgr[src_idx..src_idx + 3]);
                }
            }
        });

    Ok(dst)
}

/// Enforces that a decoder never delivers a frame more than once per its
/// advertised delay window.
#[derive(Debug)]
pub struct FramePacer {
    last_delivered: Option<Instant>,
}

impl Default for FramePacer {
    fn default() -> Self {
        Self {
            last_delivered: None,
        }
    }
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(&self, delay: Duration, now: Instant) -> bool {
        match self.last_delivered {
            None => true,
            Some(last) => now.duration_since(last) >= delay,
        }
    }

    pub fn note_delivered(&mut self, now: Instant) {
        self.last_delivered = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_bgr888_swaps_channels_and_drops_alpha() {
        let rgba = [10u8, 20, 30, 255];
        let bgr = to_bgr888(&rgba, PixelFormat::Rgba);
        assert_eq!(bgr, vec![30, 20, 10]);
    }

    #[test]
    fn tile_into_stripes_covers_full_height_with_uneven_remainder() {
        let width = 4u32;
        let height = 10u32;
        let bgr = vec![0u8; (width * height * 3) as usize];
        let stripes = tile_into_stripes(width, height, &bgr, 4);
        assert_eq!(stripes.len(), 3);
        assert_eq!(stripes[0].height, 4);
        assert_eq!(stripes[1].height, 4);
        assert_eq!(stripes[2].height, 2);
    }

    #[test]
    fn degrade_stripe_height_halves_down_to_floor_then_stops() {
        assert_eq!(degrade_stripe_height(80), Some(40));
        assert_eq!(degrade_stripe_height(40), Some(20));
        assert_eq!(degrade_stripe_height(20), Some(16));
        assert_eq!(degrade_stripe_height(16), None);
    }

    #[test]
    fn nearest_neighbor_tables_map_within_bounds() {
        let tables = ScaleTables::nearest_neighbor(100, 50, 720, 720).unwrap();
        assert_eq!(tables.x_map.len(), 720);
        assert_eq!(tables.y_map.len(), 720);
        assert!(tables.x_map.iter().all(|&x| x < 100));
        assert!(tables.y_map.iter().all(|&y| y < 50));
    }

    #[test]
    fn hardware_scale_centers_smaller_image() {
        let scale = HardwareScale::compute(100, 100, 720, 720).unwrap();
        assert_eq!(scale.scale_sixteenths, 115);
        assert!(scale.offset_x > 0 || scale.scaled_w == 720);
    }

    #[test]
    fn frame_pacer_rejects_early_delivery() {
        let mut pacer = FramePacer::new();
        let t0 = Instant::now();
        assert!(pacer.ready(Duration::from_millis(100), t0));
        pacer.note_delivered(t0);
        assert!(!pacer.ready(Duration::from_millis(100), t0));
    }

    #[test]
    fn fill_borders_paints_outside_centered_box_only() {
        let dst_w = 4u32;
        let dst_h = 4u32;
        let mut dst = vec![0u8; (dst_w * dst_h * 3) as usize];
        let scale = HardwareScale {
            scale_sixteenths: 16,
            offset_x: 1,
            offset_y: 1,
            scaled_w: 2,
            scaled_h: 2,
        };
        let color = BorderColor::from_rgb(9, 8, 7);
        fill_borders(&mut dst, dst_w, dst_h, &scale, color);

        assert_eq!(&dst[0..3], &[7, 8, 9]);
        let inside = ((dst_w + 1) * 3) as usize;
        assert_eq!(&dst[inside..inside + 3], &[0, 0, 0]);
    }

    #[test]
    fn compose_scaled_frame_applies_rotation_addressing() {
        let src_w = 2u32;
        let src_h = 2u32;
        #[rustfmt::skip]
        let src = vec![
            10, 11, 12, // (0,0)
            20, 21, 22, // (1,0)
            30, 31, 32, // (0,1)
            40, 41, 42, // (1,1)
        ];
        let background = BorderColor::from_rgb(0, 0, 0);

        let identity =
            compose_scaled_frame(&src, src_w, src_h, 2, 2, Rotation::Deg0, background).unwrap();
        assert_eq!(identity, src);

        let rotated =
            compose_scaled_frame(&src, src_w, src_h, 2, 2, Rotation::Deg90, background).unwrap();
        assert_eq!(&rotated[0..3], &src[3..6]);

        let flipped =
            compose_scaled_frame(&src, src_w, src_h, 2, 2, Rotation::Deg180, background).unwrap();
        assert_eq!(&flipped[0..3], &src[9..12]);
    }

    #[test]
    fn software_reference_decoder_loops_when_enabled() {
        let frame = DecodedFrame {
            width: 1,
            height: 1,
            format: PixelFormat::Rgb,
            pixels: vec![1, 2, 3],
            delay: Duration::from_millis(10),
        };
        let mut decoder = SoftwareReferenceDecoder::new(vec![frame], true);
        assert!(decoder.next_frame().unwrap().is_some());
        assert!(decoder.next_frame().unwrap().is_some());
    }
}
