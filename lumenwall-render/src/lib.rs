//! Decode, upscale, and display pipeline for the lumenwall appliance. This
//! crate bypasses the GUI toolkit during animated playback, driving DMA
//! transfers stripe-by-stripe against a double/triple-buffered panel.

pub mod decode;
pub mod display;
pub mod overlay;

pub use decode::{
    compose_scaled_frame, fill_borders, AnimationDecoder, BorderColor, DecodedFrame, DecodeError,
    FramePacer, HardwareScale, PixelFormat, ScaleTables, SoftwareReferenceDecoder, Stripe,
    DEFAULT_STRIPE_HEIGHT, STRIPE_FLOOR,
};
pub use display::{
    CacheFlush, Dma, DisplayEngine, DisplayError, DisplayMode, VsyncSource,
};
pub use overlay::{FpsOverlay, IndicatorState, ProcessingIndicator};
