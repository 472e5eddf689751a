//! Convenience re-export for downstream crates (core, render, the binary).
//! Prefer importing from this module instead of individual tree nodes.

pub use super::buffer::{BufferState, Rotation};
pub use super::channel_id::{ChannelId, MAX_CHANNELS};
pub use super::container::{ContainerTag, EntryKind};
pub use super::descriptor::{AssetDescriptor, RECORD_LEN};
pub use super::error::{ModelError, Result as ModelResult};
pub use super::fingerprint::Fingerprint;
pub use super::storage_key::{AssetId, StorageKey};
