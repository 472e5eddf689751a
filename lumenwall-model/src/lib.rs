//! Wire-format and shared data types for the lumenwall appliance: the
//! catalog record layout, derived storage keys and fingerprints, and the
//! small enums (buffer state, rotation) the scheduler, vault, and renderer
//! all agree on.
#![allow(missing_docs)]

pub mod buffer;
pub mod channel_id;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod prelude;
pub mod storage_key;

pub use buffer::{BufferState, Rotation};
pub use channel_id::{ChannelId, MAX_CHANNELS};
pub use container::{ContainerTag, EntryKind};
pub use descriptor::{AssetDescriptor, RECORD_LEN};
pub use error::{ModelError, Result as ModelResult};
pub use fingerprint::Fingerprint;
pub use storage_key::{AssetId, StorageKey};
