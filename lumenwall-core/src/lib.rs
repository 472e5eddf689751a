//! Bus coordination, content-addressed storage, and the download scheduler
//! for the lumenwall appliance. `lumenwall-render` builds on top of this
//! for decode/display; the `lumenwall` binary wires everything together.

pub mod bus;
pub mod channel;
pub mod error;
pub mod failure;
pub mod fetch;
pub mod scheduler;
pub mod vault;

pub use bus::{BusCoordinator, BusGuard};
pub use channel::{ChannelHandle, ChannelRegistry};
pub use error::{FrameError, Result};
pub use failure::{FailureTracker, TERMINAL_THRESHOLD};
pub use fetch::{Fetcher, CHUNK_SIZE};
pub use scheduler::{
    PlaybackSink, Scheduler, SchedulerConfig, DEFAULT_CACHE_LIMIT,
};
pub use vault::Vault;
