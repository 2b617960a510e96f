//! Frame Relay
//!
//! Driver threads post `DriverEvent`s into a bounded channel; a dedicated relay
//! thread consults the session's message filter, copies driver memory into
//! consumer-owned blocks and invokes the consumer's registered callbacks in the
//! order the driver produced the events. Recording frames are handed back to
//! the driver's pool once the consumer's timestamp callback has returned.

mod callbacks;
mod overlay;
mod relay;

pub use callbacks::{
    ConsumerCallbacks, ConsumerCookie, DataCallback, DataTimestampCallback, MemoryBlock,
    NotifyCallback, RequestMemory, VecAllocator,
};
pub use overlay::PreviewTarget;
pub use relay::{FrameRelay, RawImagePolicy, RelayConfig, RelayStats};

use thiserror::Error;

/// Relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to spawn relay thread: {0}")]
    Spawn(#[from] std::io::Error),
}
