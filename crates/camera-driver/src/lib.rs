//! Camera Driver Contract
//!
//! The surface the HAL shim consumes from a proprietary camera driver:
//! - `VendorCamera`: control calls shared by both driver generations
//! - `OverlayControl` / `WindowControl`: the generation-specific preview hookup
//! - `MemoryHeap` / `FrameMemory`: driver-owned shared memory and frame views
//! - `PreviewWindow`: the consumer's graphics buffer queue
//! - `CameraPlatform`: camera enumeration and driver instantiation
//!
//! `mock` provides in-process fakes of all of the above.

pub mod driver;
pub mod memory;
pub mod mock;
pub mod platform;
pub mod window;

pub use driver::{
    DriverEvent, DriverGeneration, EventSink, GenerationControl, OverlayControl, VendorCamera,
    VendorDriver, WindowControl,
};
pub use memory::{FrameMemory, MemoryHeap};
pub use platform::CameraPlatform;
pub use window::{BufferHandle, PixelFormat, PreviewWindow};

use thiserror::Error;

/// Driver memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Range {offset}+{size} exceeds heap of {heap_len} bytes")]
    OutOfBounds {
        offset: usize,
        size: usize,
        heap_len: usize,
    },
}

/// Preview window (buffer queue) errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Window call failed with status {0}")]
    Status(i32),

    #[error("Buffer {0} is not dequeued")]
    UnknownBuffer(u64),

    #[error("No buffer available")]
    NoBuffer,
}

impl WindowError {
    /// Status code to report to the consumer
    pub fn status(&self) -> i32 {
        match self {
            WindowError::Status(code) if *code < 0 => *code,
            WindowError::Status(_) => -1,
            WindowError::UnknownBuffer(_) => -libc::EINVAL,
            WindowError::NoBuffer => -libc::EAGAIN,
        }
    }
}

impl From<WindowError> for hal_protocol::HalError {
    fn from(err: WindowError) -> Self {
        hal_protocol::HalError::DriverRejected(err.status())
    }
}
