//! Overlay generation preview rendering
//!
//! The overlay driver posts each preview frame as a view into its preview heap.
//! The frame is copied into a buffer dequeued from the consumer's window. The
//! copy assumes YUV 4:2:0 semi-planar, `width * height * 3 / 2` bytes.

use std::fmt;
use std::sync::Arc;

use camera_driver::window::USAGE_SW_WRITE_OFTEN;
use camera_driver::{FrameMemory, PixelFormat, PreviewWindow, WindowError};

/// Window plus the geometry it was negotiated with
#[derive(Clone)]
pub struct PreviewTarget {
    pub window: Arc<dyn PreviewWindow>,
    pub width: u32,
    pub height: u32,
}

impl PreviewTarget {
    pub fn new(window: Arc<dyn PreviewWindow>, width: u32, height: u32) -> Self {
        Self {
            window,
            width,
            height,
        }
    }

    /// Copy one preview frame into the window.
    ///
    /// A buffer that was dequeued but could not be filled is cancelled back to
    /// the window so the queue does not run dry.
    pub(crate) fn render(&self, frame: &FrameMemory) -> Result<(), WindowError> {
        let buffer = self.window.dequeue_buffer()?;
        let len = PixelFormat::YCrCb420Sp.frame_size(self.width, self.height);

        let filled = self.window.lock_buffer(
            &buffer,
            USAGE_SW_WRITE_OFTEN,
            self.width,
            self.height,
            &mut |dst: &mut [u8]| {
                let n = len.min(dst.len());
                frame.copy_to(&mut dst[..n]);
            },
        );
        if let Err(e) = filled {
            let _ = self.window.cancel_buffer(buffer);
            return Err(e);
        }

        self.window.enqueue_buffer(buffer)
    }
}

impl fmt::Debug for PreviewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewTarget")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
