//! Preview window contract (the consumer's graphics buffer queue)

use crate::WindowError;

/// Software reads happen often
pub const USAGE_SW_READ_OFTEN: u32 = 0x0000_0003;
/// Software writes happen often
pub const USAGE_SW_WRITE_OFTEN: u32 = 0x0000_0030;
/// Vendor-private usage bit, used for the DSP-visible preview pool
pub const USAGE_PRIVATE_0: u32 = 0x1000_0000;

/// Pixel formats a window can be configured with
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565 = 4,
    /// YUV 4:2:0 semi-planar, V before U (NV21)
    YCrCb420Sp = 0x11,
    Yv12 = 0x3231_5659,
}

impl PixelFormat {
    /// Bytes needed for one `width` x `height` frame
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb565 => pixels * 2,
            PixelFormat::YCrCb420Sp | PixelFormat::Yv12 => pixels * 3 / 2,
        }
    }
}

/// A dequeued graphics buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub id: u64,
    pub stride: u32,
}

/// Buffer queue the preview is rendered into.
///
/// Implementations are called from the consumer thread during negotiation and
/// from the frame relay thread while rendering.
pub trait PreviewWindow: Send + Sync {
    fn min_undequeued_buffer_count(&self) -> Result<u32, WindowError>;

    fn set_buffer_count(&self, count: u32) -> Result<(), WindowError>;

    fn set_usage(&self, usage: u32) -> Result<(), WindowError>;

    fn set_buffers_geometry(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), WindowError>;

    fn dequeue_buffer(&self) -> Result<BufferHandle, WindowError>;

    /// Map `buffer` for CPU access, run `fill` on the mapping, then unmap.
    fn lock_buffer(
        &self,
        buffer: &BufferHandle,
        usage: u32,
        width: u32,
        height: u32,
        fill: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), WindowError>;

    fn enqueue_buffer(&self, buffer: BufferHandle) -> Result<(), WindowError>;

    /// Return a dequeued buffer without displaying it
    fn cancel_buffer(&self, buffer: BufferHandle) -> Result<(), WindowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(PixelFormat::YCrCb420Sp.frame_size(640, 480), 460_800);
        assert_eq!(PixelFormat::Rgb565.frame_size(4, 2), 16);
        assert_eq!(PixelFormat::YCrCb420Sp as i32, 0x11);
    }
}
