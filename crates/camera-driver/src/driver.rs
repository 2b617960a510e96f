//! Vendor driver surface
//!
//! Two incompatible driver generations exist. Both share the control calls of
//! `VendorCamera`; they differ in how preview reaches the screen:
//! - overlay generation: the driver posts preview buffers from its own heap and
//!   the shim copies them into the consumer's window (`OverlayControl`)
//! - window generation: the driver takes the window and renders itself
//!   (`WindowControl`)
//!
//! Status-returning calls use raw `i32` codes (0 ok, negative error) exactly as
//! the vendor library reports them.

use std::fmt;
use std::sync::Arc;

use hal_protocol::{CameraParameters, MsgType};

use crate::memory::FrameMemory;
use crate::window::PreviewWindow;

/// An asynchronous event produced on a driver thread
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// Notification without payload (shutter, focus, zoom, error)
    Notify { msg: MsgType, ext1: i32, ext2: i32 },
    /// Payload without timestamp (preview frames, still capture)
    Data { msg: MsgType, frame: FrameMemory },
    /// Timestamped payload from the recording pool. The frame must be returned
    /// with `VendorCamera::release_recording_frame`.
    DataTimestamp {
        timestamp_ns: i64,
        msg: MsgType,
        frame: FrameMemory,
    },
    /// Overlay generation only: a preview buffer from the driver's preview heap
    PreviewBuffer { frame: FrameMemory },
}

impl DriverEvent {
    /// Message type carried by the event (`NONE` for overlay buffers)
    pub fn msg_type(&self) -> MsgType {
        match self {
            DriverEvent::Notify { msg, .. }
            | DriverEvent::Data { msg, .. }
            | DriverEvent::DataTimestamp { msg, .. } => *msg,
            DriverEvent::PreviewBuffer { .. } => MsgType::NONE,
        }
    }
}

/// Receiver of driver events, called from driver-owned threads
pub trait EventSink: Send + Sync {
    fn post(&self, event: DriverEvent);
}

/// Control calls common to both driver generations
pub trait VendorCamera: Send + Sync {
    /// Install or clear the event receiver
    fn set_event_sink(&self, sink: Option<Arc<dyn EventSink>>);

    fn enable_msg_type(&self, msg: MsgType);
    fn disable_msg_type(&self, msg: MsgType);
    fn msg_type_enabled(&self, msg: MsgType) -> bool;

    fn start_preview(&self) -> i32;
    fn stop_preview(&self);
    fn preview_enabled(&self) -> bool;

    fn start_recording(&self) -> i32;
    fn stop_recording(&self);
    fn recording_enabled(&self) -> bool;
    /// Return a recording frame to the driver's bounded pool
    fn release_recording_frame(&self, frame: &FrameMemory);

    fn auto_focus(&self) -> i32;
    fn cancel_auto_focus(&self) -> i32;
    fn take_picture(&self) -> i32;
    fn cancel_picture(&self) -> i32;

    fn set_parameters(&self, params: &CameraParameters) -> i32;
    fn parameters(&self) -> CameraParameters;
    fn send_command(&self, cmd: i32, arg1: i32, arg2: i32) -> i32;

    /// Stop all activity and free hardware resources
    fn release(&self);
}

/// Overlay generation preview hookup
pub trait OverlayControl: Send + Sync {
    /// Start (`true`) or stop posting `DriverEvent::PreviewBuffer`
    fn set_overlay(&self, enabled: bool) -> i32;
}

/// Window generation preview hookup
pub trait WindowControl: Send + Sync {
    fn set_preview_window(&self, window: Option<Arc<dyn PreviewWindow>>) -> i32;
}

/// Which driver generation an instance belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverGeneration {
    Overlay,
    Window,
}

impl fmt::Display for DriverGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverGeneration::Overlay => f.write_str("overlay"),
            DriverGeneration::Window => f.write_str("window"),
        }
    }
}

/// Generation-specific half of an opened driver
#[derive(Clone)]
pub enum GenerationControl {
    Overlay(Arc<dyn OverlayControl>),
    Window(Arc<dyn WindowControl>),
}

/// An opened vendor driver instance
#[derive(Clone)]
pub struct VendorDriver {
    pub camera: Arc<dyn VendorCamera>,
    pub control: GenerationControl,
}

impl VendorDriver {
    /// Wrap an overlay generation driver
    pub fn overlay<T>(driver: Arc<T>) -> Self
    where
        T: VendorCamera + OverlayControl + 'static,
    {
        Self {
            camera: driver.clone(),
            control: GenerationControl::Overlay(driver),
        }
    }

    /// Wrap a window generation driver
    pub fn window<T>(driver: Arc<T>) -> Self
    where
        T: VendorCamera + WindowControl + 'static,
    {
        Self {
            camera: driver.clone(),
            control: GenerationControl::Window(driver),
        }
    }

    pub fn generation(&self) -> DriverGeneration {
        match self.control {
            GenerationControl::Overlay(_) => DriverGeneration::Overlay,
            GenerationControl::Window(_) => DriverGeneration::Window,
        }
    }
}
