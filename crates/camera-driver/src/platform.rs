//! Platform camera enumeration and driver factory

use hal_protocol::CameraInfo;

use crate::driver::VendorDriver;

/// Process-wide camera query surface of the vendor library
pub trait CameraPlatform: Send + Sync {
    /// Number of cameras the platform reports
    fn number_of_cameras(&self) -> i32;

    /// Facing and mounting orientation of one camera
    fn camera_info(&self, camera_id: i32) -> Option<CameraInfo>;

    /// Instantiate the driver for one camera. `None` when the vendor library
    /// refuses to create an instance.
    fn open_camera(&self, camera_id: i32) -> Option<VendorDriver>;
}
