//! Camera HAL Protocol Vocabulary
//!
//! Types shared by every layer of the camera HAL shim: the error taxonomy and
//! its errno status codes, the asynchronous message-type bitmask together with
//! the atomic filter consulted on the driver's callback threads, the flattened
//! `key=value;key=value` parameter blob, and the static camera description.

mod error;
mod info;
mod msg;
mod params;

pub use error::{check_status, HalError, OK};
pub use info::{CameraFacing, CameraInfo};
pub use msg::{MessageFilter, MsgType};
pub use params::{keys, CameraParameters};

/// Device ABI version constants
pub mod abi {
    /// Major version of the device operation table
    pub const VERSION_MAJOR: u16 = 1;
    /// Minor version of the device operation table
    pub const VERSION_MINOR: u16 = 0;
    /// Module identifier the consumer looks the shim up by
    pub const MODULE_ID: &str = "camera";
}
