//! Camera HAL Shim
//!
//! Exposes a vendor camera driver through the fixed device-module ABI used by
//! the camera service:
//! - `CameraModule`: camera count and info, the open factory
//! - `CameraDevice`: the per-open handle carrying the device operation table
//! - `SessionTable`: camera id → live driver adapter, bounded capacity
//! - `DriverAdapter`: one contract over the overlay and window driver
//!   generations
//!
//! Driver callbacks reach the consumer through the `frame_relay` crate.

pub mod adapter;
pub mod config;
pub mod device;
pub mod module;
pub mod params;
pub mod table;

pub use adapter::{
    create_adapter, AdapterCore, DriverAdapter, OverlayAdapter, PreviewGeometry, WindowAdapter,
};
pub use config::{ConfigError, HalConfig, SessionConfig};
pub use device::CameraDevice;
pub use module::{CameraModule, ModuleInfo, MODULE_INFO};
pub use params::apply_fixups;
pub use table::SessionTable;

use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Install the global fmt subscriber at `level` (`trace` … `error`).
///
/// Unknown level names fall back to `info`. Calling this again once a
/// subscriber is installed has no effect.
pub fn init_logging(level: &str) {
    let parsed = level.parse::<Level>();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(*parsed.as_ref().unwrap_or(&Level::INFO))
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return;
    }
    if parsed.is_err() {
        warn!(level, "Unknown log level, using info");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("debug");
        init_logging("nonsense");
    }
}
