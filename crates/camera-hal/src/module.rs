//! Module Entry
//!
//! Query surface for the camera service plus the open factory that binds a new
//! driver adapter into the session table.

use std::sync::Arc;

use camera_driver::CameraPlatform;
use hal_protocol::{abi, CameraFacing, CameraInfo, HalError};
use tracing::{debug, info, warn};

use crate::adapter::{create_adapter, DriverAdapter};
use crate::config::HalConfig;
use crate::device::CameraDevice;
use crate::table::SessionTable;

/// Module descriptor the consumer discovers the shim by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub author: &'static str,
    pub version_major: u16,
    pub version_minor: u16,
}

pub const MODULE_INFO: ModuleInfo = ModuleInfo {
    id: abi::MODULE_ID,
    name: "Camera HAL shim",
    author: "Camera HAL Team",
    version_major: abi::VERSION_MAJOR,
    version_minor: abi::VERSION_MINOR,
};

/// Process-wide camera module
pub struct CameraModule {
    platform: Arc<dyn CameraPlatform>,
    config: HalConfig,
    table: Arc<SessionTable<dyn DriverAdapter>>,
}

impl CameraModule {
    pub fn new(platform: Arc<dyn CameraPlatform>, config: HalConfig) -> Self {
        let slots = usize::try_from(platform.number_of_cameras()).unwrap_or(0);
        info!(cameras = slots, max_open = config.max_open_sessions, "Camera module loaded");
        Self {
            table: Arc::new(SessionTable::new(slots, config.max_open_sessions)),
            platform,
            config,
        }
    }

    pub fn info(&self) -> &'static ModuleInfo {
        &MODULE_INFO
    }

    pub fn config(&self) -> &HalConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable<dyn DriverAdapter> {
        &self.table
    }

    pub fn number_of_cameras(&self) -> i32 {
        self.platform.number_of_cameras()
    }

    /// Facing and orientation as reported to the consumer, with the
    /// configured overrides applied
    pub fn camera_info(&self, camera_id: i32) -> Result<CameraInfo, HalError> {
        self.check_range(camera_id)?;
        let reported = self
            .platform
            .camera_info(camera_id)
            .ok_or(HalError::OutOfRange {
                id: camera_id,
                count: self.number_of_cameras(),
            })?;

        let facing = if self.config.force_rear_facing {
            CameraFacing::Back
        } else {
            reported.facing
        };
        // Mounting orientation follows the sensor as queried, even when the
        // reported facing is forced to back
        let orientation = match (self.config.use_platform_orientation, reported.facing) {
            (true, _) => reported.orientation,
            (false, CameraFacing::Front) => self.config.front_orientation,
            (false, CameraFacing::Back) => self.config.back_orientation,
        };
        debug!(camera_id, ?facing, orientation, "camera info");
        Ok(CameraInfo::new(facing, orientation))
    }

    /// Open a session for `camera_id`.
    ///
    /// Fails with `OutOfRange`, `AlreadyOpen` or `ResourceExhausted` before
    /// any driver is created. A driver the vendor library refuses to build is
    /// `OutOfMemory`; nothing stays bound in that case.
    pub fn open(&self, camera_id: i32) -> Result<CameraDevice, HalError> {
        self.check_range(camera_id)?;
        let session = self.config.session(camera_id);

        let adapter = self.table.open_with(camera_id, || {
            self.switch_camera(camera_id);
            let driver = self.platform.open_camera(camera_id).ok_or_else(|| {
                HalError::OutOfMemory(format!("vendor driver for camera {camera_id}"))
            })?;
            create_adapter(driver.clone(), session).map_err(|e| {
                driver.camera.release();
                e
            })
        })?;

        info!(camera_id, generation = %adapter.generation(), "Camera opened");
        Ok(CameraDevice::new(adapter.as_ref(), Arc::clone(&self.table)))
    }

    /// Open by device name, the decimal camera id
    pub fn open_by_name(&self, name: &str) -> Result<CameraDevice, HalError> {
        let camera_id = name
            .trim()
            .parse()
            .map_err(|_| HalError::invalid(format!("camera name {name:?} is not an id")))?;
        self.open(camera_id)
    }

    fn check_range(&self, camera_id: i32) -> Result<(), HalError> {
        let count = self.number_of_cameras();
        if camera_id < 0 || camera_id >= count {
            warn!(camera_id, count, "Camera id out of range");
            return Err(HalError::OutOfRange { id: camera_id, count });
        }
        Ok(())
    }

    /// Tell the platform which sensor to route before its driver is opened
    fn switch_camera(&self, camera_id: i32) {
        let Some(path) = &self.config.switch_camera_path else {
            return;
        };
        match std::fs::write(path, camera_id.to_string()) {
            Ok(()) => debug!(camera_id, path = %path.display(), "Camera switched"),
            Err(e) => warn!(camera_id, path = %path.display(), error = %e, "Could not switch camera"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_driver::mock::MockPlatform;
    use camera_driver::DriverGeneration;

    fn module(config: HalConfig) -> (CameraModule, Arc<MockPlatform>) {
        let platform = Arc::new(MockPlatform::two_cameras(DriverGeneration::Window));
        (CameraModule::new(platform.clone(), config), platform)
    }

    #[test]
    fn test_module_info() {
        let (module, _) = module(HalConfig::default());
        assert_eq!(module.info().id, "camera");
        assert_eq!((module.info().version_major, module.info().version_minor), (1, 0));
    }

    #[test]
    fn test_camera_info_orientation_overrides() {
        let (module, _) = module(HalConfig::default());
        assert_eq!(module.camera_info(0).unwrap(), CameraInfo::new(CameraFacing::Back, 90));
        assert_eq!(module.camera_info(1).unwrap(), CameraInfo::new(CameraFacing::Front, 270));
        assert!(matches!(module.camera_info(2), Err(HalError::OutOfRange { .. })));
    }

    #[test]
    fn test_forced_rear_facing() {
        let (module, _) = module(HalConfig {
            force_rear_facing: true,
            ..Default::default()
        });
        assert_eq!(module.camera_info(1).unwrap(), CameraInfo::new(CameraFacing::Back, 270));
        assert_eq!(module.camera_info(0).unwrap(), CameraInfo::new(CameraFacing::Back, 90));
    }

    #[test]
    fn test_platform_orientation() {
        let (module, _) = module(HalConfig {
            use_platform_orientation: true,
            ..Default::default()
        });
        assert_eq!(module.camera_info(1).unwrap().orientation, 0);
    }

    #[test]
    fn test_open_by_name() {
        let (module, _) = module(HalConfig::default());
        let device = module.open_by_name("1").unwrap();
        assert_eq!(device.camera_id(), 1);
        assert!(matches!(module.open_by_name("back"), Err(HalError::InvalidArgument(_))));
    }

    #[test]
    fn test_refused_driver_unwinds() {
        let (module, platform) = module(HalConfig::default());
        platform.refuse_open(true);
        let err = module.open(0).unwrap_err();
        assert!(matches!(err, HalError::OutOfMemory(_)));
        assert_eq!(err.status(), -libc::ENOMEM);
        assert!(!module.sessions().is_open(0));
        assert_eq!(module.sessions().live_count(), 0);

        platform.refuse_open(false);
        assert!(module.open(0).is_ok());
    }

    #[test]
    fn test_switch_camera_hook() {
        let path = std::env::temp_dir().join(format!("camera-hal-switch-{}", std::process::id()));
        let (module, _) = module(HalConfig {
            switch_camera_path: Some(path.clone()),
            ..Default::default()
        });
        let _device = module.open(1).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
        std::fs::remove_file(&path).ok();
    }
}
