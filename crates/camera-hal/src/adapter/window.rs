//! Window generation adapter
//!
//! The driver renders preview into the window itself. Before a still capture
//! the capture message types are force-enabled, overriding whatever the
//! consumer disabled, because this driver generation otherwise suppresses
//! them.

use std::sync::Arc;

use camera_driver::{DriverGeneration, PreviewWindow, VendorCamera, WindowControl};
use frame_relay::RawImagePolicy;
use hal_protocol::{check_status, HalError, MsgType};
use tracing::{debug, info, warn};

use super::{AdapterCore, DriverAdapter};
use crate::config::SessionConfig;

pub struct WindowAdapter {
    core: AdapterCore,
    control: Arc<dyn WindowControl>,
}

impl WindowAdapter {
    pub fn new(
        driver: Arc<dyn VendorCamera>,
        control: Arc<dyn WindowControl>,
        session: SessionConfig,
    ) -> Result<Self, HalError> {
        Ok(Self {
            core: AdapterCore::new(driver, session, RawImagePolicy::Forward)?,
            control,
        })
    }

    /// Drop any previously bound window from both the driver and the core
    fn unbind(&self) {
        let was_bound = self.core.preview_geometry().is_some();
        self.core.bind_window(None);
        if was_bound {
            let status = self.control.set_preview_window(None);
            if status < 0 {
                warn!(camera_id = self.core.camera_id(), status, "Driver kept stale preview window");
            }
        }
    }
}

impl DriverAdapter for WindowAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn generation(&self) -> DriverGeneration {
        DriverGeneration::Window
    }

    fn set_preview_window(&self, window: Option<Arc<dyn PreviewWindow>>) -> Result<(), HalError> {
        let Some(window) = window else {
            info!(camera_id = self.core.camera_id(), "Preview window cleared");
            self.core.bind_window(None);
            return check_status(self.control.set_preview_window(None));
        };

        let geometry = match self.core.negotiate_window(window.as_ref()) {
            Ok(geometry) => geometry,
            Err(e) => {
                self.unbind();
                return Err(e);
            }
        };
        if let Err(e) = check_status(self.control.set_preview_window(Some(Arc::clone(&window)))) {
            warn!(camera_id = self.core.camera_id(), error = %e, "Driver refused preview window");
            self.core.bind_window(None);
            return Err(e);
        }
        self.core.bind_window(Some((window, geometry)));
        Ok(())
    }

    fn take_picture(&self) -> Result<(), HalError> {
        debug!(
            camera_id = self.core.camera_id(),
            msg = %MsgType::CAPTURE_MSGS,
            "Force-enabling capture messages"
        );
        self.enable_msg_type(MsgType::CAPTURE_MSGS);
        check_status(self.core.driver().take_picture())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_driver::mock::{MockCamera, MockWindow};

    fn adapter(camera: &Arc<MockCamera>) -> WindowAdapter {
        WindowAdapter::new(camera.clone(), camera.clone(), SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_take_picture_forces_capture_messages() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        adapter.disable_msg_type(MsgType::ALL_MSGS);

        adapter.take_picture().unwrap();
        assert!(adapter.msg_type_enabled(MsgType::SHUTTER));
        assert!(adapter.msg_type_enabled(MsgType::COMPRESSED_IMAGE));
        assert!(camera.driver_msg_mask().contains(MsgType::CAPTURE_MSGS));
        assert!(!adapter.msg_type_enabled(MsgType::FOCUS));
    }

    #[test]
    fn test_stop_recording_leaves_preview_stopped() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        adapter.start_preview().unwrap();
        adapter.start_recording().unwrap();
        adapter.stop_recording();
        assert!(!adapter.preview_enabled());
    }

    #[test]
    fn test_window_handed_to_driver() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        let window = MockWindow::new(1);

        adapter.set_preview_window(Some(window.clone())).unwrap();
        assert!(camera.has_window());

        adapter.set_preview_window(None).unwrap();
        assert!(!camera.has_window());
    }

    #[test]
    fn test_negotiation_failure_keeps_window_from_driver() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        let window = MockWindow::new(1);
        window.fail_min_undequeued(true);

        let err = adapter.set_preview_window(Some(window.clone())).unwrap_err();
        assert_eq!(err.status(), -libc::ENODEV);
        assert!(!camera.has_window());
        assert_eq!(camera.call_count("set_preview_window"), 0);
    }

    #[test]
    fn test_driver_refusal_unbinds() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        camera.fail_next("set_preview_window", -libc::EINVAL);

        let err = adapter.set_preview_window(Some(MockWindow::new(1))).unwrap_err();
        assert_eq!(err, HalError::DriverRejected(-libc::EINVAL));
        assert!(adapter.preview_geometry().is_none());
    }

    #[test]
    fn test_failed_rebind_clears_previous_window() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        adapter.set_preview_window(Some(MockWindow::new(1))).unwrap();
        assert!(adapter.preview_geometry().is_some());

        let next = MockWindow::new(1);
        next.fail_geometry(true);
        let err = adapter.set_preview_window(Some(next)).unwrap_err();
        assert_eq!(err.status(), -libc::EINVAL);
        assert!(!camera.has_window());
        assert!(adapter.preview_geometry().is_none());
    }
}
