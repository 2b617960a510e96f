//! Overlay generation adapter
//!
//! The driver never sees the window. It posts preview buffers from its own
//! heap and the relay copies them into the bound window. Policies specific to
//! this generation:
//! - preview is restarted after recording stops, since the driver stops
//!   preview as a side effect of stopping the recorder
//! - the first raw image mutes raw-image messages for the rest of the session

use std::sync::Arc;

use camera_driver::{DriverGeneration, OverlayControl, PreviewWindow, VendorCamera};
use frame_relay::{PreviewTarget, RawImagePolicy};
use hal_protocol::{check_status, HalError};
use tracing::{info, warn};

use super::{AdapterCore, DriverAdapter};
use crate::config::SessionConfig;

pub struct OverlayAdapter {
    core: AdapterCore,
    overlay: Arc<dyn OverlayControl>,
}

impl OverlayAdapter {
    pub fn new(
        driver: Arc<dyn VendorCamera>,
        overlay: Arc<dyn OverlayControl>,
        session: SessionConfig,
    ) -> Result<Self, HalError> {
        Ok(Self {
            core: AdapterCore::new(driver, session, RawImagePolicy::MuteAfterFirst)?,
            overlay,
        })
    }

    fn unbind(&self) {
        self.core.relay().set_preview_target(None);
        self.core.bind_window(None);
    }
}

impl DriverAdapter for OverlayAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn generation(&self) -> DriverGeneration {
        DriverGeneration::Overlay
    }

    fn set_preview_window(&self, window: Option<Arc<dyn PreviewWindow>>) -> Result<(), HalError> {
        let Some(window) = window else {
            info!(camera_id = self.core.camera_id(), "Preview window cleared");
            self.unbind();
            return check_status(self.overlay.set_overlay(false));
        };

        let geometry = match self.core.negotiate_window(window.as_ref()) {
            Ok(geometry) => geometry,
            Err(e) => {
                self.unbind();
                return Err(e);
            }
        };

        self.core.relay().set_preview_target(Some(PreviewTarget::new(
            Arc::clone(&window),
            geometry.width,
            geometry.height,
        )));
        if let Err(e) = check_status(self.overlay.set_overlay(true)) {
            warn!(camera_id = self.core.camera_id(), error = %e, "Driver refused overlay");
            self.unbind();
            return Err(e);
        }
        self.core.bind_window(Some((window, geometry)));
        Ok(())
    }

    fn stop_recording(&self) {
        let driver = self.core.driver();
        driver.stop_recording();
        if let Err(e) = check_status(driver.start_preview()) {
            warn!(camera_id = self.core.camera_id(), error = %e, "Could not restart preview after recording");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_driver::mock::{MockCamera, MockWindow};
    use hal_protocol::MsgType;

    fn adapter(camera: &Arc<MockCamera>) -> OverlayAdapter {
        OverlayAdapter::new(camera.clone(), camera.clone(), SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_stop_recording_restarts_preview() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        adapter.start_preview().unwrap();
        adapter.start_recording().unwrap();

        adapter.stop_recording();
        assert!(!adapter.recording_enabled());
        assert!(adapter.preview_enabled());
        assert_eq!(camera.call_count("start_preview"), 2);
    }

    #[test]
    fn test_preview_frames_reach_window() {
        let camera = MockCamera::new(0);
        camera.set_parameters(&"preview-size=4x2".parse().unwrap());
        let adapter = adapter(&camera);
        let window = MockWindow::new(1);

        adapter.set_preview_window(Some(window.clone())).unwrap();
        assert!(camera.overlay_enabled());

        let frame: Vec<u8> = (0..12).collect();
        camera.emit_preview_buffer(&frame);
        adapter.core().relay().flush();
        assert_eq!(window.queued_frames(), vec![frame]);

        adapter.set_preview_window(None).unwrap();
        assert!(!camera.overlay_enabled());
        assert!(adapter.preview_geometry().is_none());
    }

    #[test]
    fn test_geometry_failure_leaves_window_unset() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        let window = MockWindow::new(1);
        window.fail_geometry(true);

        let err = adapter.set_preview_window(Some(window.clone())).unwrap_err();
        assert_eq!(err.status(), -libc::EINVAL);
        assert!(!camera.overlay_enabled());
        assert!(!adapter.core().relay().has_preview_target());
        assert!(adapter.preview_geometry().is_none());
    }

    #[test]
    fn test_first_raw_image_mutes() {
        let camera = MockCamera::new(0);
        let adapter = adapter(&camera);
        adapter.enable_msg_type(MsgType::RAW_IMAGE | MsgType::SHUTTER);

        camera.emit_data(MsgType::RAW_IMAGE, &[1, 2, 3]);
        adapter.core().relay().flush();

        assert!(!adapter.msg_type_enabled(MsgType::RAW_IMAGE));
        assert!(adapter.msg_type_enabled(MsgType::SHUTTER));
        assert!(!camera.driver_msg_mask().intersects(MsgType::RAW_IMAGE));
    }
}
