//! Driver Adapter
//!
//! One adapter per open camera. `DriverAdapter` is the generation-agnostic
//! contract the device session talks to; `OverlayAdapter` and `WindowAdapter`
//! differ only in how a preview window is bound and in their generation
//! policies. Everything else is provided by the trait's default methods on top
//! of `AdapterCore`.

mod overlay;
mod window;

pub use overlay::OverlayAdapter;
pub use window::WindowAdapter;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use camera_driver::window::{USAGE_PRIVATE_0, USAGE_SW_READ_OFTEN};
use camera_driver::{
    DriverGeneration, GenerationControl, PixelFormat, PreviewWindow, VendorCamera, VendorDriver,
};
use frame_relay::{ConsumerCallbacks, FrameRelay, RawImagePolicy, RelayConfig, RelayStats};
use hal_protocol::{check_status, CameraParameters, HalError, MessageFilter, MsgType};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::params::apply_fixups;

/// Preview geometry negotiated with the bound window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewGeometry {
    pub width: u32,
    pub height: u32,
}

/// State shared by both adapter generations
pub struct AdapterCore {
    camera_id: i32,
    driver: Arc<dyn VendorCamera>,
    filter: Arc<MessageFilter>,
    relay: FrameRelay,
    session: SessionConfig,
    window: Mutex<Option<(Arc<dyn PreviewWindow>, PreviewGeometry)>>,
    released: AtomicBool,
}

impl AdapterCore {
    /// Start the relay for `driver` and install it as the driver's event sink
    pub fn new(
        driver: Arc<dyn VendorCamera>,
        session: SessionConfig,
        raw_image_policy: RawImagePolicy,
    ) -> Result<Self, HalError> {
        let filter = Arc::new(MessageFilter::new());
        let relay = FrameRelay::spawn(
            RelayConfig {
                camera_id: session.camera_id,
                queue_depth: session.relay_queue_depth,
                raw_image_policy,
            },
            Arc::clone(&driver),
            Arc::clone(&filter),
        )
        .map_err(|e| HalError::OutOfMemory(e.to_string()))?;
        driver.set_event_sink(Some(relay.sink()));

        Ok(Self {
            camera_id: session.camera_id,
            driver,
            filter,
            relay,
            session,
            window: Mutex::new(None),
            released: AtomicBool::new(false),
        })
    }

    pub fn camera_id(&self) -> i32 {
        self.camera_id
    }

    pub fn driver(&self) -> &Arc<dyn VendorCamera> {
        &self.driver
    }

    pub fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    pub fn relay(&self) -> &FrameRelay {
        &self.relay
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn preview_geometry(&self) -> Option<PreviewGeometry> {
        self.bound_window().map(|(_, geometry)| geometry)
    }

    fn bound_window(&self) -> Option<(Arc<dyn PreviewWindow>, PreviewGeometry)> {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn bind_window(&self, bound: Option<(Arc<dyn PreviewWindow>, PreviewGeometry)>) {
        *self.window.lock().unwrap_or_else(PoisonError::into_inner) = bound;
    }

    /// Configure `window` for the driver's preview stream.
    ///
    /// A minimum undequeued count at or above the buffer count is tolerated
    /// with a warning. Any failed window call aborts with the window's status.
    fn negotiate_window(&self, window: &dyn PreviewWindow) -> Result<PreviewGeometry, HalError> {
        let buffer_count = self.session.preview_buffer_count;

        let min_undequeued = window.min_undequeued_buffer_count().map_err(|e| {
            error!(camera_id = self.camera_id, error = %e, "Could not query min undequeued buffer count");
            HalError::from(e)
        })?;
        if min_undequeued >= buffer_count {
            warn!(
                camera_id = self.camera_id,
                min_undequeued,
                expected_at_most = buffer_count.saturating_sub(1),
                "Min undequeued buffer count too high"
            );
        }

        window.set_buffer_count(buffer_count).map_err(|e| {
            error!(camera_id = self.camera_id, buffer_count, error = %e, "Could not set buffer count");
            HalError::from(e)
        })?;

        let params = self.driver.parameters();
        let (width, height) = params.preview_size().ok_or_else(|| {
            error!(camera_id = self.camera_id, "Driver reports no preview size");
            HalError::invalid("driver reports no preview size")
        })?;
        debug!(
            camera_id = self.camera_id,
            width,
            height,
            format = params.preview_format().unwrap_or("unknown"),
            "Negotiating preview window"
        );

        window.set_usage(USAGE_PRIVATE_0 | USAGE_SW_READ_OFTEN)?;
        window
            .set_buffers_geometry(width, height, PixelFormat::YCrCb420Sp)
            .map_err(|e| {
                error!(camera_id = self.camera_id, width, height, error = %e, "Could not set buffers geometry");
                HalError::from(e)
            })?;

        Ok(PreviewGeometry { width, height })
    }
}

impl Drop for AdapterCore {
    fn drop(&mut self) {
        // The installed sink owns the driver; detach it so neither outlives us
        self.driver.set_event_sink(None);
    }
}

/// Uniform capability surface over one opened vendor driver
pub trait DriverAdapter: Send + Sync {
    fn core(&self) -> &AdapterCore;

    fn generation(&self) -> DriverGeneration;

    /// Bind (`Some`) or clear (`None`) the preview window. A failed
    /// negotiation leaves no window bound.
    fn set_preview_window(&self, window: Option<Arc<dyn PreviewWindow>>) -> Result<(), HalError>;

    fn camera_id(&self) -> i32 {
        self.core().camera_id()
    }

    fn set_callbacks(&self, callbacks: ConsumerCallbacks) {
        debug!(camera_id = self.camera_id(), ?callbacks, "Registering callbacks");
        self.core().relay().set_callbacks(callbacks);
    }

    fn enable_msg_type(&self, msg: MsgType) {
        let applied = self.core().filter().enable(msg);
        debug!(camera_id = self.camera_id(), msg = %applied, "Enable message type");
        self.core().driver().enable_msg_type(applied);
    }

    fn disable_msg_type(&self, msg: MsgType) {
        let applied = self.core().filter().disable(msg);
        debug!(camera_id = self.camera_id(), msg = %applied, "Disable message type");
        self.core().driver().disable_msg_type(applied);
    }

    fn msg_type_enabled(&self, msg: MsgType) -> bool {
        self.core().filter().is_enabled(msg)
    }

    fn start_preview(&self) -> Result<(), HalError> {
        check_status(self.core().driver().start_preview())
    }

    fn stop_preview(&self) {
        self.core().driver().stop_preview();
    }

    fn preview_enabled(&self) -> bool {
        self.core().driver().preview_enabled()
    }

    fn start_recording(&self) -> Result<(), HalError> {
        check_status(self.core().driver().start_recording())
    }

    fn stop_recording(&self) {
        self.core().driver().stop_recording();
    }

    fn recording_enabled(&self) -> bool {
        self.core().driver().recording_enabled()
    }

    fn auto_focus(&self) -> Result<(), HalError> {
        check_status(self.core().driver().auto_focus())
    }

    fn cancel_auto_focus(&self) -> Result<(), HalError> {
        check_status(self.core().driver().cancel_auto_focus())
    }

    fn take_picture(&self) -> Result<(), HalError> {
        check_status(self.core().driver().take_picture())
    }

    fn cancel_picture(&self) -> Result<(), HalError> {
        check_status(self.core().driver().cancel_picture())
    }

    fn set_parameters(&self, params: &CameraParameters) -> Result<(), HalError> {
        check_status(self.core().driver().set_parameters(params))
    }

    /// Driver parameters with the session fixups applied
    fn parameters(&self) -> Result<CameraParameters, HalError> {
        let mut params = self.core().driver().parameters();
        apply_fixups(&mut params, self.core().session())?;
        Ok(params)
    }

    /// Non-negative driver codes are passed back unchanged
    fn send_command(&self, cmd: i32, arg1: i32, arg2: i32) -> Result<i32, HalError> {
        let code = self.core().driver().send_command(cmd, arg1, arg2);
        check_status(code).map(|()| code)
    }

    /// Stop the driver and free its hardware. Only the first call reaches the
    /// driver.
    fn release(&self) {
        let core = self.core();
        if core.released.swap(true, Ordering::AcqRel) {
            debug!(camera_id = core.camera_id, "Driver already released");
            return;
        }
        info!(camera_id = core.camera_id, "Releasing driver");
        core.driver.release();
    }

    /// Tear down for close: stop consumer delivery, return queued recording
    /// frames, release the driver if still held and detach from it.
    fn shutdown(&self) {
        let core = self.core();
        core.relay.shutdown();
        self.release();
        core.driver.set_event_sink(None);
        core.bind_window(None);
    }

    fn preview_geometry(&self) -> Option<PreviewGeometry> {
        self.core().preview_geometry()
    }

    fn relay_stats(&self) -> RelayStats {
        self.core().relay().stats()
    }
}

/// Build the adapter matching the driver's generation
pub fn create_adapter(
    driver: VendorDriver,
    session: SessionConfig,
) -> Result<Arc<dyn DriverAdapter>, HalError> {
    let generation = driver.generation();
    info!(camera_id = session.camera_id, %generation, "Creating driver adapter");
    let adapter: Arc<dyn DriverAdapter> = match driver.control {
        GenerationControl::Overlay(control) => {
            Arc::new(OverlayAdapter::new(driver.camera, control, session)?)
        }
        GenerationControl::Window(control) => {
            Arc::new(WindowAdapter::new(driver.camera, control, session)?)
        }
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_driver::mock::{MockCamera, MockWindow};

    fn overlay_adapter(camera: &Arc<MockCamera>) -> Arc<dyn DriverAdapter> {
        create_adapter(VendorDriver::overlay(camera.clone()), SessionConfig::default()).unwrap()
    }

    fn window_adapter(camera: &Arc<MockCamera>) -> Arc<dyn DriverAdapter> {
        create_adapter(VendorDriver::window(camera.clone()), SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_adapter_matches_generation() {
        let camera = MockCamera::new(0);
        assert_eq!(overlay_adapter(&camera).generation(), DriverGeneration::Overlay);
        assert_eq!(window_adapter(&camera).generation(), DriverGeneration::Window);
        assert!(camera.has_sink());
    }

    #[test]
    fn test_raw_image_notify_reaches_driver_as_raw_image() {
        let camera = MockCamera::new(0);
        let adapter = window_adapter(&camera);
        adapter.enable_msg_type(MsgType::RAW_IMAGE_NOTIFY);
        assert_eq!(camera.driver_msg_mask(), MsgType::RAW_IMAGE);
        assert!(adapter.msg_type_enabled(MsgType::RAW_IMAGE_NOTIFY));

        adapter.disable_msg_type(MsgType::RAW_IMAGE);
        assert_eq!(camera.driver_msg_mask(), MsgType::NONE);
        assert!(!adapter.msg_type_enabled(MsgType::RAW_IMAGE));
    }

    #[test]
    fn test_driver_status_passes_through() {
        let camera = MockCamera::new(0);
        let adapter = window_adapter(&camera);
        camera.fail_next("auto_focus", -libc::EIO);
        assert_eq!(adapter.auto_focus(), Err(HalError::DriverRejected(-libc::EIO)));
        assert_eq!(adapter.auto_focus(), Ok(()));
    }

    #[test]
    fn test_window_negotiation() {
        let camera = MockCamera::new(0);
        let adapter = window_adapter(&camera);
        let window = MockWindow::new(2);

        adapter.set_preview_window(Some(window.clone())).unwrap();
        assert_eq!(window.buffer_count(), 4);
        assert_eq!(window.usage(), USAGE_PRIVATE_0 | USAGE_SW_READ_OFTEN);
        assert_eq!(window.geometry(), Some((640, 480, PixelFormat::YCrCb420Sp)));
        assert_eq!(
            adapter.preview_geometry(),
            Some(PreviewGeometry { width: 640, height: 480 })
        );
    }

    #[test]
    fn test_high_min_undequeued_is_only_a_warning() {
        let camera = MockCamera::new(0);
        let adapter = overlay_adapter(&camera);
        let window = MockWindow::new(4);
        adapter.set_preview_window(Some(window.clone())).unwrap();
        assert_eq!(window.buffer_count(), 4);
    }

    #[test]
    fn test_release_reaches_driver_once() {
        let camera = MockCamera::new(0);
        let adapter = window_adapter(&camera);
        adapter.release();
        adapter.release();
        adapter.shutdown();
        assert_eq!(camera.call_count("release"), 1);
        assert!(!camera.has_sink());
    }

    #[test]
    fn test_parameters_are_fixed_up() {
        let camera = MockCamera::new(0);
        let adapter = window_adapter(&camera);
        let params = adapter.parameters().unwrap();
        assert_eq!(params.get("video-frame-format"), Some("yuv420sp"));
        assert_eq!(params.get("picture-size"), Some("2048x1536"));
        assert_eq!(params.get("orientation"), Some("landscape"));
    }
}
