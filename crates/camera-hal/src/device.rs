//! Device Session
//!
//! `CameraDevice` is the handle the consumer gets back from `open`. Its methods
//! mirror the device operation table: status-returning operations yield `0` or
//! a negative errno, the rest return nothing. Every operation resolves the
//! adapter through the session table and refuses to touch the driver once the
//! session has been released or closed.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use camera_driver::{DriverGeneration, PreviewWindow};
use frame_relay::{ConsumerCallbacks, MemoryBlock};
use hal_protocol::{CameraParameters, HalError, MsgType, OK};
use tracing::{debug, info, warn};

use crate::adapter::{DriverAdapter, PreviewGeometry};
use crate::config::SessionConfig;
use crate::table::SessionTable;

/// Boolean answer on the device ABI
fn flag(value: bool) -> i32 {
    i32::from(value)
}

fn status(result: Result<(), HalError>) -> i32 {
    match result {
        Ok(()) => OK,
        Err(e) => e.status(),
    }
}

/// One open camera
pub struct CameraDevice {
    camera_id: i32,
    generation: DriverGeneration,
    session: SessionConfig,
    table: Arc<SessionTable<dyn DriverAdapter>>,
    preview: Mutex<Option<PreviewGeometry>>,
    released: AtomicBool,
    closed: AtomicBool,
}

impl CameraDevice {
    pub(crate) fn new(
        adapter: &dyn DriverAdapter,
        table: Arc<SessionTable<dyn DriverAdapter>>,
    ) -> Self {
        Self {
            camera_id: adapter.camera_id(),
            generation: adapter.generation(),
            session: adapter.core().session().clone(),
            table,
            preview: Mutex::new(None),
            released: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn camera_id(&self) -> i32 {
        self.camera_id
    }

    pub fn generation(&self) -> DriverGeneration {
        self.generation
    }

    /// Values fixed when the session was opened
    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Preview size negotiated by the last successful `set_preview_window`
    pub fn preview_size(&self) -> Option<(u32, u32)> {
        self.preview
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|g| (g.width, g.height))
    }

    fn adapter(&self, op: &'static str) -> Result<Arc<dyn DriverAdapter>, HalError> {
        if self.is_closed() {
            return Err(HalError::invalid(format!("{op} on closed camera {}", self.camera_id)));
        }
        if self.is_released() {
            return Err(HalError::invalid(format!("{op} on released camera {}", self.camera_id)));
        }
        self.table
            .lookup(self.camera_id)
            .ok_or_else(|| HalError::invalid(format!("camera {} has no session", self.camera_id)))
    }

    /// Run `op` against the adapter, logging refusals
    fn with_adapter<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&dyn DriverAdapter) -> Result<R, HalError>,
    ) -> Result<R, HalError> {
        debug!(camera_id = self.camera_id, op, "device op");
        let result = self.adapter(op).and_then(|adapter| f(adapter.as_ref()));
        if let Err(e) = &result {
            warn!(camera_id = self.camera_id, op, error = %e, "device op failed");
        }
        result
    }

    pub fn set_preview_window(&self, window: Option<Arc<dyn PreviewWindow>>) -> i32 {
        let result = self.with_adapter("set_preview_window", |adapter| {
            adapter.set_preview_window(window)?;
            Ok(adapter.preview_geometry())
        });
        let geometry = result.as_ref().ok().copied().flatten();
        *self.preview.lock().unwrap_or_else(PoisonError::into_inner) = geometry;
        status(result.map(|_| ()))
    }

    /// Last registration wins; applies to callbacks delivered afterwards
    pub fn set_callbacks(&self, callbacks: ConsumerCallbacks) {
        let _ = self.with_adapter("set_callbacks", |adapter| {
            adapter.set_callbacks(callbacks);
            Ok(())
        });
    }

    pub fn enable_msg_type(&self, msg: MsgType) {
        let _ = self.with_adapter("enable_msg_type", |adapter| {
            adapter.enable_msg_type(msg);
            Ok(())
        });
    }

    pub fn disable_msg_type(&self, msg: MsgType) {
        let _ = self.with_adapter("disable_msg_type", |adapter| {
            adapter.disable_msg_type(msg);
            Ok(())
        });
    }

    /// 1 if any of the requested types is enabled, 0 if none
    pub fn msg_type_enabled(&self, msg: MsgType) -> i32 {
        match self.with_adapter("msg_type_enabled", |adapter| Ok(adapter.msg_type_enabled(msg))) {
            Ok(enabled) => flag(enabled),
            Err(e) => e.status(),
        }
    }

    pub fn start_preview(&self) -> i32 {
        status(self.with_adapter("start_preview", |adapter| adapter.start_preview()))
    }

    pub fn stop_preview(&self) {
        let _ = self.with_adapter("stop_preview", |adapter| {
            adapter.stop_preview();
            Ok(())
        });
    }

    pub fn preview_enabled(&self) -> i32 {
        match self.with_adapter("preview_enabled", |adapter| Ok(adapter.preview_enabled())) {
            Ok(enabled) => flag(enabled),
            Err(e) => e.status(),
        }
    }

    /// Metadata-only recording buffers are not supported. Turning the mode
    /// off is accepted.
    pub fn store_meta_data_in_buffers(&self, enable: bool) -> i32 {
        status(self.with_adapter("store_meta_data_in_buffers", |_| {
            if enable {
                Err(HalError::NotSupported("meta data in buffers"))
            } else {
                Ok(())
            }
        }))
    }

    pub fn start_recording(&self) -> i32 {
        status(self.with_adapter("start_recording", |adapter| adapter.start_recording()))
    }

    pub fn stop_recording(&self) {
        let _ = self.with_adapter("stop_recording", |adapter| {
            adapter.stop_recording();
            Ok(())
        });
    }

    pub fn recording_enabled(&self) -> i32 {
        match self.with_adapter("recording_enabled", |adapter| Ok(adapter.recording_enabled())) {
            Ok(enabled) => flag(enabled),
            Err(e) => e.status(),
        }
    }

    /// Recording frames are handed back to the driver by the relay as soon as
    /// the timestamp callback returns, so there is nothing left to release.
    pub fn release_recording_frame(&self, frame: &dyn MemoryBlock) {
        let _ = self.with_adapter("release_recording_frame", |_| {
            debug!(camera_id = self.camera_id, size = frame.data().len(), "recording frame already returned");
            Ok(())
        });
    }

    pub fn auto_focus(&self) -> i32 {
        status(self.with_adapter("auto_focus", |adapter| adapter.auto_focus()))
    }

    /// Best effort: a focus callback may still arrive afterwards
    pub fn cancel_auto_focus(&self) -> i32 {
        status(self.with_adapter("cancel_auto_focus", |adapter| adapter.cancel_auto_focus()))
    }

    pub fn take_picture(&self) -> i32 {
        status(self.with_adapter("take_picture", |adapter| adapter.take_picture()))
    }

    /// Best effort: capture callbacks may still arrive afterwards
    pub fn cancel_picture(&self) -> i32 {
        status(self.with_adapter("cancel_picture", |adapter| adapter.cancel_picture()))
    }

    pub fn set_parameters(&self, params: &str) -> i32 {
        status(self.with_adapter("set_parameters", |adapter| {
            let params = CameraParameters::unflatten(params)?;
            adapter.set_parameters(&params)
        }))
    }

    /// Flattened driver parameters with fixups applied. `None` once released.
    pub fn get_parameters(&self) -> Option<String> {
        self.with_adapter("get_parameters", |adapter| adapter.parameters())
            .ok()
            .map(|params| params.flatten())
    }

    pub fn send_command(&self, cmd: i32, arg1: i32, arg2: i32) -> i32 {
        match self.with_adapter("send_command", |adapter| adapter.send_command(cmd, arg1, arg2)) {
            Ok(code) => code,
            Err(e) => e.status(),
        }
    }

    /// Stop and free the driver. Every later operation except `close` fails
    /// with `-EINVAL`.
    pub fn release(&self) {
        let Ok(adapter) = self.adapter("release") else {
            debug!(camera_id = self.camera_id, "release on inactive session ignored");
            return;
        };
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(camera_id = self.camera_id, "Releasing camera");
        adapter.release();
    }

    /// Write a human readable session summary
    pub fn dump(&self, out: &mut dyn Write) -> i32 {
        let adapter = match self.adapter("dump") {
            Ok(adapter) => adapter,
            Err(e) => return e.status(),
        };
        let stats = adapter.relay_stats();
        let preview = self
            .preview_size()
            .map_or_else(|| "unbound".to_string(), |(w, h)| format!("{w}x{h}"));
        let written = writeln!(
            out,
            "camera {id} ({generation})\n  preview window: {preview}\n  preview: {previewing}, recording: {recording}\n  messages: {messages}\n  delivered {delivered}, filtered {filtered}, unregistered {unregistered}\n  recording frames returned {returned}\n  overlay frames rendered {rendered}, skipped {skipped}",
            id = self.camera_id,
            generation = self.generation,
            previewing = adapter.preview_enabled(),
            recording = adapter.recording_enabled(),
            messages = adapter.core().filter().snapshot(),
            delivered = stats.delivered,
            filtered = stats.filtered,
            unregistered = stats.unregistered,
            returned = stats.frames_returned,
            rendered = stats.preview_rendered,
            skipped = stats.preview_skipped,
        );
        match written {
            Ok(()) => OK,
            Err(e) => e.raw_os_error().map_or(-libc::EIO, |code| -code),
        }
    }

    /// Tear the session down and free its table slot.
    ///
    /// Releases the driver unless that already happened. Safe to call more
    /// than once; only the first call has an effect.
    pub fn close(&self) -> i32 {
        if self.closed.swap(true, Ordering::AcqRel) {
            return OK;
        }
        info!(camera_id = self.camera_id, "Closing camera");
        self.released.store(true, Ordering::Release);
        *self.preview.lock().unwrap_or_else(PoisonError::into_inner) = None;
        match self.table.close(self.camera_id) {
            Some(adapter) => {
                adapter.shutdown();
                OK
            }
            None => {
                warn!(camera_id = self.camera_id, "No session bound at close");
                HalError::invalid("no session bound").status()
            }
        }
    }
}

impl Drop for CameraDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CameraDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraDevice")
            .field("camera_id", &self.camera_id)
            .field("generation", &self.generation)
            .field("released", &self.is_released())
            .field("closed", &self.is_closed())
            .finish()
    }
}
