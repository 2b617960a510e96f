//! In-process fakes of the vendor driver, platform and preview window
//!
//! `MockCamera` implements both generations' preview hookups, records every
//! call it receives, and lets tests inject driver events from any thread. Its
//! recording pool is bounded: a frame that is never returned keeps its slot
//! busy, and emitting into a full pool fails the way a stalled recorder would.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use hal_protocol::{CameraFacing, CameraInfo, CameraParameters, MsgType};
use tracing::debug;

use crate::driver::{
    DriverEvent, DriverGeneration, EventSink, OverlayControl, VendorCamera, VendorDriver,
    WindowControl,
};
use crate::memory::{FrameMemory, MemoryHeap};
use crate::platform::CameraPlatform;
use crate::window::{BufferHandle, PixelFormat, PreviewWindow};
use crate::WindowError;

/// Default recording pool depth
pub const DEFAULT_POOL_DEPTH: usize = 4;

const DEFAULT_PARAMS: &str =
    "preview-size=640x480;preview-format=yuv420sp;picture-size=2048x1536;sharpness=10";

#[derive(Default)]
struct MockState {
    msg_mask: MsgType,
    previewing: bool,
    recording: bool,
    overlay: bool,
    window: Option<Arc<dyn PreviewWindow>>,
    params: CameraParameters,
    released: bool,
    injected: HashMap<&'static str, i32>,
    calls: Vec<&'static str>,
}

struct RecordingSlot {
    heap: MemoryHeap,
    in_use: bool,
}

/// Fake vendor camera driver
pub struct MockCamera {
    camera_id: i32,
    state: Mutex<MockState>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    pool: Mutex<Vec<RecordingSlot>>,
    frames_returned: AtomicUsize,
    double_returns: AtomicUsize,
}

impl MockCamera {
    pub fn new(camera_id: i32) -> Arc<Self> {
        Self::with_pool_depth(camera_id, DEFAULT_POOL_DEPTH)
    }

    pub fn with_pool_depth(camera_id: i32, depth: usize) -> Arc<Self> {
        let params = CameraParameters::unflatten(DEFAULT_PARAMS).unwrap_or_default();
        Arc::new(Self {
            camera_id,
            state: Mutex::new(MockState {
                params,
                ..Default::default()
            }),
            sink: RwLock::new(None),
            pool: Mutex::new(
                (0..depth)
                    .map(|_| RecordingSlot {
                        heap: MemoryHeap::new(0),
                        in_use: false,
                    })
                    .collect(),
            ),
            frames_returned: AtomicUsize::new(0),
            double_returns: AtomicUsize::new(0),
        })
    }

    pub fn camera_id(&self) -> i32 {
        self.camera_id
    }

    /// Make the next call to `op` return `status`
    pub fn fail_next(&self, op: &'static str, status: i32) {
        self.state().injected.insert(op, status);
    }

    /// Every call received, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == op).count()
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }

    pub fn overlay_enabled(&self) -> bool {
        self.state().overlay
    }

    pub fn has_window(&self) -> bool {
        self.state().window.is_some()
    }

    pub fn has_sink(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Mask as seen by the driver itself
    pub fn driver_msg_mask(&self) -> MsgType {
        self.state().msg_mask
    }

    /// Recording frames handed back through `release_recording_frame`
    pub fn frames_returned(&self) -> usize {
        self.frames_returned.load(Ordering::SeqCst)
    }

    /// Returns for a slot that was not outstanding
    pub fn double_returns(&self) -> usize {
        self.double_returns.load(Ordering::SeqCst)
    }

    /// Recording frames emitted and not yet returned
    pub fn frames_in_flight(&self) -> usize {
        self.pool().iter().filter(|slot| slot.in_use).count()
    }

    pub fn emit_notify(&self, msg: MsgType, ext1: i32, ext2: i32) -> bool {
        self.post(DriverEvent::Notify { msg, ext1, ext2 })
    }

    /// Emit a still/preview payload. The bytes live at a non-zero offset of a
    /// fresh heap so consumers must honour the view's offset.
    pub fn emit_data(&self, msg: MsgType, bytes: &[u8]) -> bool {
        match Self::stage(bytes) {
            Some(frame) => self.post(DriverEvent::Data { msg, frame }),
            None => false,
        }
    }

    /// Emit a recording frame from the bounded pool. Fails when every slot is
    /// still held by the consumer side.
    pub fn emit_recording_frame(&self, timestamp_ns: i64, bytes: &[u8]) -> bool {
        let Some(frame) = self.stage_recording(bytes) else {
            return false;
        };
        self.post(DriverEvent::DataTimestamp {
            timestamp_ns,
            msg: MsgType::VIDEO_FRAME,
            frame,
        })
    }

    /// Current event sink, for emulating a driver thread that grabbed it
    /// before the session detached
    pub fn event_sink(&self) -> Option<Arc<dyn EventSink>> {
        self.sink.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Emit a recording frame through `sink` rather than the installed one
    pub fn emit_recording_frame_to(&self, sink: &dyn EventSink, timestamp_ns: i64, bytes: &[u8]) -> bool {
        let Some(frame) = self.stage_recording(bytes) else {
            return false;
        };
        sink.post(DriverEvent::DataTimestamp {
            timestamp_ns,
            msg: MsgType::VIDEO_FRAME,
            frame,
        });
        true
    }

    fn stage_recording(&self, bytes: &[u8]) -> Option<FrameMemory> {
        let mut pool = self.pool();
        let Some(slot) = pool.iter_mut().find(|slot| !slot.in_use) else {
            debug!(camera_id = self.camera_id, "recording pool exhausted");
            return None;
        };
        slot.heap = MemoryHeap::new(bytes.len());
        slot.heap.write(0, bytes).ok()?;
        let frame = slot.heap.view(0, bytes.len()).ok()?;
        slot.in_use = true;
        Some(frame)
    }

    /// Overlay generation: post a preview buffer from the preview heap
    pub fn emit_preview_buffer(&self, bytes: &[u8]) -> bool {
        match Self::stage(bytes) {
            Some(frame) => self.post(DriverEvent::PreviewBuffer { frame }),
            None => false,
        }
    }

    fn stage(bytes: &[u8]) -> Option<FrameMemory> {
        const OFFSET: usize = 16;
        let heap = MemoryHeap::new(OFFSET + bytes.len());
        heap.write(OFFSET, bytes).ok()?;
        heap.view(OFFSET, bytes.len()).ok()
    }

    fn post(&self, event: DriverEvent) -> bool {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => {
                sink.post(event);
                true
            }
            None => false,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool(&self) -> std::sync::MutexGuard<'_, Vec<RecordingSlot>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and take any injected status for it
    fn record(&self, op: &'static str) -> i32 {
        let mut state = self.state();
        state.calls.push(op);
        state.injected.remove(op).unwrap_or(0)
    }
}

impl VendorCamera for MockCamera {
    fn set_event_sink(&self, sink: Option<Arc<dyn EventSink>>) {
        self.record("set_event_sink");
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    fn enable_msg_type(&self, msg: MsgType) {
        self.record("enable_msg_type");
        let mut state = self.state();
        state.msg_mask = state.msg_mask.union(msg);
    }

    fn disable_msg_type(&self, msg: MsgType) {
        self.record("disable_msg_type");
        let mut state = self.state();
        state.msg_mask = state.msg_mask.difference(msg);
    }

    fn msg_type_enabled(&self, msg: MsgType) -> bool {
        self.state().msg_mask.intersects(msg)
    }

    fn start_preview(&self) -> i32 {
        let status = self.record("start_preview");
        if status == 0 {
            self.state().previewing = true;
        }
        status
    }

    fn stop_preview(&self) {
        self.record("stop_preview");
        self.state().previewing = false;
    }

    fn preview_enabled(&self) -> bool {
        self.state().previewing
    }

    fn start_recording(&self) -> i32 {
        let status = self.record("start_recording");
        if status == 0 {
            self.state().recording = true;
        }
        status
    }

    /// Like the real overlay-generation hardware, stopping the recorder also
    /// stops preview.
    fn stop_recording(&self) {
        self.record("stop_recording");
        let mut state = self.state();
        state.recording = false;
        state.previewing = false;
    }

    fn recording_enabled(&self) -> bool {
        self.state().recording
    }

    fn release_recording_frame(&self, frame: &FrameMemory) {
        self.record("release_recording_frame");
        let mut pool = self.pool();
        match pool
            .iter_mut()
            .find(|slot| slot.heap.id() == frame.heap_id())
        {
            Some(slot) if slot.in_use => {
                slot.in_use = false;
                self.frames_returned.fetch_add(1, Ordering::SeqCst);
            }
            _ => {
                self.double_returns.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn auto_focus(&self) -> i32 {
        self.record("auto_focus")
    }

    fn cancel_auto_focus(&self) -> i32 {
        self.record("cancel_auto_focus")
    }

    fn take_picture(&self) -> i32 {
        self.record("take_picture")
    }

    fn cancel_picture(&self) -> i32 {
        self.record("cancel_picture")
    }

    fn set_parameters(&self, params: &CameraParameters) -> i32 {
        let status = self.record("set_parameters");
        if status == 0 {
            self.state().params = params.clone();
        }
        status
    }

    fn parameters(&self) -> CameraParameters {
        self.record("parameters");
        self.state().params.clone()
    }

    fn send_command(&self, _cmd: i32, _arg1: i32, _arg2: i32) -> i32 {
        self.record("send_command")
    }

    fn release(&self) {
        self.record("release");
        let mut state = self.state();
        state.released = true;
        state.previewing = false;
        state.recording = false;
        state.overlay = false;
        state.window = None;
    }
}

impl OverlayControl for MockCamera {
    fn set_overlay(&self, enabled: bool) -> i32 {
        let status = self.record("set_overlay");
        if status == 0 {
            self.state().overlay = enabled;
        }
        status
    }
}

impl WindowControl for MockCamera {
    fn set_preview_window(&self, window: Option<Arc<dyn PreviewWindow>>) -> i32 {
        let status = self.record("set_preview_window");
        if status == 0 {
            self.state().window = window;
        }
        status
    }
}

/// Fake platform exposing a fixed list of cameras
pub struct MockPlatform {
    cameras: Vec<CameraInfo>,
    generation: DriverGeneration,
    refuse_open: AtomicBool,
    opened: Mutex<HashMap<i32, Arc<MockCamera>>>,
    open_count: AtomicUsize,
}

impl MockPlatform {
    pub fn new(cameras: Vec<CameraInfo>, generation: DriverGeneration) -> Self {
        Self {
            cameras,
            generation,
            refuse_open: AtomicBool::new(false),
            opened: Mutex::new(HashMap::new()),
            open_count: AtomicUsize::new(0),
        }
    }

    /// A back camera (id 0) and a front camera (id 1)
    pub fn two_cameras(generation: DriverGeneration) -> Self {
        Self::new(
            vec![
                CameraInfo::new(CameraFacing::Back, 0),
                CameraInfo::new(CameraFacing::Front, 0),
            ],
            generation,
        )
    }

    /// Make the vendor library refuse to instantiate drivers
    pub fn refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }

    /// Driver most recently opened for `camera_id`
    pub fn camera(&self, camera_id: i32) -> Option<Arc<MockCamera>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&camera_id)
            .cloned()
    }

    /// Successful driver instantiations
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

impl CameraPlatform for MockPlatform {
    fn number_of_cameras(&self) -> i32 {
        self.cameras.len() as i32
    }

    fn camera_info(&self, camera_id: i32) -> Option<CameraInfo> {
        usize::try_from(camera_id)
            .ok()
            .and_then(|id| self.cameras.get(id).copied())
    }

    fn open_camera(&self, camera_id: i32) -> Option<VendorDriver> {
        if self.refuse_open.load(Ordering::SeqCst) {
            return None;
        }
        let camera = MockCamera::new(camera_id);
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(camera_id, camera.clone());
        self.open_count.fetch_add(1, Ordering::SeqCst);
        Some(match self.generation {
            DriverGeneration::Overlay => VendorDriver::overlay(camera),
            DriverGeneration::Window => VendorDriver::window(camera),
        })
    }
}

#[derive(Default)]
struct WindowState {
    min_undequeued: u32,
    buffer_count: u32,
    usage: u32,
    geometry: Option<(u32, u32, PixelFormat)>,
    buffers: HashMap<u64, Vec<u8>>,
    dequeued: HashSet<u64>,
    queued: Vec<Vec<u8>>,
    next_id: u64,
    cancelled: usize,
    fail_min_undequeued: bool,
    fail_geometry: bool,
    fail_dequeue: bool,
    fail_lock: bool,
}

/// Fake preview window that keeps the bytes of every enqueued buffer
#[derive(Default)]
pub struct MockWindow {
    state: Mutex<WindowState>,
}

impl MockWindow {
    pub fn new(min_undequeued: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WindowState {
                min_undequeued,
                ..Default::default()
            }),
        })
    }

    pub fn fail_min_undequeued(&self, fail: bool) {
        self.state().fail_min_undequeued = fail;
    }

    pub fn fail_geometry(&self, fail: bool) {
        self.state().fail_geometry = fail;
    }

    pub fn fail_dequeue(&self, fail: bool) {
        self.state().fail_dequeue = fail;
    }

    pub fn fail_lock(&self, fail: bool) {
        self.state().fail_lock = fail;
    }

    pub fn buffer_count(&self) -> u32 {
        self.state().buffer_count
    }

    pub fn usage(&self) -> u32 {
        self.state().usage
    }

    pub fn geometry(&self) -> Option<(u32, u32, PixelFormat)> {
        self.state().geometry
    }

    /// Contents of every enqueued buffer, oldest first
    pub fn queued_frames(&self) -> Vec<Vec<u8>> {
        self.state().queued.clone()
    }

    pub fn cancelled(&self) -> usize {
        self.state().cancelled
    }

    /// Buffers currently dequeued and not yet returned
    pub fn outstanding(&self) -> usize {
        self.state().dequeued.len()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreviewWindow for MockWindow {
    fn min_undequeued_buffer_count(&self) -> Result<u32, WindowError> {
        let state = self.state();
        if state.fail_min_undequeued {
            return Err(WindowError::Status(-libc::ENODEV));
        }
        Ok(state.min_undequeued)
    }

    fn set_buffer_count(&self, count: u32) -> Result<(), WindowError> {
        self.state().buffer_count = count;
        Ok(())
    }

    fn set_usage(&self, usage: u32) -> Result<(), WindowError> {
        self.state().usage = usage;
        Ok(())
    }

    fn set_buffers_geometry(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), WindowError> {
        let mut state = self.state();
        if state.fail_geometry {
            return Err(WindowError::Status(-libc::EINVAL));
        }
        state.geometry = Some((width, height, format));
        Ok(())
    }

    fn dequeue_buffer(&self) -> Result<BufferHandle, WindowError> {
        let mut state = self.state();
        if state.fail_dequeue {
            return Err(WindowError::NoBuffer);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.dequeued.insert(id);
        let stride = state.geometry.map(|(w, _, _)| w).unwrap_or(0);
        Ok(BufferHandle { id, stride })
    }

    fn lock_buffer(
        &self,
        buffer: &BufferHandle,
        _usage: u32,
        width: u32,
        height: u32,
        fill: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), WindowError> {
        let mut state = self.state();
        if state.fail_lock {
            return Err(WindowError::Status(-libc::EBUSY));
        }
        if !state.dequeued.contains(&buffer.id) {
            return Err(WindowError::UnknownBuffer(buffer.id));
        }
        let format = state
            .geometry
            .map(|(_, _, format)| format)
            .unwrap_or(PixelFormat::YCrCb420Sp);
        let bytes = state
            .buffers
            .entry(buffer.id)
            .or_insert_with(|| vec![0u8; format.frame_size(width, height)]);
        fill(bytes);
        Ok(())
    }

    fn enqueue_buffer(&self, buffer: BufferHandle) -> Result<(), WindowError> {
        let mut state = self.state();
        if !state.dequeued.remove(&buffer.id) {
            return Err(WindowError::UnknownBuffer(buffer.id));
        }
        let bytes = state.buffers.remove(&buffer.id).unwrap_or_default();
        state.queued.push(bytes);
        Ok(())
    }

    fn cancel_buffer(&self, buffer: BufferHandle) -> Result<(), WindowError> {
        let mut state = self.state();
        if !state.dequeued.remove(&buffer.id) {
            return Err(WindowError::UnknownBuffer(buffer.id));
        }
        state.buffers.remove(&buffer.id);
        state.cancelled += 1;
        Ok(())
    }
}
