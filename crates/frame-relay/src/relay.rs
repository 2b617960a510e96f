//! Relay worker: driver threads → channel → consumer callbacks

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread::{self, JoinHandle};

use camera_driver::{DriverEvent, EventSink, FrameMemory, VendorCamera};
use hal_protocol::{MessageFilter, MsgType};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::callbacks::ConsumerCallbacks;
use crate::overlay::PreviewTarget;
use crate::RelayError;

/// Default depth of the driver → relay channel
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// What to do when the driver delivers a raw image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawImagePolicy {
    /// Deliver like any other data message
    #[default]
    Forward,
    /// Swallow the first raw image and disable raw-image messages from then on
    MuteAfterFirst,
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Camera this relay serves (for logging)
    pub camera_id: i32,
    /// Bounded channel depth
    pub queue_depth: usize,
    pub raw_image_policy: RawImagePolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            raw_image_policy: RawImagePolicy::Forward,
        }
    }
}

/// Snapshot of relay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Consumer callbacks invoked
    pub delivered: u64,
    /// Events dropped because their message type was disabled
    pub filtered: u64,
    /// Events dropped because no callback was registered
    pub unregistered: u64,
    /// Recording frames handed back to the driver
    pub frames_returned: u64,
    /// Overlay preview frames copied into the window
    pub preview_rendered: u64,
    /// Overlay preview frames skipped (no window, or window failure)
    pub preview_skipped: u64,
    /// Raw images swallowed by `RawImagePolicy::MuteAfterFirst`
    pub raw_muted: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    filtered: AtomicU64,
    unregistered: AtomicU64,
    frames_returned: AtomicU64,
    preview_rendered: AtomicU64,
    preview_skipped: AtomicU64,
    raw_muted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RelayStats {
        RelayStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            frames_returned: self.frames_returned.load(Ordering::Relaxed),
            preview_rendered: self.preview_rendered.load(Ordering::Relaxed),
            preview_skipped: self.preview_skipped.load(Ordering::Relaxed),
            raw_muted: self.raw_muted.load(Ordering::Relaxed),
        }
    }
}

enum RelayMessage {
    Event(DriverEvent),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// State shared by the relay handle, its worker thread and its senders
struct Shared {
    camera_id: i32,
    driver: Arc<dyn VendorCamera>,
    filter: Arc<MessageFilter>,
    callbacks: RwLock<Arc<ConsumerCallbacks>>,
    preview: RwLock<Option<PreviewTarget>>,
    raw_image_policy: RawImagePolicy,
    closing: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn dispatch(&self, event: DriverEvent) {
        match event {
            DriverEvent::Notify { msg, ext1, ext2 } => self.deliver_notify(msg, ext1, ext2),
            DriverEvent::Data { msg, frame } => self.deliver_data(msg, &frame),
            DriverEvent::DataTimestamp {
                timestamp_ns,
                msg,
                frame,
            } => self.deliver_timestamp(timestamp_ns, msg, &frame),
            DriverEvent::PreviewBuffer { frame } => self.render_preview(&frame),
        }
    }

    /// Consumer-visible delivery is allowed for this message type
    fn accepts(&self, msg: MsgType) -> bool {
        if self.closing.load(Ordering::Acquire) || !self.filter.is_enabled(msg) {
            Counters::bump(&self.counters.filtered);
            return false;
        }
        true
    }

    fn callbacks(&self) -> Arc<ConsumerCallbacks> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn deliver_notify(&self, msg: MsgType, ext1: i32, ext2: i32) {
        debug!(camera_id = self.camera_id, %msg, ext1, ext2, "notify");
        if !self.accepts(msg) {
            return;
        }
        let callbacks = self.callbacks();
        match &callbacks.notify {
            Some(notify) => {
                notify(msg, ext1, ext2, callbacks.cookie);
                Counters::bump(&self.counters.delivered);
            }
            None => Counters::bump(&self.counters.unregistered),
        }
    }

    fn deliver_data(&self, msg: MsgType, frame: &FrameMemory) {
        debug!(camera_id = self.camera_id, %msg, size = frame.size(), "data");
        if msg == MsgType::RAW_IMAGE && self.raw_image_policy == RawImagePolicy::MuteAfterFirst {
            info!(camera_id = self.camera_id, "raw image received, muting raw image messages");
            self.filter.disable(MsgType::RAW_IMAGE);
            self.driver.disable_msg_type(MsgType::RAW_IMAGE);
            Counters::bump(&self.counters.raw_muted);
            return;
        }
        if !self.accepts(msg) {
            return;
        }
        let callbacks = self.callbacks();
        let Some(data) = &callbacks.data else {
            Counters::bump(&self.counters.unregistered);
            return;
        };
        let block = callbacks.wrap_frame(frame);
        data(msg, block, 0, callbacks.cookie);
        Counters::bump(&self.counters.delivered);
    }

    /// The frame goes back to the driver pool after the consumer callback has
    /// returned and before the consumer block is released, whether or not the
    /// consumer saw it.
    fn deliver_timestamp(&self, timestamp_ns: i64, msg: MsgType, frame: &FrameMemory) {
        debug!(camera_id = self.camera_id, %msg, timestamp_ns, "data with timestamp");
        let mut block = None;
        if self.accepts(msg) {
            let callbacks = self.callbacks();
            match &callbacks.data_timestamp {
                Some(data_timestamp) => {
                    block = callbacks.wrap_frame(frame);
                    data_timestamp(timestamp_ns, msg, block.as_deref(), 0, callbacks.cookie);
                    Counters::bump(&self.counters.delivered);
                }
                None => Counters::bump(&self.counters.unregistered),
            }
        }

        self.driver.release_recording_frame(frame);
        Counters::bump(&self.counters.frames_returned);

        if let Some(block) = block {
            block.release();
        }
    }

    fn render_preview(&self, frame: &FrameMemory) {
        let target = self
            .preview
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(target) = target else {
            Counters::bump(&self.counters.preview_skipped);
            return;
        };
        match target.render(frame) {
            Ok(()) => Counters::bump(&self.counters.preview_rendered),
            Err(e) => {
                warn!(camera_id = self.camera_id, error = %e, "dropping preview frame");
                Counters::bump(&self.counters.preview_skipped);
            }
        }
    }
}

/// Event sink handed to the driver.
///
/// `post` blocks while the channel is full, which throttles the driver thread
/// instead of dropping frames. It must not be called from inside a Tokio
/// runtime.
///
/// Holds the driver strongly so frames posted after the relay is gone still
/// find their way back to the pool.
struct RelaySender {
    tx: mpsc::Sender<RelayMessage>,
    driver: Arc<dyn VendorCamera>,
    shared: Weak<Shared>,
}

impl EventSink for RelaySender {
    fn post(&self, event: DriverEvent) {
        let Err(mpsc::error::SendError(message)) = self.tx.blocking_send(RelayMessage::Event(event))
        else {
            return;
        };
        // Relay already gone: recording frames still go back to the pool
        if let RelayMessage::Event(DriverEvent::DataTimestamp { frame, .. }) = message {
            self.driver.release_recording_frame(&frame);
            if let Some(shared) = self.shared.upgrade() {
                Counters::bump(&shared.counters.frames_returned);
            }
        }
    }
}

/// Per-session frame relay, one worker thread each
pub struct FrameRelay {
    shared: Arc<Shared>,
    tx: mpsc::Sender<RelayMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FrameRelay {
    /// Spawn the relay worker for one session
    pub fn spawn(
        config: RelayConfig,
        driver: Arc<dyn VendorCamera>,
        filter: Arc<MessageFilter>,
    ) -> Result<Self, RelayError> {
        let (tx, rx) = mpsc::channel::<RelayMessage>(config.queue_depth.max(1));
        let shared = Arc::new(Shared {
            camera_id: config.camera_id,
            driver,
            filter,
            callbacks: RwLock::new(Arc::new(ConsumerCallbacks::default())),
            preview: RwLock::new(None),
            raw_image_policy: config.raw_image_policy,
            closing: AtomicBool::new(false),
            counters: Counters::default(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("camera{}-relay", config.camera_id))
            .spawn(move || run(worker_shared, rx))?;

        debug!(camera_id = config.camera_id, depth = config.queue_depth, "frame relay started");

        Ok(Self {
            shared,
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Sink to install on the driver
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::new(RelaySender {
            tx: self.tx.clone(),
            driver: Arc::clone(&self.shared.driver),
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Replace the consumer callbacks. Applies to events delivered afterwards.
    pub fn set_callbacks(&self, callbacks: ConsumerCallbacks) {
        *self
            .shared
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(callbacks);
    }

    /// Bind or clear the window overlay preview frames are copied into
    pub fn set_preview_target(&self, target: Option<PreviewTarget>) {
        *self
            .shared
            .preview
            .write()
            .unwrap_or_else(PoisonError::into_inner) = target;
    }

    pub fn has_preview_target(&self) -> bool {
        self.shared
            .preview
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn stats(&self) -> RelayStats {
        self.shared.counters.snapshot()
    }

    /// Block until every event posted before this call has been processed.
    ///
    /// Returns false if the relay has already shut down. Must not be called
    /// from a consumer callback.
    pub fn flush(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.blocking_send(RelayMessage::Flush(done_tx)).is_err() {
            return false;
        }
        done_rx.blocking_recv().is_ok()
    }

    /// Stop delivering to the consumer and stop the worker.
    ///
    /// Events still queued are drained: consumer callbacks are skipped but
    /// recording frames are returned to the driver. Idempotent.
    pub fn shutdown(&self) {
        self.shared.closing.store(true, Ordering::Release);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        if worker.thread().id() == thread::current().id() {
            // Closed from inside a consumer callback. The queue may be full and
            // this thread is its only reader, so never block here; the worker
            // sees `closing` once the callback returns.
            let _ = self.tx.try_send(RelayMessage::Shutdown);
            return;
        }
        if self.tx.blocking_send(RelayMessage::Shutdown).is_err() {
            debug!(camera_id = self.shared.camera_id, "relay worker already stopped");
        }
        if worker.join().is_err() {
            warn!(camera_id = self.shared.camera_id, "relay worker panicked");
        }
        debug!(camera_id = self.shared.camera_id, "frame relay stopped");
    }
}

impl Drop for FrameRelay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>, mut rx: mpsc::Receiver<RelayMessage>) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            RelayMessage::Event(event) => shared.dispatch(event),
            RelayMessage::Flush(done) => {
                let _ = done.send(());
            }
            RelayMessage::Shutdown => break,
        }
        if shared.closing.load(Ordering::Acquire) {
            break;
        }
    }

    rx.close();
    while let Ok(message) = rx.try_recv() {
        match message {
            RelayMessage::Event(event) => shared.dispatch(event),
            RelayMessage::Flush(done) => {
                let _ = done.send(());
            }
            RelayMessage::Shutdown => {}
        }
    }
}
