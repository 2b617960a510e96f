//! Consumer callback registration and consumer-owned memory

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use camera_driver::FrameMemory;
use hal_protocol::MsgType;
use tracing::warn;

/// Opaque consumer context, passed back unchanged with every callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConsumerCookie(pub usize);

/// A memory block allocated by the consumer's allocator
pub trait MemoryBlock: Send {
    fn data(&self) -> &[u8];
    fn data_mut(&mut self) -> &mut [u8];
    /// Hand the block back to the consumer's allocator
    fn release(self: Box<Self>);
}

pub type NotifyCallback = Arc<dyn Fn(MsgType, i32, i32, ConsumerCookie) + Send + Sync>;

/// Receives ownership of the block; releasing it is the consumer's job
pub type DataCallback =
    Arc<dyn Fn(MsgType, Option<Box<dyn MemoryBlock>>, u32, ConsumerCookie) + Send + Sync>;

/// Borrows the block; the relay releases it after the callback returns
pub type DataTimestampCallback =
    Arc<dyn Fn(i64, MsgType, Option<&dyn MemoryBlock>, u32, ConsumerCookie) + Send + Sync>;

/// Allocator: `(buffer size, buffer count, cookie)`
pub type RequestMemory =
    Arc<dyn Fn(usize, u32, ConsumerCookie) -> Option<Box<dyn MemoryBlock>> + Send + Sync>;

/// Callbacks registered by the consumer with `set_callbacks`
#[derive(Clone, Default)]
pub struct ConsumerCallbacks {
    pub notify: Option<NotifyCallback>,
    pub data: Option<DataCallback>,
    pub data_timestamp: Option<DataTimestampCallback>,
    pub request_memory: Option<RequestMemory>,
    pub cookie: ConsumerCookie,
}

impl ConsumerCallbacks {
    pub fn new(cookie: ConsumerCookie) -> Self {
        Self {
            cookie,
            ..Default::default()
        }
    }

    pub fn with_notify<F>(mut self, f: F) -> Self
    where
        F: Fn(MsgType, i32, i32, ConsumerCookie) + Send + Sync + 'static,
    {
        self.notify = Some(Arc::new(f));
        self
    }

    pub fn with_data<F>(mut self, f: F) -> Self
    where
        F: Fn(MsgType, Option<Box<dyn MemoryBlock>>, u32, ConsumerCookie) + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(f));
        self
    }

    pub fn with_data_timestamp<F>(mut self, f: F) -> Self
    where
        F: Fn(i64, MsgType, Option<&dyn MemoryBlock>, u32, ConsumerCookie) + Send + Sync + 'static,
    {
        self.data_timestamp = Some(Arc::new(f));
        self
    }

    pub fn with_request_memory(mut self, request: RequestMemory) -> Self {
        self.request_memory = Some(request);
        self
    }

    /// Copy a driver frame into a freshly requested consumer block.
    ///
    /// `None` when no allocator is registered or the allocator refuses.
    pub(crate) fn wrap_frame(&self, frame: &FrameMemory) -> Option<Box<dyn MemoryBlock>> {
        let request = self.request_memory.as_ref()?;
        let Some(mut block) = request(frame.size(), 1, self.cookie) else {
            warn!(size = frame.size(), "consumer allocator returned no block");
            return None;
        };
        let copied = frame.copy_to(block.data_mut());
        if copied < frame.size() {
            warn!(copied, size = frame.size(), "consumer block smaller than frame");
        }
        Some(block)
    }
}

impl fmt::Debug for ConsumerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerCallbacks")
            .field("notify", &self.notify.is_some())
            .field("data", &self.data.is_some())
            .field("data_timestamp", &self.data_timestamp.is_some())
            .field("request_memory", &self.request_memory.is_some())
            .field("cookie", &self.cookie)
            .finish()
    }
}

/// Heap-backed allocator that counts allocations and releases
#[derive(Debug, Default)]
pub struct VecAllocator {
    allocated: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl VecAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocator entry point to register with `ConsumerCallbacks`
    pub fn request_memory(self: &Arc<Self>) -> RequestMemory {
        let allocator = Arc::clone(self);
        Arc::new(move |size: usize, count: u32, _cookie: ConsumerCookie| {
            allocator.allocated.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(VecBlock {
                bytes: vec![0u8; size * count.max(1) as usize],
                released: Arc::clone(&allocator.released),
            }) as Box<dyn MemoryBlock>)
        })
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct VecBlock {
    bytes: Vec<u8>,
    released: Arc<AtomicUsize>,
}

impl MemoryBlock for VecBlock {
    fn data(&self) -> &[u8] {
        &self.bytes
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn release(self: Box<Self>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
