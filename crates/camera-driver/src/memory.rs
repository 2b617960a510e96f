//! Driver-owned shared memory
//!
//! Frames never leave the driver as raw addresses. A `FrameMemory` is a
//! byte-range view (offset + size) into a `MemoryHeap`; consumers get the bytes
//! through an explicit copy-out.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::MemoryError;

static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);

/// A shared memory region owned by the driver
#[derive(Clone)]
pub struct MemoryHeap {
    inner: Arc<HeapInner>,
}

struct HeapInner {
    id: u32,
    bytes: RwLock<Box<[u8]>>,
}

impl MemoryHeap {
    /// Allocate a zeroed heap
    pub fn new(size: usize) -> Self {
        Self {
            inner: Arc::new(HeapInner {
                id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
                bytes: RwLock::new(vec![0u8; size].into_boxed_slice()),
            }),
        }
    }

    /// Process-unique heap identifier
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner
            .bytes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `data` at `offset`
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        let mut bytes = self.inner.bytes.write().unwrap_or_else(PoisonError::into_inner);
        let range = checked_range(offset, data.len(), bytes.len())?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// View `size` bytes starting at `offset`
    pub fn view(&self, offset: usize, size: usize) -> Result<FrameMemory, MemoryError> {
        checked_range(offset, size, self.len())?;
        Ok(FrameMemory {
            heap: self.clone(),
            offset,
            size,
        })
    }

    fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let bytes = self.inner.bytes.read().unwrap_or_else(PoisonError::into_inner);
        f(&bytes)
    }
}

impl fmt::Debug for MemoryHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHeap")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}

fn checked_range(
    offset: usize,
    size: usize,
    heap_len: usize,
) -> Result<std::ops::Range<usize>, MemoryError> {
    match offset.checked_add(size) {
        Some(end) if end <= heap_len => Ok(offset..end),
        _ => Err(MemoryError::OutOfBounds {
            offset,
            size,
            heap_len,
        }),
    }
}

/// One delivered frame: a range of a driver heap
#[derive(Clone)]
pub struct FrameMemory {
    heap: MemoryHeap,
    offset: usize,
    size: usize,
}

impl FrameMemory {
    pub fn heap(&self) -> &MemoryHeap {
        &self.heap
    }

    pub fn heap_id(&self) -> u32 {
        self.heap.id()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy the frame into `dst`, returning the number of bytes copied.
    ///
    /// Copies `min(self.size(), dst.len())` bytes.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let len = self.size.min(dst.len());
        self.heap.with_bytes(|bytes| {
            dst[..len].copy_from_slice(&bytes[self.offset..self.offset + len]);
        });
        len
    }

    /// Owned copy of the frame bytes
    pub fn to_vec(&self) -> Vec<u8> {
        self.heap
            .with_bytes(|bytes| bytes[self.offset..self.offset + self.size].to_vec())
    }
}

impl fmt::Debug for FrameMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameMemory")
            .field("heap", &self.heap.id())
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_view_and_copy_out() {
        let heap = MemoryHeap::new(32);
        heap.write(8, &[1, 2, 3, 4]).unwrap();

        let frame = heap.view(8, 4).unwrap();
        assert_eq!(frame.to_vec(), vec![1, 2, 3, 4]);

        let mut small = [0u8; 2];
        assert_eq!(frame.copy_to(&mut small), 2);
        assert_eq!(small, [1, 2]);

        let mut large = [0u8; 8];
        assert_eq!(frame.copy_to(&mut large), 4);
        assert_eq!(&large[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let heap = MemoryHeap::new(16);
        assert!(heap.view(12, 8).is_err());
        assert!(heap.view(usize::MAX, 2).is_err());
        assert!(heap.write(15, &[0, 0]).is_err());
        assert!(heap.view(16, 0).is_ok());
    }

    #[test]
    fn test_heap_ids_unique() {
        let a = MemoryHeap::new(1);
        let b = MemoryHeap::new(1);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    proptest! {
        #[test]
        fn prop_view_copies_exactly_its_range(
            data in proptest::collection::vec(any::<u8>(), 0..64),
            offset in 0usize..32,
            size in 0usize..64,
        ) {
            let heap = MemoryHeap::new(data.len());
            heap.write(0, &data).unwrap();
            match heap.view(offset, size) {
                Ok(frame) => {
                    prop_assert!(offset + size <= data.len());
                    prop_assert_eq!(frame.to_vec(), data[offset..offset + size].to_vec());
                }
                Err(MemoryError::OutOfBounds { heap_len, .. }) => {
                    prop_assert!(offset + size > data.len());
                    prop_assert_eq!(heap_len, data.len());
                }
            }
        }
    }
}
