//! Session Table
//!
//! Maps camera ids to live sessions. One slot per reported camera, each behind
//! its own lock, so opening or closing one camera never waits on another. The
//! live-session count is a single atomic checked against the capacity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use hal_protocol::HalError;
use tracing::{debug, info, warn};

/// Fixed-capacity registry of open sessions
pub struct SessionTable<T: ?Sized> {
    /// Slot per camera id
    slots: Vec<RwLock<Option<Arc<T>>>>,
    /// Sessions currently open
    live: AtomicUsize,
    /// Maximum concurrently open sessions
    capacity: usize,
}

impl<T: ?Sized> SessionTable<T> {
    /// Create a table for `slot_count` cameras, at most `capacity` open at once
    pub fn new(slot_count: usize, capacity: usize) -> Self {
        info!(slot_count, capacity, "Creating session table");
        Self {
            slots: (0..slot_count).map(|_| RwLock::new(None)).collect(),
            live: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Bind a new session for `camera_id`, built by `build`.
    ///
    /// Checks run in order: id range, already open, capacity. `build` runs
    /// while the slot is held, so a concurrent open of the same id waits and
    /// then sees `AlreadyOpen`. If `build` fails the slot stays empty and the
    /// reserved capacity is handed back.
    pub fn open_with<F>(&self, camera_id: i32, build: F) -> Result<Arc<T>, HalError>
    where
        F: FnOnce() -> Result<Arc<T>, HalError>,
    {
        let slot = self.slot(camera_id)?;
        let mut slot = slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!(camera_id, "Camera already open");
            return Err(HalError::AlreadyOpen(camera_id));
        }

        self.reserve().map_err(|live| {
            warn!(camera_id, live, capacity = self.capacity, "Session table full");
            HalError::ResourceExhausted(self.capacity)
        })?;

        match build() {
            Ok(session) => {
                *slot = Some(Arc::clone(&session));
                debug!(camera_id, live = self.live_count(), "Session bound");
                Ok(session)
            }
            Err(e) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                warn!(camera_id, error = %e, "Session construction failed");
                Err(e)
            }
        }
    }

    /// Unbind the session for `camera_id`, returning it if one was bound
    pub fn close(&self, camera_id: i32) -> Option<Arc<T>> {
        let slot = self.slot(camera_id).ok()?;
        let session = slot.write().unwrap_or_else(PoisonError::into_inner).take()?;
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!(camera_id, live = self.live_count(), "Session unbound");
        Some(session)
    }

    /// Session bound to `camera_id`
    pub fn lookup(&self, camera_id: i32) -> Option<Arc<T>> {
        self.slot(camera_id)
            .ok()?
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_open(&self, camera_id: i32) -> bool {
        self.lookup(camera_id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, camera_id: i32) -> Result<&RwLock<Option<Arc<T>>>, HalError> {
        usize::try_from(camera_id)
            .ok()
            .and_then(|index| self.slots.get(index))
            .ok_or(HalError::OutOfRange {
                id: camera_id,
                count: self.slots.len() as i32,
            })
    }

    /// Take one unit of capacity, or return the live count if none is left
    fn reserve(&self) -> Result<usize, usize> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.capacity).then_some(live + 1)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn open(table: &SessionTable<i32>, id: i32) -> Result<Arc<i32>, HalError> {
        table.open_with(id, || Ok(Arc::new(id)))
    }

    #[test]
    fn test_open_close_restores_slot() {
        let table = SessionTable::new(2, 2);
        assert_eq!(*open(&table, 1).unwrap(), 1);
        assert!(table.is_open(1));
        assert_eq!(table.live_count(), 1);

        assert_eq!(table.close(1).as_deref(), Some(&1));
        assert!(!table.is_open(1));
        assert_eq!(table.live_count(), 0);
        assert!(table.close(1).is_none());
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn test_already_open_keeps_session() {
        let table = SessionTable::new(2, 2);
        let first = open(&table, 0).unwrap();
        assert_eq!(open(&table, 0), Err(HalError::AlreadyOpen(0)));
        assert!(Arc::ptr_eq(&table.lookup(0).unwrap(), &first));
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn test_capacity_exhausted() {
        let table = SessionTable::new(3, 2);
        open(&table, 0).unwrap();
        open(&table, 1).unwrap();
        assert_eq!(open(&table, 2), Err(HalError::ResourceExhausted(2)));
        assert!(!table.is_open(2));

        table.close(0);
        open(&table, 2).unwrap();
    }

    #[test]
    fn test_out_of_range() {
        let table = SessionTable::<i32>::new(2, 2);
        assert_eq!(open(&table, 7), Err(HalError::OutOfRange { id: 7, count: 2 }));
        assert_eq!(open(&table, 2), Err(HalError::OutOfRange { id: 2, count: 2 }));
        assert!(matches!(open(&table, -1), Err(HalError::OutOfRange { .. })));
        assert!(table.lookup(7).is_none());
    }

    #[test]
    fn test_failed_build_unwinds() {
        let table = SessionTable::<i32>::new(2, 1);
        let err = table
            .open_with(0, || Err(HalError::OutOfMemory("driver".into())))
            .unwrap_err();
        assert_eq!(err, HalError::OutOfMemory("driver".into()));
        assert!(!table.is_open(0));
        assert_eq!(table.live_count(), 0);
        open(&table, 1).unwrap();
    }

    #[test]
    fn test_concurrent_opens_of_distinct_ids() {
        let table = Arc::new(SessionTable::<i32>::new(8, 8));
        let handles: Vec<_> = (0..8)
            .map(|id| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || open(&table, id).is_ok())
            })
            .collect();
        assert!(handles.into_iter().all(|h| h.join().unwrap()));
        assert_eq!(table.live_count(), 8);
    }

    proptest! {
        #[test]
        fn prop_table_invariants(ops in proptest::collection::vec((any::<bool>(), 0i32..4), 0..64)) {
            let table = SessionTable::<i32>::new(4, 2);
            let mut model = std::collections::BTreeSet::new();
            for (is_open, id) in ops {
                if is_open {
                    let result = open(&table, id);
                    if model.contains(&id) {
                        prop_assert_eq!(result, Err(HalError::AlreadyOpen(id)));
                    } else if model.len() == 2 {
                        prop_assert_eq!(result, Err(HalError::ResourceExhausted(2)));
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(id);
                    }
                } else {
                    prop_assert_eq!(table.close(id).is_some(), model.remove(&id));
                }
                prop_assert_eq!(table.live_count(), model.len());
                prop_assert!(table.live_count() <= table.capacity());
                for slot in 0..4 {
                    prop_assert_eq!(table.is_open(slot), model.contains(&slot));
                }
            }
        }
    }
}
