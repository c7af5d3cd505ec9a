//! Fixed-capacity allocator for video frame payloads
//!
//! Every slot is allocated once at construction and recycled for the life of
//! the pool. A `PoolItem` is an owning guard: dropping it, or handing it to
//! [`Pool::release`], returns the slot. Because items are moved on release a
//! slot cannot be returned twice.
//!
//! `reset()` reclaims every outstanding slot at once by bumping the pool
//! generation. Guards issued under an older generation become inert; when they
//! drop, their memory is simply freed instead of re-entering the free list.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Video payload pool
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    id: Uuid,
    capacity: usize,
    slot_size: usize,
    state: Mutex<PoolState>,
    /// Signalled whenever a slot becomes free or the pool closes
    slot_freed: Notify,
}

struct PoolState {
    generation: u64,
    /// Indices of slots ready to hand out
    free: Vec<usize>,
    /// Parked slot memory; `None` while the slot is checked out
    slots: Vec<Option<Vec<u8>>>,
    outstanding: usize,
    closed: bool,
}

impl Pool {
    /// Allocate `capacity` slots of `slot_size` bytes each
    pub fn new(capacity: usize, slot_size: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidInput("pool capacity must be at least 1".to_string()));
        }
        if slot_size == 0 {
            return Err(Error::InvalidInput("pool slot size must be positive".to_string()));
        }

        let slots = (0..capacity).map(|_| Some(vec![0u8; slot_size])).collect();
        let free = (0..capacity).rev().collect();

        debug!(capacity, slot_size, "Video pool allocated");

        Ok(Self {
            shared: Arc::new(PoolShared {
                id: Uuid::new_v4(),
                capacity,
                slot_size,
                state: Mutex::new(PoolState {
                    generation: 0,
                    free,
                    slots,
                    outstanding: 0,
                    closed: false,
                }),
                slot_freed: Notify::new(),
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn slot_size(&self) -> usize {
        self.shared.slot_size
    }

    /// Slots currently checked out
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().outstanding
    }

    /// Slots ready to hand out
    pub fn available(&self) -> usize {
        self.shared.state.lock().free.len()
    }

    /// Take a slot, waiting while all of them are checked out.
    ///
    /// Cancel-safe: dropping the future before it resolves takes nothing.
    pub async fn acquire(&self) -> Result<PoolItem> {
        loop {
            let notified = self.shared.slot_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_acquire()? {
                return Ok(item);
            }

            notified.await;
        }
    }

    /// Take a slot if one is free
    pub fn try_acquire(&self) -> Result<Option<PoolItem>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::PoolClosed);
        }
        let Some(index) = state.free.pop() else {
            return Ok(None);
        };
        let data = state.slots[index]
            .take()
            .unwrap_or_else(|| vec![0u8; self.shared.slot_size]);
        state.outstanding += 1;

        Ok(Some(PoolItem {
            pool: Arc::clone(&self.shared),
            index,
            generation: state.generation,
            data: Some(data),
        }))
    }

    /// Return a slot explicitly.
    ///
    /// Returning an item issued by another pool is a programming error: it
    /// panics in debug builds and is reported as `ForeignPoolItem` otherwise.
    /// The item still goes back to the pool that issued it.
    pub fn release(&self, item: PoolItem) -> Result<()> {
        if !Arc::ptr_eq(&self.shared, &item.pool) {
            debug_assert!(false, "pool item released to a foreign pool");
            warn!(pool = %self.shared.id, owner = %item.pool.id, "Foreign pool item released");
            return Err(Error::ForeignPoolItem);
        }
        drop(item);
        Ok(())
    }

    /// Force every outstanding slot back into the free set.
    ///
    /// Slots still held by guards are replaced with fresh memory; those guards
    /// no longer count against the pool.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        let reclaimed = state.outstanding;
        state.generation += 1;
        let slot_size = self.shared.slot_size;
        for slot in state.slots.iter_mut().filter(|slot| slot.is_none()) {
            *slot = Some(vec![0u8; slot_size]);
        }
        state.free = (0..self.shared.capacity).rev().collect();
        state.outstanding = 0;
        drop(state);

        if reclaimed > 0 {
            debug!(reclaimed, "Video pool reset");
        }
        self.shared.slot_freed.notify_waiters();
    }

    /// Free all slot memory and fail pending and future acquisitions
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.generation += 1;
        state.free.clear();
        state.slots.clear();
        state.outstanding = 0;
        drop(state);

        self.shared.slot_freed.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("capacity", &self.shared.capacity)
            .field("slot_size", &self.shared.slot_size)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl PoolShared {
    fn give_back(&self, index: usize, generation: u64, data: Vec<u8>) {
        let mut state = self.state.lock();
        if state.closed || state.generation != generation {
            // Reclaimed by reset or close already
            return;
        }
        debug_assert!(state.slots[index].is_none(), "pool slot {} returned twice", index);
        state.slots[index] = Some(data);
        state.free.push(index);
        state.outstanding -= 1;
        drop(state);

        self.slot_freed.notify_one();
    }
}

/// Exclusive handle to one pool slot
pub struct PoolItem {
    pool: Arc<PoolShared>,
    index: usize,
    generation: u64,
    data: Option<Vec<u8>>,
}

impl PoolItem {
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PoolItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolItem")
            .field("pool", &self.pool.id)
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for PoolItem {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.give_back(self.index, self.generation, data);
        }
    }
}
