//! Bounded frame queue between a decode task and a playback task
//!
//! Storage is a `ringbuf` heap ring split into producer and consumer halves at
//! construction. Each half sits behind its own lock, so the single producer and
//! the single consumer never contend with each other; `put` and `take` suspend
//! on `Notify` signals instead of spinning when the ring is full or empty.
//!
//! Items are dropped when cleared or when the buffer closes, which returns any
//! pool slots a video frame was holding.

use parking_lot::Mutex;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use crate::error::{Error, Result};

/// Bounded single-producer/single-consumer FIFO
pub struct Buffer<T> {
    /// Producer half (decode side)
    prod: Mutex<HeapProd<T>>,

    /// Consumer half (playback side)
    cons: Mutex<HeapCons<T>>,

    capacity: usize,

    /// Signalled after every successful put
    item_added: Notify,

    /// Signalled after every successful take or clear
    space_freed: Notify,

    closed: AtomicBool,
}

impl<T> Buffer<T> {
    /// Create a buffer holding at most `capacity` items
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidInput("buffer capacity must be at least 1".to_string()));
        }

        let (prod, cons) = HeapRb::<T>::new(capacity).split();

        Ok(Self {
            prod: Mutex::new(prod),
            cons: Mutex::new(cons),
            capacity,
            item_added: Notify::new(),
            space_freed: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.cons.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.prod.lock().is_full()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Append an item, waiting while the buffer is full.
    ///
    /// If the future is dropped while waiting, the item is dropped with it.
    pub async fn put(&self, item: T) -> Result<()> {
        let mut item = item;
        loop {
            let notified = self.space_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_put(item)? {
                None => return Ok(()),
                Some(rejected) => item = rejected,
            }

            notified.await;
        }
    }

    /// Append without waiting; hands the item back when full
    pub fn try_put(&self, item: T) -> Result<Option<T>> {
        if self.is_closed() {
            return Err(Error::BufferClosed);
        }
        match self.prod.lock().try_push(item) {
            Ok(()) => {
                self.item_added.notify_one();
                Ok(None)
            }
            Err(rejected) => Ok(Some(rejected)),
        }
    }

    /// Remove the oldest item, waiting while the buffer is empty
    pub async fn take(&self) -> Result<T> {
        loop {
            let notified = self.item_added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_take()? {
                return Ok(item);
            }

            notified.await;
        }
    }

    /// Remove the oldest item if there is one
    pub fn try_take(&self) -> Result<Option<T>> {
        if self.is_closed() {
            return Err(Error::BufferClosed);
        }
        let item = self.cons.lock().try_pop();
        if item.is_some() {
            self.space_freed.notify_one();
        }
        Ok(item)
    }

    /// Drop every queued item, returning how many were removed
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = self.cons.lock().pop_iter().collect();
        let count = drained.len();
        // Dropped outside the lock: video frames return pool slots here
        drop(drained);

        if count > 0 {
            self.space_freed.notify_one();
        }
        count
    }

    /// Clear the buffer and fail pending and future operations
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clear();
        self.item_added.notify_waiters();
        self.space_freed.notify_waiters();
    }
}

impl<T> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::pool::Pool;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let buffer = Buffer::new(4).unwrap();
        for i in 0..4 {
            buffer.put(i).await.unwrap();
        }
        for expected in 0..4 {
            assert_eq!(buffer.take().await.unwrap(), expected);
        }
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_order_across_tasks() {
        let buffer = Arc::new(Buffer::new(3).unwrap());

        let producer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                for i in 0..100u32 {
                    buffer.put(i).await.unwrap();
                }
            })
        };

        let mut received = Vec::new();
        for _ in 0..100 {
            received.push(buffer.take().await.unwrap());
        }
        producer.await.unwrap();

        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_put_waits_while_full() {
        let buffer = Arc::new(Buffer::new(1).unwrap());
        buffer.put(1).await.unwrap();
        assert!(buffer.is_full());

        let blocked = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move { buffer.put(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished(), "put must wait for space");

        assert_eq!(buffer.take().await.unwrap(), 1);
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(buffer.take().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_take_leaves_buffer_usable() {
        let buffer = Buffer::<u8>::new(2).unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), buffer.take()).await;
        assert!(timed_out.is_err());

        buffer.put(7).await.unwrap();
        assert_eq!(buffer.take().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let buffer = Arc::new(Buffer::<u8>::new(1).unwrap());
        let waiter = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move { buffer.take().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        buffer.close();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::BufferClosed)));
        assert!(matches!(buffer.put(1).await, Err(Error::BufferClosed)));
    }

    #[tokio::test]
    async fn test_clear_returns_pool_slots() {
        let pool = Pool::new(3, 8).unwrap();
        let buffer = Buffer::new(3).unwrap();
        for _ in 0..3 {
            buffer.put(pool.acquire().await.unwrap()).await.unwrap();
        }
        assert_eq!(pool.outstanding(), 3);

        assert_eq!(buffer.clear(), 3);
        assert_eq!(pool.outstanding(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(Buffer::<u8>::new(0).is_err());
    }
}
