//! Owning wrapper for a blocking native collaborator
//!
//! Decoders and samplers do blocking work (decoding, pacing writes to a device).
//! Calls run on tokio's blocking pool while an owned lock is held, so a call
//! that is abandoned by a cancelled task still finishes before the next call
//! starts. `close` runs the collaborator's close exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

pub struct NativeHandle<T: ?Sized> {
    name: &'static str,
    inner: Arc<Mutex<Box<T>>>,
    closed: AtomicBool,
}

impl<T: ?Sized + Send + 'static> NativeHandle<T> {
    pub fn new(name: &'static str, inner: Box<T>) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(inner)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `op` against the collaborator on the blocking pool
    pub async fn call<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::InvalidState(format!("{} is closed", self.name)));
        }
        let mut guard = Arc::clone(&self.inner).lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut **guard)).await?
    }

    /// Close once; later calls return `Ok(())` without touching the collaborator
    pub async fn close_with<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut T) -> Result<()> + Send + 'static,
    {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut guard = Arc::clone(&self.inner).lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut **guard)).await?
    }
}

impl<T: ?Sized> fmt::Debug for NativeHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("name", &self.name)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
