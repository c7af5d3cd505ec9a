//! Playback engine internals
//!
//! - `pool` / `buffer` - payload allocator and bounded frame queue
//! - `pipeline` - resources owned for one media item
//! - `buffer_loop` - decode-ahead task
//! - `playback_loop` - clock-paced presentation task
//! - `sync` - audio/video synchronization rules
//! - `snapshot` - standalone frame capture at chosen timestamps
//!
//! Both loops report to the controller through a [`LoopEvent`] channel. Every
//! event carries the run id it was produced under; stopping or restarting a
//! loop bumps the id so late events from a finished run can be recognized.

pub mod buffer;
pub mod buffer_loop;
pub mod pipeline;
pub mod playback_loop;
pub mod pool;
pub mod snapshot;
pub mod sync;

use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::media::output::Renderer;

pub use buffer::Buffer;
pub use buffer_loop::BufferLoop;
pub use pipeline::{AudioPipeline, BufferLevels, BuildOptions, Pipeline, StreamEnd, VideoPipeline};
pub use playback_loop::{PlaybackLoop, PlaybackStats, PlaybackStatsSnapshot};
pub use pool::{Pool, PoolItem};
pub use snapshot::{snapshot, snapshots};

/// Renderer binding shared between the controller and the playback task
pub type RendererSlot = Arc<RwLock<Option<Arc<dyn Renderer>>>>;

/// Which loop produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Buffer,
    Playback,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopKind::Buffer => write!(f, "buffer loop"),
            LoopKind::Playback => write!(f, "playback loop"),
        }
    }
}

/// Progress and outcome reports from the loops
#[derive(Debug)]
pub enum LoopEvent {
    /// Newest decoded position
    BufferTimestamp { run: u64, timestamp: Duration },
    /// Decoder reached end of stream on every stream
    BufferComplete { run: u64 },
    /// Newest presented position
    PlaybackTimestamp { run: u64, timestamp: Duration },
    /// Playback found a buffer empty and is waiting on the decoder
    Waiting { run: u64 },
    /// Every stream was presented to the end
    PlaybackComplete { run: u64 },
    Failed { origin: LoopKind, run: u64, error: Error },
}

impl LoopEvent {
    pub fn origin(&self) -> LoopKind {
        match self {
            LoopEvent::BufferTimestamp { .. } | LoopEvent::BufferComplete { .. } => LoopKind::Buffer,
            LoopEvent::PlaybackTimestamp { .. } | LoopEvent::Waiting { .. } | LoopEvent::PlaybackComplete { .. } => {
                LoopKind::Playback
            }
            LoopEvent::Failed { origin, .. } => *origin,
        }
    }

    pub fn run(&self) -> u64 {
        match self {
            LoopEvent::BufferTimestamp { run, .. }
            | LoopEvent::BufferComplete { run }
            | LoopEvent::PlaybackTimestamp { run, .. }
            | LoopEvent::Waiting { run }
            | LoopEvent::PlaybackComplete { run }
            | LoopEvent::Failed { run, .. } => *run,
        }
    }
}

pub type LoopEventSender = mpsc::UnboundedSender<LoopEvent>;
pub type LoopEventReceiver = mpsc::UnboundedReceiver<LoopEvent>;

/// Current run id of a loop, readable without the loop's lock
#[derive(Debug, Clone, Default)]
pub struct RunTracker(Arc<AtomicU64>);

impl RunTracker {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_current(&self, run: u64) -> bool {
        self.current() == run
    }

    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Start/stop bookkeeping shared by both loops
///
/// `start` cancels and joins any previous run before spawning the next one;
/// `stop` cancels and joins, and is a no-op when nothing is running.
pub(crate) struct LoopRunner {
    kind: LoopKind,
    runs: RunTracker,
    active: Mutex<Option<ActiveRun>>,
}

impl LoopRunner {
    pub(crate) fn new(kind: LoopKind, runs: RunTracker) -> Self {
        Self {
            kind,
            runs,
            active: Mutex::new(None),
        }
    }

    pub(crate) async fn start<F, Fut>(&self, body: F) -> Result<()>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut active = self.active.lock().await;
        let replaced = match active.take() {
            Some(previous) => self.finish(previous).await,
            None => Ok(()),
        };

        let run = self.runs.next();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let work = body(run);
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = work => {}
            }
        });
        *active = Some(ActiveRun { cancel, handle });

        debug!(run, "{} started", self.kind);
        replaced
    }

    pub(crate) async fn stop(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        // Invalidate events still in flight from the current run
        self.runs.next();
        match active.take() {
            Some(run) => self.finish(run).await,
            None => Ok(()),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        match self.active.try_lock() {
            Ok(active) => active.as_ref().is_some_and(|run| !run.handle.is_finished()),
            // Locked only while starting or stopping
            Err(_) => true,
        }
    }

    async fn finish(&self, run: ActiveRun) -> Result<()> {
        run.cancel.cancel();
        run.handle.await.map_err(|e| {
            warn!(error = %e, "{} task ended abnormally", self.kind);
            Error::from(e)
        })?;
        debug!("{} stopped", self.kind);
        Ok(())
    }
}
