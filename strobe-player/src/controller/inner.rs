//! Controller internals shared by the public handle and the loop-event pump
//!
//! `session` doubles as the command lock: every command, and every completion
//! reported by a loop, runs while holding it. Handlers therefore never race
//! each other and can touch the pipeline without further locking.

use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use strobe_common::{Media, PlayerSettings};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::controller::events::PlayerEvent;
use crate::controller::state::{InternalPlayerState, PlayerState, ReadyStatus};
use crate::controller::ControllerConfig;
use crate::error::{first_failure, Result};
use crate::media::decoder::DecoderFactory;
use crate::media::output::SamplerFactory;
use crate::playback::{
    BufferLoop, LoopEvent, LoopEventReceiver, LoopEventSender, LoopKind, Pipeline, PlaybackLoop, RendererSlot,
    RunTracker,
};

/// Event bus capacity; slow subscribers lag rather than block the player
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Resources of the currently loaded media
pub(crate) struct Session {
    pub(crate) pipeline: Arc<Pipeline>,
    pub(crate) buffer_loop: BufferLoop,
    pub(crate) playback_loop: PlaybackLoop,
}

impl Session {
    /// Stop both loops and close the pipeline, attempting every step
    pub(crate) async fn teardown(&self) -> Result<()> {
        let playback = self.playback_loop.stop().await;
        let buffer = self.buffer_loop.stop().await;
        let pipeline = self.pipeline.close().await;
        first_failure(
            "session teardown",
            vec![("playback loop", playback), ("buffer loop", buffer), ("pipeline", pipeline)],
        )
    }
}

pub(crate) struct Inner {
    pub(crate) config: ControllerConfig,
    pub(crate) decoders: Arc<dyn DecoderFactory>,
    pub(crate) samplers: Arc<dyn SamplerFactory>,

    /// Command lock and the session it guards
    pub(crate) session: Mutex<Option<Session>>,

    pub(crate) internal_state: watch::Sender<InternalPlayerState>,
    pub(crate) state: watch::Sender<PlayerState>,
    pub(crate) buffer_timestamp: watch::Sender<Duration>,
    pub(crate) playback_timestamp: watch::Sender<Duration>,
    pub(crate) settings: watch::Sender<PlayerSettings>,
    pub(crate) events: broadcast::Sender<PlayerEvent>,

    pub(crate) renderer: RendererSlot,
    pub(crate) loop_events: LoopEventSender,
    pub(crate) buffer_runs: RunTracker,
    pub(crate) playback_runs: RunTracker,

    /// Orders loop timestamp publication against handler resets
    timestamp_gate: parking_lot::Mutex<()>,
}

impl Inner {
    pub(crate) fn new(
        config: ControllerConfig,
        decoders: Arc<dyn DecoderFactory>,
        samplers: Arc<dyn SamplerFactory>,
        loop_events: LoopEventSender,
    ) -> Self {
        let (internal_state, _) = watch::channel(InternalPlayerState::Empty);
        let (state, _) = watch::channel(PlayerState::Empty);
        let (buffer_timestamp, _) = watch::channel(Duration::ZERO);
        let (playback_timestamp, _) = watch::channel(Duration::ZERO);
        let (settings, _) = watch::channel(config.initial_settings);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config,
            decoders,
            samplers,
            session: Mutex::new(None),
            internal_state,
            state,
            buffer_timestamp,
            playback_timestamp,
            settings,
            events,
            renderer: RendererSlot::default(),
            loop_events,
            buffer_runs: RunTracker::default(),
            playback_runs: RunTracker::default(),
            timestamp_gate: parking_lot::Mutex::new(()),
        }
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn set_state(&self, next: InternalPlayerState) {
        let projected = next.project();
        self.internal_state.send_replace(next);

        if let Some(current) = projected {
            let previous = self.state.send_replace(current.clone());
            if previous != current {
                info!(%previous, %current, "Player state changed");
                self.emit(PlayerEvent::StateChanged {
                    previous,
                    current,
                    at: Utc::now(),
                });
            }
        }
    }

    /// Media and status when settled in a Ready state
    pub(crate) fn ready_status(&self) -> Option<(Media, ReadyStatus)> {
        self.internal_state
            .borrow()
            .ready_status()
            .map(|(media, status)| (media.clone(), status))
    }

    /// Set both timestamps, overriding anything the loops reported
    pub(crate) fn reset_timestamps(&self, position: Duration) {
        let _gate = self.timestamp_gate.lock();
        self.buffer_timestamp.send_replace(position);
        self.playback_timestamp.send_replace(position);
    }

    /// Run a Ready-to-Ready handler body.
    ///
    /// Publishes `Transition(destination)`, runs `body`, then settles in
    /// `destination`. On failure the state reverts to `from` and the error is
    /// returned unchanged.
    pub(crate) async fn with_transition<T>(
        &self,
        media: &Media,
        from: ReadyStatus,
        destination: ReadyStatus,
        body: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.set_state(InternalPlayerState::transition(media.clone(), destination));
        match body.await {
            Ok(value) => {
                self.set_state(InternalPlayerState::settled(media.clone(), destination));
                Ok(value)
            }
            Err(e) => {
                warn!(%from, %destination, error = %e, "Transition failed, reverting");
                self.set_state(InternalPlayerState::settled(media.clone(), from));
                Err(e)
            }
        }
    }

    fn publish_timestamp(&self, origin: LoopKind, run: u64, timestamp: Duration) {
        let (runs, target) = match origin {
            LoopKind::Buffer => (&self.buffer_runs, &self.buffer_timestamp),
            LoopKind::Playback => (&self.playback_runs, &self.playback_timestamp),
        };

        let _gate = self.timestamp_gate.lock();
        if !runs.is_current(run) {
            return;
        }
        // Buffer progress shows while loaded and not stopped; playback only while playing
        let allowed = match (origin, self.ready_status()) {
            (LoopKind::Buffer, Some((_, ReadyStatus::Playing | ReadyStatus::Paused))) => true,
            (LoopKind::Playback, Some((_, ReadyStatus::Playing))) => true,
            _ => false,
        };
        if allowed {
            target.send_replace(timestamp);
        }
    }

    async fn on_loop_event(&self, event: LoopEvent) {
        let origin = event.origin();
        let run = event.run();
        let runs = match origin {
            LoopKind::Buffer => &self.buffer_runs,
            LoopKind::Playback => &self.playback_runs,
        };

        match event {
            LoopEvent::BufferTimestamp { timestamp, .. } | LoopEvent::PlaybackTimestamp { timestamp, .. } => {
                self.publish_timestamp(origin, run, timestamp);
            }
            LoopEvent::Waiting { .. } => {
                if runs.is_current(run) {
                    self.emit(PlayerEvent::BufferWaiting);
                }
            }
            LoopEvent::BufferComplete { .. } => {
                if runs.is_current(run) {
                    debug!(run, "All streams buffered");
                    self.emit(PlayerEvent::BufferComplete);
                }
            }
            LoopEvent::PlaybackComplete { .. } => self.on_playback_complete(run).await,
            LoopEvent::Failed { error, .. } => {
                if runs.is_current(run) {
                    self.emit(PlayerEvent::Error(Arc::new(error)));
                } else {
                    debug!(run, error = %error, "Ignoring failure from a finished {}", origin);
                }
            }
        }
    }

    /// `Playing -> Completed` once every stream has been presented
    async fn on_playback_complete(&self, run: u64) {
        let session = self.session.lock().await;
        if !self.playback_runs.is_current(run) {
            return;
        }
        let (Some(session), Some((media, ReadyStatus::Playing))) = (session.as_ref(), self.ready_status()) else {
            return;
        };

        let result = self
            .with_transition(&media, ReadyStatus::Playing, ReadyStatus::Completed, async {
                session.playback_loop.stop().await?;
                if let Some(audio) = session.pipeline.audio() {
                    audio.sampler.stop().await?;
                }
                Ok::<_, crate::error::Error>(())
            })
            .await;

        if let Err(e) = result {
            self.emit(PlayerEvent::Error(Arc::new(e)));
        }
    }
}

/// Forward loop events to the controller until it goes away
pub(crate) async fn run_event_pump(inner: Weak<Inner>, mut events: LoopEventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.on_loop_event(event).await;
    }
    debug!("Loop event pump exited");
}
