//! Player state machine and its public handle
//!
//! [`PlayerController`] serializes every command through one lock, owns the
//! pipeline and both loops for the loaded media, and publishes state,
//! timestamps, settings and events to any number of observers.

pub mod command;
pub mod events;
mod handlers;
mod inner;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strobe_common::config::PlayerConfig;
use strobe_common::PlayerSettings;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::media::decoder::DecoderFactory;
use crate::media::output::{Renderer, SamplerFactory};
use crate::playback::{BufferLevels, PlaybackStatsSnapshot};

pub use command::{Command, PrepareRequest};
pub use events::PlayerEvent;
pub use state::{InternalPlayerState, PlayerState, ReadyPhase, ReadyStatus};

use self::inner::{run_event_pump, Inner};

/// Fixed controller parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    /// Tolerance between video and audio clocks before frames are dropped or delayed
    pub sync_threshold: Duration,
    /// Settings applied on creation and by `reset_settings`
    pub initial_settings: PlayerSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sync_threshold: Duration::from_millis(20),
            initial_settings: PlayerSettings::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_player_config(config: &PlayerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sync_threshold: config.sync_threshold(),
            initial_settings: config.initial_settings(),
        })
    }
}

pub struct PlayerController {
    inner: Arc<Inner>,
    pump: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PlayerController {
    /// Create a controller in the `Empty` state
    ///
    /// Must be called within a tokio runtime; the loop-event pump is spawned here.
    pub fn new(
        config: ControllerConfig,
        decoders: Arc<dyn DecoderFactory>,
        samplers: Arc<dyn SamplerFactory>,
    ) -> Self {
        let (loop_events, loop_event_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner::new(config, decoders, samplers, loop_events));
        let pump = tokio::spawn(run_event_pump(Arc::downgrade(&inner), loop_event_rx));

        Self {
            inner,
            pump: parking_lot::Mutex::new(Some(pump)),
            closed: AtomicBool::new(false),
        }
    }

    /// Run one command to completion
    ///
    /// Commands queue behind whichever command is in flight. A failure is
    /// returned as [`Error::CommandFailed`]; a failed `Prepare` also moves the
    /// player to `Error`, any other failure is also published as
    /// [`PlayerEvent::Error`].
    pub async fn execute(&self, command: Command) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::InvalidState("controller is closed".to_string()));
        }

        let name = command.name();
        let mut session = self.inner.session.lock().await;
        debug!(%command, "Executing command");

        let is_prepare = matches!(command, Command::Prepare(_));
        let result = match command {
            Command::Prepare(request) => self.inner.handle_prepare(&mut session, request).await,
            Command::Play => self.inner.handle_play(&session).await,
            Command::Pause => self.inner.handle_pause(&session).await,
            Command::Resume => self.inner.handle_resume(&session).await,
            Command::Stop => self.inner.handle_stop(&session).await,
            Command::SeekTo {
                timestamp,
                keyframes_only,
            } => self.inner.handle_seek(&session, timestamp, keyframes_only).await,
            Command::Release => self.inner.handle_release(&mut session).await,
        };

        result.map_err(|e| {
            let cause = Arc::new(e);
            warn!(command = name, error = %cause, "Command failed");
            if is_prepare {
                self.inner.set_state(InternalPlayerState::Error {
                    cause: Arc::clone(&cause),
                });
            } else {
                self.inner.emit(PlayerEvent::Error(Arc::clone(&cause)));
            }
            Error::CommandFailed {
                command: name,
                source: cause,
            }
        })
    }

    pub async fn prepare(&self, request: PrepareRequest) -> Result<()> {
        self.execute(Command::Prepare(request)).await
    }

    pub async fn play(&self) -> Result<()> {
        self.execute(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.execute(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.execute(Command::Resume).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.execute(Command::Stop).await
    }

    /// Seek to the nearest keyframe at or before `timestamp`
    pub async fn seek_to(&self, timestamp: Duration) -> Result<()> {
        self.seek_to_with(timestamp, true).await
    }

    pub async fn seek_to_with(&self, timestamp: Duration, keyframes_only: bool) -> Result<()> {
        self.execute(Command::SeekTo {
            timestamp,
            keyframes_only,
        })
        .await
    }

    pub async fn release(&self) -> Result<()> {
        self.execute(Command::Release).await
    }

    /// Validate and apply new settings
    ///
    /// Out-of-range values are rejected, never clamped. Accepted settings go to
    /// the sampler of the loaded media and take effect for the next frame.
    pub async fn change_settings(&self, settings: PlayerSettings) -> Result<()> {
        settings
            .validate()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        let session = self.inner.session.lock().await;
        if let Some(audio) = session.as_ref().and_then(|s| s.pipeline.audio()) {
            audio.sampler.apply_settings(settings).await?;
        }
        self.inner.settings.send_replace(settings);
        info!(
            volume = settings.volume,
            muted = settings.is_muted,
            speed = settings.playback_speed_factor,
            "Settings changed"
        );
        Ok(())
    }

    pub async fn reset_settings(&self) -> Result<()> {
        self.change_settings(self.inner.config.initial_settings).await
    }

    /// Bind the video surface; takes effect for the next rendered frame
    pub async fn attach_renderer(&self, renderer: Arc<dyn Renderer>) {
        let _session = self.inner.session.lock().await;
        *self.inner.renderer.write() = Some(renderer);
    }

    pub async fn detach_renderer(&self) {
        let _session = self.inner.session.lock().await;
        *self.inner.renderer.write() = None;
    }

    pub fn state(&self) -> PlayerState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlayerState> {
        self.inner.state.subscribe()
    }

    pub fn state_stream(&self) -> WatchStream<PlayerState> {
        WatchStream::new(self.subscribe_state())
    }

    /// Newest decoded position
    pub fn buffer_timestamp(&self) -> Duration {
        *self.inner.buffer_timestamp.borrow()
    }

    pub fn subscribe_buffer_timestamp(&self) -> watch::Receiver<Duration> {
        self.inner.buffer_timestamp.subscribe()
    }

    /// Newest presented position
    pub fn playback_timestamp(&self) -> Duration {
        *self.inner.playback_timestamp.borrow()
    }

    pub fn subscribe_playback_timestamp(&self) -> watch::Receiver<Duration> {
        self.inner.playback_timestamp.subscribe()
    }

    pub fn settings(&self) -> PlayerSettings {
        *self.inner.settings.borrow()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<PlayerSettings> {
        self.inner.settings.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.events.subscribe()
    }

    /// Events as a stream; a lagging consumer sees `Err(Lagged)` items
    pub fn event_stream(&self) -> BroadcastStream<PlayerEvent> {
        BroadcastStream::new(self.subscribe_events())
    }

    /// Presentation counters of the loaded media
    pub async fn playback_stats(&self) -> Option<PlaybackStatsSnapshot> {
        let session = self.inner.session.lock().await;
        session.as_ref().map(|s| s.playback_loop.stats())
    }

    /// Queue depths of the loaded media
    pub async fn buffer_levels(&self) -> Option<BufferLevels> {
        let session = self.inner.session.lock().await;
        session.as_ref().map(|s| s.pipeline.levels())
    }

    /// Release any loaded media and stop the event pump
    ///
    /// Later commands fail with `InvalidState`.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = {
            let mut session = self.inner.session.lock().await;
            let result = match session.take() {
                Some(session) => session.teardown().await,
                None => Ok(()),
            };
            if !matches!(*self.inner.internal_state.borrow(), InternalPlayerState::Empty) {
                self.inner.set_state(InternalPlayerState::Empty);
            }
            result
        };

        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        info!("Player controller closed");
        result
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}
