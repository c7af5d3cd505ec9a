//! Command handlers
//!
//! Each handler runs with the command lock held and receives the session slot
//! it guards. A command issued from a state that does not accept it is
//! ignored: the handler logs and returns `Ok(())`.

use std::sync::Arc;
use std::time::Duration;
use strobe_common::time::{duration_from_micros, format_timestamp};
use strobe_common::Media;
use tracing::{debug, info, warn};

use crate::controller::command::PrepareRequest;
use crate::controller::inner::{Inner, Session};
use crate::controller::state::{InternalPlayerState, ReadyStatus};
use crate::error::{Error, Result};
use crate::playback::{BufferLoop, BuildOptions, Pipeline, PlaybackLoop};

fn ignored(command: &str, status: Option<ReadyStatus>) -> Result<()> {
    debug!(command, ?status, "Command not accepted in the current state, ignoring");
    Ok(())
}

/// Session that must exist in every Ready state
fn loaded(session: &Option<Session>) -> Result<&Session> {
    session
        .as_ref()
        .ok_or_else(|| Error::InvalidState("ready without a loaded pipeline".to_string()))
}

impl Inner {
    pub(crate) async fn handle_prepare(&self, session: &mut Option<Session>, request: PrepareRequest) -> Result<()> {
        match &*self.internal_state.borrow() {
            InternalPlayerState::Empty | InternalPlayerState::Error { .. } => {}
            other => {
                debug!(state = ?other.project(), "Prepare ignored while media is loaded");
                return Ok(());
            }
        }
        if request.audio_buffer_size == 0 && request.video_buffer_size == 0 {
            return Err(Error::InvalidInput("at least one buffer size must be positive".to_string()));
        }

        self.set_state(InternalPlayerState::Preparing);
        info!(location = %request.location, "Preparing media");

        let media = self.probe(&request).await?;
        let options = BuildOptions {
            audio_buffer_size: request.audio_buffer_size,
            video_buffer_size: request.video_buffer_size,
            hardware_acceleration: request.hardware_acceleration,
        };
        let pipeline = Pipeline::build(media.clone(), Arc::clone(&self.decoders), Arc::clone(&self.samplers), &options)
            .await?;

        if let Err(e) = self.preview(&pipeline).await {
            if let Err(close_err) = pipeline.close().await {
                warn!(error = %close_err, preview_error = %e, "Failed to close pipeline after preview failure");
            }
            return Err(e);
        }

        let pipeline = Arc::new(pipeline);
        let buffer_loop = BufferLoop::new(Arc::clone(&pipeline), self.loop_events.clone(), self.buffer_runs.clone());
        let playback_loop = PlaybackLoop::new(
            Arc::clone(&pipeline),
            self.loop_events.clone(),
            self.playback_runs.clone(),
            self.settings.subscribe(),
            Arc::clone(&self.renderer),
            self.config.sync_threshold,
        );
        *session = Some(Session {
            pipeline,
            buffer_loop,
            playback_loop,
        });

        self.reset_timestamps(Duration::ZERO);
        self.set_state(InternalPlayerState::settled(media, ReadyStatus::Stopped));
        Ok(())
    }

    async fn probe(&self, request: &PrepareRequest) -> Result<Media> {
        let decoders = Arc::clone(&self.decoders);
        let location = request.location.clone();
        let find_audio = request.audio_buffer_size > 0;
        let find_video = request.video_buffer_size > 0;
        let probe = tokio::task::spawn_blocking(move || decoders.probe(&location, find_audio, find_video)).await??;

        let duration = duration_from_micros(probe.duration_micros)
            .ok_or_else(|| Error::Unsupported("Media does not support playback".to_string()))?;
        let media = Media::from_streams(request.location.as_str(), duration, probe.audio, probe.video)
            .ok_or_else(|| Error::Unsupported(format!("no audio or video stream in {}", request.location)))?;

        debug!(
            location = %request.location,
            duration = %format_timestamp(duration),
            audio = media.audio_format().is_some(),
            video = media.video_format().is_some(),
            "Probed media"
        );
        Ok(media)
    }

    /// Push current settings to the sampler and show the first picture
    async fn preview(&self, pipeline: &Pipeline) -> Result<()> {
        if let Some(audio) = pipeline.audio() {
            let settings = *self.settings.borrow();
            audio.sampler.apply_settings(settings).await?;
        }
        if let Some(video) = pipeline.video() {
            let renderer = self.renderer.read().clone();
            video
                .present_next_frame(renderer.as_deref(), None, self.config.sync_threshold)
                .await?;
            if pipeline.media().is_continuous() {
                video.flush_and_reset().await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn handle_play(&self, session: &Option<Session>) -> Result<()> {
        let Some((media, ReadyStatus::Stopped)) = self.ready_status() else {
            return ignored("play", self.ready_status().map(|(_, status)| status));
        };
        if !media.is_continuous() {
            return ignored("play", Some(ReadyStatus::Stopped));
        }
        let session = loaded(session)?;

        self.with_transition(&media, ReadyStatus::Stopped, ReadyStatus::Playing, async {
            if let Some(audio) = session.pipeline.audio() {
                audio.sampler.start().await?;
            }
            session.playback_loop.start().await?;
            session.buffer_loop.start().await
        })
        .await
    }

    pub(crate) async fn handle_pause(&self, session: &Option<Session>) -> Result<()> {
        let Some((media, ReadyStatus::Playing)) = self.ready_status() else {
            return ignored("pause", self.ready_status().map(|(_, status)| status));
        };
        if !media.is_continuous() {
            return ignored("pause", Some(ReadyStatus::Playing));
        }
        let session = loaded(session)?;

        self.with_transition(&media, ReadyStatus::Playing, ReadyStatus::Paused, async {
            session.playback_loop.stop().await?;
            if let Some(audio) = session.pipeline.audio() {
                audio.sampler.stop().await?;
            }
            Ok::<_, Error>(())
        })
        .await
    }

    pub(crate) async fn handle_resume(&self, session: &Option<Session>) -> Result<()> {
        let Some((media, ReadyStatus::Paused)) = self.ready_status() else {
            return ignored("resume", self.ready_status().map(|(_, status)| status));
        };
        if !media.is_continuous() {
            return ignored("resume", Some(ReadyStatus::Paused));
        }
        let session = loaded(session)?;

        self.with_transition(&media, ReadyStatus::Paused, ReadyStatus::Playing, async {
            if let Some(audio) = session.pipeline.audio() {
                audio.sampler.start().await?;
            }
            session.playback_loop.start().await
        })
        .await
    }

    pub(crate) async fn handle_stop(&self, session: &Option<Session>) -> Result<()> {
        let from = match self.ready_status() {
            Some((
                media,
                status @ (ReadyStatus::Playing | ReadyStatus::Paused | ReadyStatus::Completed | ReadyStatus::Seeking),
            )) if media.is_continuous() => (media, status),
            other => return ignored("stop", other.map(|(_, status)| status)),
        };
        let (media, status) = from;
        let session = loaded(session)?;

        self.with_transition(&media, status, ReadyStatus::Stopped, async {
            session.playback_loop.stop().await?;
            session.buffer_loop.stop().await?;

            let pipeline = &session.pipeline;
            let audio = async {
                match pipeline.audio() {
                    Some(audio) => {
                        audio.sampler.stop().await?;
                        audio.flush_and_reset().await
                    }
                    None => Ok(()),
                }
            };
            let video = async {
                match pipeline.video() {
                    Some(video) => {
                        video.flush_and_reset().await?;
                        let renderer = self.renderer.read().clone();
                        video
                            .present_next_frame(renderer.as_deref(), None, self.config.sync_threshold)
                            .await?;
                        video.flush_and_reset().await
                    }
                    None => Ok(()),
                }
            };
            tokio::try_join!(audio, video)?;

            self.reset_timestamps(Duration::ZERO);
            Ok::<_, Error>(())
        })
        .await
    }

    pub(crate) async fn handle_seek(
        &self,
        session: &Option<Session>,
        timestamp: Duration,
        keyframes_only: bool,
    ) -> Result<()> {
        let (media, status) = match self.ready_status() {
            Some((
                media,
                status @ (ReadyStatus::Playing | ReadyStatus::Paused | ReadyStatus::Stopped | ReadyStatus::Completed),
            )) => (media, status),
            other => return ignored("seek", other.map(|(_, status)| status)),
        };
        if !media.is_continuous() {
            return Err(Error::InvalidState("cannot seek media without a timeline".to_string()));
        }
        if timestamp > media.duration() {
            return Err(Error::InvalidInput(format!(
                "seek to {} is beyond the duration {}",
                format_timestamp(timestamp),
                format_timestamp(media.duration())
            )));
        }
        let session = loaded(session)?;

        let after = self
            .with_transition(&media, status, ReadyStatus::Seeking, self.seek_phase(session, timestamp, keyframes_only))
            .await?;

        self.with_transition(&media, ReadyStatus::Seeking, ReadyStatus::Paused, session.buffer_loop.start())
            .await?;

        info!(requested = %format_timestamp(timestamp), landed = %format_timestamp(after), "Seek complete");
        Ok(())
    }

    /// Quiesce, reposition both decoders and present the frame at the new position
    async fn seek_phase(&self, session: &Session, timestamp: Duration, keyframes_only: bool) -> Result<Duration> {
        session.playback_loop.stop().await?;
        session.buffer_loop.stop().await?;

        let pipeline = &session.pipeline;
        if let Some(audio) = pipeline.audio() {
            audio.sampler.stop().await?;
        }

        let audio_seek = async {
            match pipeline.audio() {
                Some(audio) => audio.flush_and_seek(timestamp, keyframes_only).await.map(Some),
                None => Ok(None),
            }
        };
        let video_seek = async {
            match pipeline.video() {
                Some(video) => video.flush_and_seek(timestamp, keyframes_only).await.map(Some),
                None => Ok(None),
            }
        };
        let (audio_landed, video_landed) = tokio::try_join!(audio_seek, video_seek)?;

        let audio_decoded = match pipeline.audio() {
            Some(audio) => audio.prime().await?,
            None => None,
        };
        let video_decoded = match pipeline.video() {
            Some(video) => {
                let renderer = self.renderer.read().clone();
                video
                    .present_next_frame(renderer.as_deref(), audio_decoded, self.config.sync_threshold)
                    .await?
            }
            None => None,
        };

        let after = audio_decoded
            .into_iter()
            .chain(video_decoded)
            .max()
            .or_else(|| audio_landed.into_iter().chain(video_landed).max())
            .unwrap_or(timestamp);

        self.reset_timestamps(after);
        Ok(after)
    }

    pub(crate) async fn handle_release(&self, session: &mut Option<Session>) -> Result<()> {
        let Some((media, status)) = self.ready_status() else {
            return ignored("release", None);
        };
        debug!(%status, location = media.location(), "Releasing media");

        self.set_state(InternalPlayerState::Releasing);
        let result = match session.take() {
            Some(session) => session.teardown().await,
            None => Ok(()),
        };
        self.reset_timestamps(Duration::ZERO);
        self.set_state(InternalPlayerState::Empty);
        result
    }
}
