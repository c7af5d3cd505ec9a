//! Clock-paced presentation task
//!
//! Audio frames go to the sampler, which paces itself; each write advances the
//! audio clock. Video frames are synchronized against that clock (see
//! [`sync`](crate::playback::sync)) or, without audio, paced to the wall clock.
//! Until the audio clock is known the first video frame of a run is shown
//! immediately.
//!
//! When every stream has delivered its end-of-stream marker the task reports
//! `PlaybackComplete` and exits. A stream's end is recorded on the pipeline,
//! so a run started after Pause resumes the last picture's hold instead of
//! waiting on a buffer that will never refill.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strobe_common::time::scale_by_speed;
use strobe_common::PlayerSettings;
use tokio::sync::watch;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::media::frame::{Frame, VideoFrame};
use crate::playback::buffer::Buffer;
use crate::playback::pipeline::{AudioPipeline, Pipeline, VideoPipeline};
use crate::playback::sync::{self, AudioClock, MonotonicTimestamp, Pacer, SyncAction};
use crate::playback::{LoopEvent, LoopEventSender, LoopKind, LoopRunner, RendererSlot, RunTracker};

/// Granularity of end-of-media hold progress
const HOLD_STEP: Duration = Duration::from_millis(50);

/// Presentation counters, cumulative over the life of a pipeline
#[derive(Debug, Default)]
pub struct PlaybackStats {
    rendered_frames: AtomicU64,
    dropped_frames: AtomicU64,
    audio_frames: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStatsSnapshot {
    pub rendered_frames: u64,
    pub dropped_frames: u64,
    pub audio_frames: u64,
}

impl PlaybackStats {
    pub fn snapshot(&self) -> PlaybackStatsSnapshot {
        PlaybackStatsSnapshot {
            rendered_frames: self.rendered_frames.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            audio_frames: self.audio_frames.load(Ordering::Relaxed),
        }
    }
}

pub struct PlaybackLoop {
    pipeline: Arc<Pipeline>,
    events: LoopEventSender,
    settings: watch::Receiver<PlayerSettings>,
    renderer: RendererSlot,
    sync_threshold: Duration,
    stats: Arc<PlaybackStats>,
    runner: LoopRunner,
}

impl PlaybackLoop {
    pub fn new(
        pipeline: Arc<Pipeline>,
        events: LoopEventSender,
        runs: RunTracker,
        settings: watch::Receiver<PlayerSettings>,
        renderer: RendererSlot,
        sync_threshold: Duration,
    ) -> Self {
        Self {
            pipeline,
            events,
            settings,
            renderer,
            sync_threshold,
            stats: Arc::new(PlaybackStats::default()),
            runner: LoopRunner::new(LoopKind::Playback, runs),
        }
    }

    pub fn stats(&self) -> PlaybackStatsSnapshot {
        self.stats.snapshot()
    }

    /// Start presenting, replacing any run already in progress
    pub async fn start(&self) -> Result<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let events = self.events.clone();
        let settings = self.settings.clone();
        let renderer = Arc::clone(&self.renderer);
        let stats = Arc::clone(&self.stats);
        let sync_threshold = self.sync_threshold;

        self.runner
            .start(move |run| async move {
                let presenter = Presenter {
                    run,
                    events,
                    settings,
                    renderer,
                    stats,
                    sync_threshold,
                    duration: pipeline.media().duration(),
                    clock: AudioClock::default(),
                    progress: MonotonicTimestamp::default(),
                };

                let result = match pipeline.as_ref() {
                    Pipeline::Audio { audio, .. } => presenter.play_audio(audio).await,
                    Pipeline::Video { video, .. } => presenter.play_video(video, false).await,
                    Pipeline::AudioVideo { audio, video, .. } => {
                        tokio::try_join!(presenter.play_audio(audio), presenter.play_video(video, true)).map(|_| ())
                    }
                };

                match result {
                    Ok(()) => {
                        debug!(run, "Playback reached end of media");
                        let _ = presenter.events.send(LoopEvent::PlaybackComplete { run });
                    }
                    Err(e) => {
                        error!(run, error = %e, "Playback loop failed");
                        let _ = presenter.events.send(LoopEvent::Failed {
                            origin: LoopKind::Playback,
                            run,
                            error: e,
                        });
                    }
                }
            })
            .await
    }

    /// Cancel and wait for the task
    pub async fn stop(&self) -> Result<()> {
        self.runner.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }
}

/// State of one playback run
struct Presenter {
    run: u64,
    events: LoopEventSender,
    settings: watch::Receiver<PlayerSettings>,
    renderer: RendererSlot,
    stats: Arc<PlaybackStats>,
    sync_threshold: Duration,
    duration: Duration,
    clock: AudioClock,
    progress: MonotonicTimestamp,
}

impl Presenter {
    fn speed(&self) -> f32 {
        self.settings.borrow().playback_speed_factor
    }

    fn publish(&self, timestamp: Duration) {
        if self.progress.advance(timestamp) {
            let _ = self.events.send(LoopEvent::PlaybackTimestamp { run: self.run, timestamp });
        }
    }

    async fn next_frame(&self, buffer: &Buffer<Frame>) -> Result<Frame> {
        if let Some(frame) = buffer.try_take()? {
            return Ok(frame);
        }
        let _ = self.events.send(LoopEvent::Waiting { run: self.run });
        buffer.take().await
    }

    async fn play_audio(&self, audio: &AudioPipeline) -> Result<()> {
        if audio.end().get().is_some() {
            // Ended in an earlier run; only the drain may be outstanding
            return audio.sampler.drain().await;
        }
        let latency = audio.sampler.latency().await?;
        let mut last = Duration::ZERO;
        loop {
            match self.next_frame(&audio.buffer).await? {
                Frame::Audio(frame) => {
                    let position = frame.timestamp.saturating_sub(latency);
                    self.clock.set(position);
                    self.publish(position);
                    last = position;
                    audio.sampler.write(frame).await?;
                    self.stats.audio_frames.fetch_add(1, Ordering::Relaxed);
                }
                Frame::EndOfStream => {
                    audio.end().mark(last);
                    audio.sampler.drain().await?;
                    self.clock.clear();
                    return Ok(());
                }
                Frame::Video(_) => return Err(Error::Decode("video frame in audio buffer".to_string())),
            }
        }
    }

    async fn play_video(&self, video: &VideoPipeline, synced: bool) -> Result<()> {
        if let Some(position) = video.end().get() {
            self.hold_last_frame(video, position).await;
            return Ok(());
        }

        let mut pacer = Pacer::default();
        let mut last_shown: Option<Duration> = None;

        loop {
            let frame = match self.next_frame(&video.buffer).await? {
                Frame::Video(frame) => frame,
                Frame::EndOfStream => {
                    let position = last_shown.unwrap_or(self.duration);
                    video.end().mark(position);
                    self.hold_last_frame(video, position).await;
                    return Ok(());
                }
                Frame::Audio(_) => return Err(Error::Decode("audio frame in video buffer".to_string())),
            };

            // The audio clock rules every frame once known; before that the
            // first frame shows at once and later ones follow the wall clock
            let speed = self.speed();
            let audio = if synced { self.clock.get() } else { None };
            let wait = match audio {
                Some(audio) => match sync::decide(frame.timestamp, audio, self.sync_threshold, speed) {
                    SyncAction::Drop => {
                        trace!(frame = ?frame.timestamp, ?audio, "Dropping late video frame");
                        self.stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    SyncAction::Present => None,
                    SyncAction::Delay(delay) => Some(delay),
                },
                None => pacer.delay_for(frame.timestamp, speed),
            };
            if let Some(wait) = wait {
                tokio::time::sleep(wait).await;
            }

            self.render(&frame)?;
            pacer.mark(frame.timestamp);
            last_shown = Some(frame.timestamp);
            self.publish(frame.timestamp);
        }
    }

    /// Keep the last picture up until the media's end, from `position` on
    ///
    /// Progress is recorded step by step so a run cancelled mid-hold resumes
    /// with only the remainder.
    async fn hold_last_frame(&self, video: &VideoPipeline, mut position: Duration) {
        while position < self.duration {
            let step = HOLD_STEP.min(self.duration - position);
            tokio::time::sleep(scale_by_speed(step, self.speed())).await;
            position += step;
            video.end().mark(position);
        }
    }

    fn render(&self, frame: &VideoFrame) -> Result<()> {
        let renderer = self.renderer.read().clone();
        if let Some(renderer) = renderer {
            renderer.render(frame)?;
        }
        self.stats.rendered_frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
