//! Decode-ahead task
//!
//! Decodes frames into the pipeline's buffers until every stream reaches end
//! of stream. Backpressure comes from the buffers (and the video pool): the
//! task parks in `put` or `acquire` while playback catches up.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::media::frame::Frame;
use crate::playback::pipeline::{AudioPipeline, Pipeline, VideoPipeline};
use crate::playback::sync::MonotonicTimestamp;
use crate::playback::{LoopEvent, LoopEventSender, LoopKind, LoopRunner, RunTracker};

pub struct BufferLoop {
    pipeline: Arc<Pipeline>,
    events: LoopEventSender,
    runner: LoopRunner,
}

impl BufferLoop {
    pub fn new(pipeline: Arc<Pipeline>, events: LoopEventSender, runs: RunTracker) -> Self {
        Self {
            pipeline,
            events,
            runner: LoopRunner::new(LoopKind::Buffer, runs),
        }
    }

    /// Start decoding, replacing any run already in progress
    pub async fn start(&self) -> Result<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let events = self.events.clone();

        self.runner
            .start(move |run| async move {
                let progress = MonotonicTimestamp::default();
                let report = |timestamp: Duration| {
                    if progress.advance(timestamp) {
                        let _ = events.send(LoopEvent::BufferTimestamp { run, timestamp });
                    }
                };

                match fill(&pipeline, &report).await {
                    Ok(()) => {
                        debug!(run, "Buffering complete");
                        let _ = events.send(LoopEvent::BufferTimestamp {
                            run,
                            timestamp: pipeline.media().duration(),
                        });
                        let _ = events.send(LoopEvent::BufferComplete { run });
                    }
                    Err(e) => {
                        error!(run, error = %e, "Buffer loop failed");
                        let _ = events.send(LoopEvent::Failed {
                            origin: LoopKind::Buffer,
                            run,
                            error: e,
                        });
                    }
                }
            })
            .await
    }

    /// Cancel and wait for the task; buffers and decoders are idle afterwards
    pub async fn stop(&self) -> Result<()> {
        self.runner.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }
}

async fn fill(pipeline: &Pipeline, report: &(impl Fn(Duration) + Sync)) -> Result<()> {
    match pipeline {
        Pipeline::Audio { audio, .. } => fill_audio(audio, report).await,
        Pipeline::Video { video, .. } => fill_video(video, report).await,
        Pipeline::AudioVideo { audio, video, .. } => {
            tokio::try_join!(fill_audio(audio, report), fill_video(video, report))?;
            Ok(())
        }
    }
}

async fn fill_audio(audio: &AudioPipeline, report: &(impl Fn(Duration) + Sync)) -> Result<()> {
    loop {
        let frame = audio.decoder.decode_audio().await?;
        if matches!(frame, Frame::Video(_)) {
            return Err(Error::Decode("audio decoder produced a video frame".to_string()));
        }
        // Reported before the put so decode progress never trails presentation
        let timestamp = frame.timestamp();
        if let Some(timestamp) = timestamp {
            report(timestamp);
        }
        audio.buffer.put(frame).await?;
        if timestamp.is_none() {
            return Ok(());
        }
    }
}

async fn fill_video(video: &VideoPipeline, report: &(impl Fn(Duration) + Sync)) -> Result<()> {
    loop {
        let target = video.pool.acquire().await?;
        let frame = video.decoder.decode_video(target).await?;
        if matches!(frame, Frame::Audio(_)) {
            return Err(Error::Decode("video decoder produced an audio frame".to_string()));
        }
        let timestamp = frame.timestamp();
        if let Some(timestamp) = timestamp {
            report(timestamp);
        }
        video.buffer.put(frame).await?;
        if timestamp.is_none() {
            return Ok(());
        }
    }
}
