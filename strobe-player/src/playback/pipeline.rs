//! Pipeline: the resources owned for one loaded media item
//!
//! Construction order per stream is decoder, then pool (video), then buffer,
//! then sampler (audio). A failure at any step closes the steps already built
//! in reverse order before the error is returned, so a caller either gets a
//! complete pipeline or nothing to clean up.
//!
//! `close()` is best-effort: every resource is closed even when an earlier one
//! fails, failures are logged, and the first one is returned.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use strobe_common::{AudioFormat, HardwareAcceleration, Media, VideoFormat};
use tracing::{debug, info, warn};

use crate::error::{first_failure, Error, Result};
use crate::media::decoder::{DecoderFactory, DecoderHandle};
use crate::media::frame::Frame;
use crate::media::output::{Renderer, SamplerFactory, SamplerHandle};
use crate::playback::buffer::Buffer;
use crate::playback::pool::Pool;

/// Inputs for building a pipeline
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub audio_buffer_size: usize,
    pub video_buffer_size: usize,
    pub hardware_acceleration: Vec<HardwareAcceleration>,
}

/// Queue depths at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferLevels {
    pub audio_queued: usize,
    pub video_queued: usize,
    /// Pool slots checked out: queued frames, one being decoded, one on screen
    pub video_slots_outstanding: usize,
}

/// Presentation position of a stream whose end marker has been dequeued
///
/// Outlives playback runs so a run restarted after Pause skips a finished
/// stream. Cleared whenever the stream is flushed.
#[derive(Debug, Default)]
pub struct StreamEnd(Mutex<Option<Duration>>);

impl StreamEnd {
    pub fn mark(&self, position: Duration) {
        *self.0.lock() = Some(position);
    }

    /// Position reached since the end marker, `None` while frames remain
    pub fn get(&self) -> Option<Duration> {
        *self.0.lock()
    }

    pub fn clear(&self) {
        *self.0.lock() = None;
    }
}

/// Audio decoder, its frame buffer and the output device
pub struct AudioPipeline {
    pub format: AudioFormat,
    pub decoder: DecoderHandle,
    pub buffer: Buffer<Frame>,
    pub sampler: SamplerHandle,
    end: StreamEnd,
}

/// Video decoder, its payload pool and its frame buffer
pub struct VideoPipeline {
    pub format: VideoFormat,
    pub decoder: DecoderHandle,
    pub pool: Pool,
    pub buffer: Buffer<Frame>,
    end: StreamEnd,
}

pub enum Pipeline {
    Audio {
        media: Media,
        audio: AudioPipeline,
    },
    Video {
        media: Media,
        video: VideoPipeline,
    },
    AudioVideo {
        media: Media,
        audio: AudioPipeline,
        video: VideoPipeline,
    },
}

impl AudioPipeline {
    pub fn new(format: AudioFormat, decoder: DecoderHandle, buffer: Buffer<Frame>, sampler: SamplerHandle) -> Self {
        Self {
            format,
            decoder,
            buffer,
            sampler,
            end: StreamEnd::default(),
        }
    }

    pub fn end(&self) -> &StreamEnd {
        &self.end
    }

    pub async fn build(
        decoders: Arc<dyn DecoderFactory>,
        samplers: Arc<dyn SamplerFactory>,
        location: &str,
        format: AudioFormat,
        buffer_size: usize,
    ) -> Result<Self> {
        // Step 1: decoder
        let decoder = {
            let location = location.to_string();
            tokio::task::spawn_blocking(move || decoders.create_audio_decoder(&location, &format)).await??
        };
        let decoder = DecoderHandle::new("audio decoder", decoder);

        // Step 2: buffer
        let buffer = match Buffer::new(buffer_size) {
            Ok(buffer) => buffer,
            Err(e) => {
                let _ = first_failure("audio rollback", vec![("audio decoder", decoder.close().await)]);
                return Err(e);
            }
        };

        // Step 3: sampler
        let created = tokio::task::spawn_blocking(move || samplers.create(&format))
            .await
            .map_err(Error::from)
            .and_then(|created| created);
        let sampler = match created {
            Ok(sampler) => SamplerHandle::new("sampler", sampler),
            Err(e) => {
                buffer.close();
                let _ = first_failure("audio rollback", vec![("audio decoder", decoder.close().await)]);
                return Err(e);
            }
        };

        debug!(sample_rate = format.sample_rate, channels = format.channels, buffer_size, "Audio pipeline built");
        Ok(Self::new(format, decoder, buffer, sampler))
    }

    /// Discard queued audio and rewind the decoder to the start
    pub async fn flush_and_reset(&self) -> Result<()> {
        self.sampler.flush().await?;
        self.buffer.clear();
        self.end.clear();
        self.decoder.reset().await
    }

    /// Discard queued audio and reposition the decoder
    pub async fn flush_and_seek(&self, timestamp: Duration, keyframes_only: bool) -> Result<Duration> {
        self.sampler.flush().await?;
        self.buffer.clear();
        self.end.clear();
        self.decoder.seek_to(timestamp, keyframes_only).await
    }

    /// Decode one frame into the buffer, returning its timestamp
    pub async fn prime(&self) -> Result<Option<Duration>> {
        let frame = self.decoder.decode_audio().await?;
        let timestamp = frame.timestamp();
        self.buffer.put(frame).await?;
        Ok(timestamp)
    }

    pub async fn close(&self) -> Result<()> {
        let sampler = self.sampler.close().await;
        self.buffer.close();
        let decoder = self.decoder.close().await;
        first_failure("audio close", vec![("sampler", sampler), ("audio decoder", decoder)])
    }
}

impl VideoPipeline {
    pub fn new(format: VideoFormat, decoder: DecoderHandle, pool: Pool, buffer: Buffer<Frame>) -> Self {
        Self {
            format,
            decoder,
            pool,
            buffer,
            end: StreamEnd::default(),
        }
    }

    pub fn end(&self) -> &StreamEnd {
        &self.end
    }

    pub async fn build(
        decoders: Arc<dyn DecoderFactory>,
        location: &str,
        format: VideoFormat,
        buffer_size: usize,
        hardware_acceleration: Vec<HardwareAcceleration>,
    ) -> Result<Self> {
        // Step 1: decoder
        let decoder = {
            let location = location.to_string();
            tokio::task::spawn_blocking(move || {
                decoders.create_video_decoder(&location, &format, &hardware_acceleration)
            })
            .await??
        };
        let decoder = DecoderHandle::new("video decoder", decoder);

        // Step 2: pool, one slot per buffered frame plus one being decoded and one on screen
        let pool = match Pool::new(buffer_size.saturating_add(2), format.buffer_capacity) {
            Ok(pool) => pool,
            Err(e) => {
                let _ = first_failure("video rollback", vec![("video decoder", decoder.close().await)]);
                return Err(e);
            }
        };

        // Step 3: buffer
        let buffer = match Buffer::new(buffer_size) {
            Ok(buffer) => buffer,
            Err(e) => {
                pool.close();
                let _ = first_failure("video rollback", vec![("video decoder", decoder.close().await)]);
                return Err(e);
            }
        };

        debug!(width = format.width, height = format.height, buffer_size, "Video pipeline built");
        Ok(Self::new(format, decoder, pool, buffer))
    }

    /// Drop queued frames, reclaim every pool slot and rewind the decoder
    pub async fn flush_and_reset(&self) -> Result<()> {
        self.buffer.clear();
        self.pool.reset();
        self.end.clear();
        self.decoder.reset().await
    }

    /// Drop queued frames, reclaim every pool slot and reposition the decoder
    pub async fn flush_and_seek(&self, timestamp: Duration, keyframes_only: bool) -> Result<Duration> {
        self.buffer.clear();
        self.pool.reset();
        self.end.clear();
        self.decoder.seek_to(timestamp, keyframes_only).await
    }

    /// Decode the next presentable frame and render it.
    ///
    /// The frame is not queued; its pool slot is returned once rendered. With
    /// `catch_up_to`, frames more than `tolerance` behind that position are
    /// discarded first. Returns the timestamp of the presented frame, or `None`
    /// when the stream ended.
    pub async fn present_next_frame(
        &self,
        renderer: Option<&dyn Renderer>,
        catch_up_to: Option<Duration>,
        tolerance: Duration,
    ) -> Result<Option<Duration>> {
        loop {
            let item = self.pool.acquire().await?;
            let frame = match self.decoder.decode_video(item).await? {
                Frame::Video(frame) => frame,
                Frame::EndOfStream => return Ok(None),
                Frame::Audio(_) => {
                    return Err(Error::Decode("video decoder produced an audio frame".to_string()))
                }
            };

            if let Some(target) = catch_up_to {
                if frame.timestamp + tolerance < target {
                    continue;
                }
            }

            if let Some(renderer) = renderer {
                renderer.render(&frame)?;
            }
            return Ok(Some(frame.timestamp));
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.buffer.close();
        self.pool.close();
        let decoder = self.decoder.close().await;
        first_failure("video close", vec![("video decoder", decoder)])
    }
}

impl Pipeline {
    /// Build every stream the media carries.
    ///
    /// Audio and video are built concurrently; if one side fails the other
    /// side is closed before the error is returned.
    pub async fn build(
        media: Media,
        decoders: Arc<dyn DecoderFactory>,
        samplers: Arc<dyn SamplerFactory>,
        options: &BuildOptions,
    ) -> Result<Self> {
        let location = media.location().to_string();

        let audio = async {
            match media.audio_format() {
                Some(format) => AudioPipeline::build(
                    Arc::clone(&decoders),
                    Arc::clone(&samplers),
                    &location,
                    *format,
                    options.audio_buffer_size,
                )
                .await
                .map(Some),
                None => Ok(None),
            }
        };
        let video = async {
            match media.video_format() {
                Some(format) => VideoPipeline::build(
                    Arc::clone(&decoders),
                    &location,
                    *format,
                    options.video_buffer_size,
                    options.hardware_acceleration.clone(),
                )
                .await
                .map(Some),
                None => Ok(None),
            }
        };

        let (audio, video) = tokio::join!(audio, video);

        let pipeline = match (audio, video) {
            (Ok(Some(audio)), Ok(Some(video))) => Pipeline::AudioVideo { media, audio, video },
            (Ok(Some(audio)), Ok(None)) => Pipeline::Audio { media, audio },
            (Ok(None), Ok(Some(video))) => Pipeline::Video { media, video },
            (Ok(None), Ok(None)) => {
                return Err(Error::Unsupported(format!("no playable stream in {}", location)))
            }
            (Err(e), Ok(video)) => {
                if let Some(video) = video {
                    let _ = video.close().await;
                }
                return Err(e);
            }
            (Ok(audio), Err(e)) => {
                if let Some(audio) = audio {
                    let _ = audio.close().await;
                }
                return Err(e);
            }
            (Err(audio_err), Err(video_err)) => {
                warn!(error = %video_err, "Video pipeline also failed to build");
                return Err(audio_err);
            }
        };

        info!(location = %location, "Pipeline ready");
        Ok(pipeline)
    }

    pub fn media(&self) -> &Media {
        match self {
            Pipeline::Audio { media, .. } | Pipeline::Video { media, .. } | Pipeline::AudioVideo { media, .. } => {
                media
            }
        }
    }

    pub fn audio(&self) -> Option<&AudioPipeline> {
        match self {
            Pipeline::Audio { audio, .. } | Pipeline::AudioVideo { audio, .. } => Some(audio),
            Pipeline::Video { .. } => None,
        }
    }

    pub fn video(&self) -> Option<&VideoPipeline> {
        match self {
            Pipeline::Video { video, .. } | Pipeline::AudioVideo { video, .. } => Some(video),
            Pipeline::Audio { .. } => None,
        }
    }

    pub fn levels(&self) -> BufferLevels {
        BufferLevels {
            audio_queued: self.audio().map_or(0, |audio| audio.buffer.len()),
            video_queued: self.video().map_or(0, |video| video.buffer.len()),
            video_slots_outstanding: self.video().map_or(0, |video| video.pool.outstanding()),
        }
    }

    /// Close every owned resource; audio and video groups close concurrently
    pub async fn close(&self) -> Result<()> {
        match self {
            Pipeline::Audio { audio, .. } => audio.close().await,
            Pipeline::Video { video, .. } => video.close().await,
            Pipeline::AudioVideo { audio, video, .. } => {
                let (audio, video) = futures::future::join(audio.close(), video.close()).await;
                first_failure("pipeline close", vec![("audio", audio), ("video", video)])
            }
        }
    }
}
