//! Output collaborator contracts

use std::time::Duration;
use strobe_common::AudioFormat;

use crate::error::Result;
use crate::media::frame::{AudioFrame, VideoFrame};
use crate::media::handle::NativeHandle;

/// Audio output device
///
/// `write` performs its own real-time pacing: it blocks until the device can
/// accept the chunk.
pub trait Sampler: Send {
    /// Delay between a write and the samples being heard
    fn latency(&self) -> Duration {
        Duration::ZERO
    }

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Discard queued samples
    fn flush(&mut self) -> Result<()>;

    /// Block until queued samples have played
    fn drain(&mut self) -> Result<()>;

    fn write(&mut self, frame: &AudioFrame) -> Result<()>;

    fn set_volume(&mut self, volume: f32) -> Result<()>;

    fn set_muted(&mut self, muted: bool) -> Result<()>;

    fn set_playback_speed(&mut self, factor: f32) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Opens an output device for an audio format
pub trait SamplerFactory: Send + Sync {
    fn create(&self, format: &AudioFormat) -> Result<Box<dyn Sampler>>;
}

/// Video surface
///
/// Shared by the host and the playback task, so it takes `&self`.
pub trait Renderer: Send + Sync {
    fn render(&self, frame: &VideoFrame) -> Result<()>;
}

pub type SamplerHandle = NativeHandle<dyn Sampler>;

impl NativeHandle<dyn Sampler> {
    pub async fn latency(&self) -> Result<Duration> {
        self.call(|sampler| Ok(sampler.latency())).await
    }

    pub async fn start(&self) -> Result<()> {
        self.call(|sampler| sampler.start()).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.call(|sampler| sampler.stop()).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.call(|sampler| sampler.flush()).await
    }

    pub async fn drain(&self) -> Result<()> {
        self.call(|sampler| sampler.drain()).await
    }

    pub async fn write(&self, frame: AudioFrame) -> Result<()> {
        self.call(move |sampler| sampler.write(&frame)).await
    }

    /// Push volume, mute and speed in one blocking call
    pub async fn apply_settings(&self, settings: strobe_common::PlayerSettings) -> Result<()> {
        self.call(move |sampler| {
            sampler.set_volume(settings.volume)?;
            sampler.set_muted(settings.is_muted)?;
            sampler.set_playback_speed(settings.playback_speed_factor)
        })
        .await
    }

    pub async fn close(&self) -> Result<()> {
        self.close_with(|sampler| sampler.close()).await
    }
}
