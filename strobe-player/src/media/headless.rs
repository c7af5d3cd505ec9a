//! Headless outputs
//!
//! `HeadlessSampler` discards audio but paces writes like a device would, so
//! the audio clock advances in real time. `HeadlessRenderer` counts frames.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strobe_common::time::scale_by_speed;
use strobe_common::AudioFormat;

use crate::error::{Error, Result};
use crate::media::frame::{AudioFrame, VideoFrame};
use crate::media::output::{Renderer, Sampler, SamplerFactory};

/// Counters shared between a headless sampler and its owner
#[derive(Debug, Default)]
pub struct SamplerStats {
    pub frames_written: AtomicU64,
    pub bytes_written: AtomicU64,
}

/// Creates real-time paced null samplers
#[derive(Debug, Default, Clone)]
pub struct HeadlessSamplerFactory {
    stats: Arc<SamplerStats>,
}

impl HeadlessSamplerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<SamplerStats> {
        Arc::clone(&self.stats)
    }
}

impl SamplerFactory for HeadlessSamplerFactory {
    fn create(&self, format: &AudioFormat) -> Result<Box<dyn Sampler>> {
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(Error::Sampler(format!("unsupported audio format {:?}", format)));
        }
        Ok(Box::new(HeadlessSampler {
            format: *format,
            speed: 1.0,
            volume: 1.0,
            muted: false,
            running: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct HeadlessSampler {
    format: AudioFormat,
    speed: f32,
    volume: f32,
    muted: bool,
    running: bool,
    stats: Arc<SamplerStats>,
}

impl Sampler for HeadlessSampler {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        if !self.running {
            return Err(Error::Sampler("write to a stopped sampler".to_string()));
        }
        let played = scale_by_speed(self.format.duration_of(frame.size()), self.speed);
        std::thread::sleep(played);

        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_written.fetch_add(frame.size() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volume = volume;
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted = muted;
        Ok(())
    }

    fn set_playback_speed(&mut self, factor: f32) -> Result<()> {
        self.speed = factor;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.running = false;
        tracing::trace!(volume = self.volume, muted = self.muted, "Headless sampler closed");
        Ok(())
    }
}

/// Renderer that records what it was asked to draw
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frames: AtomicU64,
    last_timestamp: Mutex<Option<Duration>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn last_timestamp(&self) -> Option<Duration> {
        *self.last_timestamp.lock()
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&self, frame: &VideoFrame) -> Result<()> {
        if frame.pixels().is_empty() {
            return Err(Error::Render("empty frame".to_string()));
        }
        self.frames.fetch_add(1, Ordering::Relaxed);
        *self.last_timestamp.lock() = Some(frame.timestamp);
        Ok(())
    }
}
