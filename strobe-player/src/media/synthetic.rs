//! Deterministic test-pattern decoder
//!
//! Locations look like
//! `synthetic:av?duration_ms=10000&fps=30&sample_rate=48000&channels=2&width=64&height=36`.
//! The kind is one of `audio`, `video`, `av` or `image` (a single still frame).
//! Audio is a 440 Hz tone in 20 ms chunks; video frames carry a byte pattern
//! derived from the frame index, so tests can tell frames apart.

use std::f32::consts::TAU;
use std::time::Duration;
use strobe_common::time::duration_to_micros;
use strobe_common::{AudioFormat, HardwareAcceleration, VideoFormat};
use tracing::debug;

use crate::error::{Error, Result};
use crate::media::decoder::{Decoder, DecoderFactory, Probe};
use crate::media::frame::{AudioFrame, Frame, VideoFrame};
use crate::playback::pool::PoolItem;

pub const SCHEME: &str = "synthetic:";

const AUDIO_CHUNK: Duration = Duration::from_millis(20);
const TONE_HZ: f32 = 440.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Audio,
    Video,
    AudioVideo,
    Image,
}

/// Parsed synthetic location
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSource {
    kind: StreamKind,
    pub duration: Duration,
    pub fps: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub width: u32,
    pub height: u32,
    /// Keyframe spacing in frames
    pub keyframe_interval: u64,
}

impl SyntheticSource {
    pub fn parse(location: &str) -> Result<Self> {
        let rest = location
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::Unsupported(format!("not a synthetic location: {}", location)))?;
        let (kind, query) = rest.split_once('?').unwrap_or((rest, ""));

        let kind = match kind {
            "audio" => StreamKind::Audio,
            "video" => StreamKind::Video,
            "av" => StreamKind::AudioVideo,
            "image" => StreamKind::Image,
            other => return Err(Error::Unsupported(format!("unknown synthetic stream kind: {}", other))),
        };

        let mut source = SyntheticSource {
            kind,
            duration: Duration::from_secs(10),
            fps: 30.0,
            sample_rate: 48_000,
            channels: 2,
            width: 64,
            height: 36,
            keyframe_interval: 1,
        };

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::InvalidInput(format!("malformed parameter: {}", pair)))?;
            let invalid = || Error::InvalidInput(format!("invalid value for {}: {}", key, value));
            match key {
                "duration_ms" => source.duration = Duration::from_millis(value.parse().map_err(|_| invalid())?),
                "fps" => source.fps = value.parse().map_err(|_| invalid())?,
                "sample_rate" => source.sample_rate = value.parse().map_err(|_| invalid())?,
                "channels" => source.channels = value.parse().map_err(|_| invalid())?,
                "width" => source.width = value.parse().map_err(|_| invalid())?,
                "height" => source.height = value.parse().map_err(|_| invalid())?,
                "keyframe_interval" => source.keyframe_interval = value.parse().map_err(|_| invalid())?,
                _ => return Err(Error::InvalidInput(format!("unknown parameter: {}", key))),
            }
        }

        if source.kind == StreamKind::Image {
            source.fps = 0.0;
            source.duration = Duration::ZERO;
        }
        if source.keyframe_interval == 0 || source.sample_rate == 0 || source.channels == 0 {
            return Err(Error::InvalidInput(format!("invalid synthetic location: {}", location)));
        }
        if source.width == 0 || source.height == 0 || source.fps < 0.0 || !source.fps.is_finite() {
            return Err(Error::InvalidInput(format!("invalid synthetic location: {}", location)));
        }

        Ok(source)
    }

    pub fn audio_format(&self) -> Option<AudioFormat> {
        matches!(self.kind, StreamKind::Audio | StreamKind::AudioVideo).then_some(AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    pub fn video_format(&self) -> Option<VideoFormat> {
        matches!(self.kind, StreamKind::Video | StreamKind::AudioVideo | StreamKind::Image).then_some(
            VideoFormat {
                width: self.width,
                height: self.height,
                frame_rate: self.fps,
                buffer_capacity: self.width as usize * self.height as usize * 4,
            },
        )
    }

    /// Timestamp of frame `index`
    fn frame_timestamp(&self, index: u64) -> Duration {
        if self.fps <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_micros((index as f64 * 1_000_000.0 / self.fps).round() as u64)
    }

    fn frame_count(&self) -> u64 {
        if self.fps <= 0.0 {
            return 1;
        }
        (self.duration.as_secs_f64() * self.fps).ceil() as u64
    }

    fn frame_index_at(&self, timestamp: Duration) -> u64 {
        if self.fps <= 0.0 {
            return 0;
        }
        // Small epsilon so exact frame boundaries do not round down
        (duration_to_micros(timestamp) as f64 * self.fps / 1_000_000.0 + 1e-6).floor() as u64
    }
}

/// Factory for `synthetic:` locations
#[derive(Debug, Default, Clone)]
pub struct SyntheticDecoderFactory;

impl DecoderFactory for SyntheticDecoderFactory {
    fn probe(&self, location: &str, find_audio: bool, find_video: bool) -> Result<Probe> {
        let source = SyntheticSource::parse(location)?;
        Ok(Probe {
            duration_micros: duration_to_micros(source.duration) as i64,
            audio: source.audio_format().filter(|_| find_audio),
            video: source.video_format().filter(|_| find_video),
        })
    }

    fn create_audio_decoder(&self, location: &str, _format: &AudioFormat) -> Result<Box<dyn Decoder>> {
        let source = SyntheticSource::parse(location)?;
        if source.audio_format().is_none() {
            return Err(Error::Unsupported(format!("no audio stream in {}", location)));
        }
        Ok(Box::new(SyntheticAudioDecoder { source, position: Duration::ZERO }))
    }

    fn create_video_decoder(
        &self,
        location: &str,
        _format: &VideoFormat,
        hardware_acceleration: &[HardwareAcceleration],
    ) -> Result<Box<dyn Decoder>> {
        let source = SyntheticSource::parse(location)?;
        if source.video_format().is_none() {
            return Err(Error::Unsupported(format!("no video stream in {}", location)));
        }
        if !hardware_acceleration.is_empty() {
            debug!(?hardware_acceleration, "Synthetic video decodes in software only");
        }
        Ok(Box::new(SyntheticVideoDecoder { source, next_index: 0 }))
    }
}

struct SyntheticAudioDecoder {
    source: SyntheticSource,
    position: Duration,
}

impl Decoder for SyntheticAudioDecoder {
    fn decode_audio(&mut self) -> Result<Frame> {
        if self.position >= self.source.duration {
            return Ok(Frame::EndOfStream);
        }
        let chunk = AUDIO_CHUNK.min(self.source.duration - self.position);
        let samples = (chunk.as_secs_f64() * self.source.sample_rate as f64).round() as usize;
        let channels = self.source.channels as usize;
        let start = (self.position.as_secs_f64() * self.source.sample_rate as f64).round() as usize;

        let mut bytes = Vec::with_capacity(samples * channels * 4);
        for n in 0..samples {
            let phase = (start + n) as f32 * TONE_HZ / self.source.sample_rate as f32;
            let value = (phase * TAU).sin() * 0.25;
            for _ in 0..channels {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }

        let frame = AudioFrame { timestamp: self.position, bytes };
        self.position += chunk;
        Ok(Frame::Audio(frame))
    }

    fn seek_to(&mut self, timestamp: Duration, _keyframes_only: bool) -> Result<Duration> {
        let target = timestamp.min(self.source.duration);
        let chunk_micros = AUDIO_CHUNK.as_micros() as u64;
        let aligned = duration_to_micros(target) / chunk_micros * chunk_micros;
        self.position = Duration::from_micros(aligned);
        Ok(self.position)
    }

    fn reset(&mut self) -> Result<()> {
        self.position = Duration::ZERO;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct SyntheticVideoDecoder {
    source: SyntheticSource,
    next_index: u64,
}

impl Decoder for SyntheticVideoDecoder {
    fn decode_video(&mut self, mut target: PoolItem) -> Result<Frame> {
        if self.next_index >= self.source.frame_count() {
            return Ok(Frame::EndOfStream);
        }
        let index = self.next_index;
        let wanted = self.source.width as usize * self.source.height as usize * 4;
        let slot = target.as_mut_slice();
        if slot.len() < wanted {
            return Err(Error::Decode(format!(
                "pool slot of {} bytes cannot hold a {} byte frame",
                slot.len(),
                wanted
            )));
        }
        for (offset, byte) in slot[..wanted].iter_mut().enumerate() {
            *byte = (index as usize).wrapping_add(offset) as u8;
        }

        self.next_index += 1;
        Ok(Frame::Video(VideoFrame {
            timestamp: self.source.frame_timestamp(index),
            data: target,
            size: wanted,
            width: self.source.width,
            height: self.source.height,
        }))
    }

    fn seek_to(&mut self, timestamp: Duration, keyframes_only: bool) -> Result<Duration> {
        let last = self.source.frame_count().saturating_sub(1);
        let mut index = self.source.frame_index_at(timestamp).min(last);
        if keyframes_only {
            index -= index % self.source.keyframe_interval;
        }
        self.next_index = index;
        Ok(self.source.frame_timestamp(index))
    }

    fn reset(&mut self) -> Result<()> {
        self.next_index = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
