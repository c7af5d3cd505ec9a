//! Collaborator fakes
//!
//! Decoding and audio output delegate to the bundled synthetic decoder and
//! headless sampler; the wrappers add failure injection and record every
//! open, close and settings change in a shared [`Ledger`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strobe_common::{AudioFormat, HardwareAcceleration, PlayerSettings, VideoFormat};
use strobe_player::media::headless::HeadlessSamplerFactory;
use strobe_player::media::synthetic::SyntheticDecoderFactory;
use strobe_player::media::{
    AudioFrame, Decoder, DecoderFactory, Frame, Probe, Renderer, Sampler, SamplerFactory, VideoFrame,
};
use strobe_player::playback::PoolItem;
use strobe_player::{Error, Result};

/// Failures to inject
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Replace the probed duration
    pub probe_duration_micros: Option<i64>,
    pub fail_audio_decoder: bool,
    pub fail_video_decoder: bool,
    pub fail_sampler: bool,
    /// Video decoding fails once this many frames have been produced
    pub video_decode_fails_after: Option<u64>,
    pub fail_decoder_close: bool,
}

/// Open/close accounting shared by every fake
#[derive(Debug, Default)]
pub struct Ledger {
    pub audio_decoders_opened: AtomicUsize,
    pub audio_decoders_closed: AtomicUsize,
    pub video_decoders_opened: AtomicUsize,
    pub video_decoders_closed: AtomicUsize,
    pub samplers_opened: AtomicUsize,
    pub samplers_closed: AtomicUsize,
    pub samplers_started: AtomicUsize,
    pub audio_frames_written: AtomicUsize,
    settings: Mutex<Vec<PlayerSettings>>,
}

impl Ledger {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Resources opened but not yet closed
    pub fn open_handles(&self) -> usize {
        let opened = Self::count(&self.audio_decoders_opened)
            + Self::count(&self.video_decoders_opened)
            + Self::count(&self.samplers_opened);
        let closed = Self::count(&self.audio_decoders_closed)
            + Self::count(&self.video_decoders_closed)
            + Self::count(&self.samplers_closed);
        opened - closed
    }

    pub fn last_sampler_settings(&self) -> Option<PlayerSettings> {
        self.settings.lock().unwrap().last().copied()
    }
}

pub struct TestDecoderFactory {
    inner: SyntheticDecoderFactory,
    ledger: Arc<Ledger>,
    faults: Arc<Faults>,
}

impl TestDecoderFactory {
    pub fn new(ledger: Arc<Ledger>, faults: Arc<Faults>) -> Self {
        Self {
            inner: SyntheticDecoderFactory,
            ledger,
            faults,
        }
    }
}

impl DecoderFactory for TestDecoderFactory {
    fn probe(&self, location: &str, find_audio: bool, find_video: bool) -> Result<Probe> {
        let mut probe = self.inner.probe(location, find_audio, find_video)?;
        if let Some(duration) = self.faults.probe_duration_micros {
            probe.duration_micros = duration;
        }
        Ok(probe)
    }

    fn create_audio_decoder(&self, location: &str, format: &AudioFormat) -> Result<Box<dyn Decoder>> {
        if self.faults.fail_audio_decoder {
            return Err(Error::Decode("injected audio decoder failure".to_string()));
        }
        let inner = self.inner.create_audio_decoder(location, format)?;
        self.ledger.audio_decoders_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingDecoder {
            inner,
            video: false,
            decoded: 0,
            ledger: Arc::clone(&self.ledger),
            faults: Arc::clone(&self.faults),
        }))
    }

    fn create_video_decoder(
        &self,
        location: &str,
        format: &VideoFormat,
        hardware_acceleration: &[HardwareAcceleration],
    ) -> Result<Box<dyn Decoder>> {
        if self.faults.fail_video_decoder {
            return Err(Error::Decode("injected video decoder failure".to_string()));
        }
        let inner = self.inner.create_video_decoder(location, format, hardware_acceleration)?;
        self.ledger.video_decoders_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingDecoder {
            inner,
            video: true,
            decoded: 0,
            ledger: Arc::clone(&self.ledger),
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct CountingDecoder {
    inner: Box<dyn Decoder>,
    video: bool,
    decoded: u64,
    ledger: Arc<Ledger>,
    faults: Arc<Faults>,
}

impl Decoder for CountingDecoder {
    fn decode_audio(&mut self) -> Result<Frame> {
        self.inner.decode_audio()
    }

    fn decode_video(&mut self, target: PoolItem) -> Result<Frame> {
        if self.faults.video_decode_fails_after.is_some_and(|limit| self.decoded >= limit) {
            return Err(Error::Decode("injected video decode failure".to_string()));
        }
        self.decoded += 1;
        self.inner.decode_video(target)
    }

    fn seek_to(&mut self, timestamp: Duration, keyframes_only: bool) -> Result<Duration> {
        self.inner.seek_to(timestamp, keyframes_only)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    fn close(&mut self) -> Result<()> {
        let counter = if self.video {
            &self.ledger.video_decoders_closed
        } else {
            &self.ledger.audio_decoders_closed
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.inner.close()?;
        if self.faults.fail_decoder_close {
            return Err(Error::Decode("injected close failure".to_string()));
        }
        Ok(())
    }
}

pub struct TestSamplerFactory {
    inner: HeadlessSamplerFactory,
    ledger: Arc<Ledger>,
    faults: Arc<Faults>,
}

impl TestSamplerFactory {
    pub fn new(ledger: Arc<Ledger>, faults: Arc<Faults>) -> Self {
        Self {
            inner: HeadlessSamplerFactory::new(),
            ledger,
            faults,
        }
    }
}

impl SamplerFactory for TestSamplerFactory {
    fn create(&self, format: &AudioFormat) -> Result<Box<dyn Sampler>> {
        if self.faults.fail_sampler {
            return Err(Error::Sampler("injected sampler failure".to_string()));
        }
        let inner = self.inner.create(format)?;
        self.ledger.samplers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSampler {
            inner,
            ledger: Arc::clone(&self.ledger),
            volume: 1.0,
            muted: false,
        }))
    }
}

struct CountingSampler {
    inner: Box<dyn Sampler>,
    ledger: Arc<Ledger>,
    volume: f32,
    muted: bool,
}

impl Sampler for CountingSampler {
    fn start(&mut self) -> Result<()> {
        self.ledger.samplers_started.fetch_add(1, Ordering::SeqCst);
        self.inner.start()
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn drain(&mut self) -> Result<()> {
        self.inner.drain()
    }

    fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        self.inner.write(frame)?;
        self.ledger.audio_frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volume = volume;
        self.inner.set_volume(volume)
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted = muted;
        self.inner.set_muted(muted)
    }

    // Settings are pushed volume, mute, speed; the last call completes a record
    fn set_playback_speed(&mut self, factor: f32) -> Result<()> {
        self.ledger.settings.lock().unwrap().push(PlayerSettings {
            volume: self.volume,
            is_muted: self.muted,
            playback_speed_factor: factor,
        });
        self.inner.set_playback_speed(factor)
    }

    fn close(&mut self) -> Result<()> {
        self.ledger.samplers_closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

/// Renderer that remembers what it drew and when
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    frames: Mutex<Vec<(Duration, Instant)>>,
}

impl RecordingRenderer {
    pub fn timestamps(&self) -> Vec<Duration> {
        self.frames.lock().unwrap().iter().map(|(ts, _)| *ts).collect()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Duration> {
        self.frames.lock().unwrap().last().map(|(ts, _)| *ts)
    }

    /// When the frame stamped `timestamp` was first drawn
    pub fn rendered_at(&self, timestamp: Duration) -> Option<Instant> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .find(|(ts, _)| *ts == timestamp)
            .map(|(_, at)| *at)
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, frame: &VideoFrame) -> Result<()> {
        assert!(!frame.pixels().is_empty(), "rendered an empty frame");
        self.frames.lock().unwrap().push((frame.timestamp, Instant::now()));
        Ok(())
    }
}
