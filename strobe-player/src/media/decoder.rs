//! Decoder collaborator contract
//!
//! A decoder is an opaque native component: it opens a location, produces
//! frames in timestamp order and supports seek and reset. The player never
//! inspects codecs; it only drives this trait.

use std::time::Duration;
use strobe_common::{AudioFormat, HardwareAcceleration, VideoFormat};

use crate::error::{Error, Result};
use crate::media::frame::Frame;
use crate::media::handle::NativeHandle;
use crate::playback::pool::PoolItem;

/// One-shot format detection result
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    /// Signed duration in microseconds; negative means not playable
    pub duration_micros: i64,
    pub audio: Option<AudioFormat>,
    pub video: Option<VideoFormat>,
}

/// Per-stream decoder
pub trait Decoder: Send {
    /// Next audio chunk or `EndOfStream`
    fn decode_audio(&mut self) -> Result<Frame> {
        Err(Error::Decode("decoder has no audio stream".to_string()))
    }

    /// Decode the next picture into `target`, returning it inside the frame
    fn decode_video(&mut self, target: PoolItem) -> Result<Frame> {
        drop(target);
        Err(Error::Decode("decoder has no video stream".to_string()))
    }

    /// Reposition, returning the timestamp actually reached
    fn seek_to(&mut self, timestamp: Duration, keyframes_only: bool) -> Result<Duration>;

    /// Rewind to the start without reallocating
    fn reset(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Opens decoders for a location
pub trait DecoderFactory: Send + Sync {
    fn probe(&self, location: &str, find_audio: bool, find_video: bool) -> Result<Probe>;

    fn create_audio_decoder(&self, location: &str, format: &AudioFormat) -> Result<Box<dyn Decoder>>;

    /// `hardware_acceleration` lists backends to try in order
    fn create_video_decoder(
        &self,
        location: &str,
        format: &VideoFormat,
        hardware_acceleration: &[HardwareAcceleration],
    ) -> Result<Box<dyn Decoder>>;
}

pub type DecoderHandle = NativeHandle<dyn Decoder>;

impl NativeHandle<dyn Decoder> {
    pub async fn decode_audio(&self) -> Result<Frame> {
        self.call(|decoder| decoder.decode_audio()).await
    }

    pub async fn decode_video(&self, target: PoolItem) -> Result<Frame> {
        self.call(move |decoder| decoder.decode_video(target)).await
    }

    pub async fn seek_to(&self, timestamp: Duration, keyframes_only: bool) -> Result<Duration> {
        self.call(move |decoder| decoder.seek_to(timestamp, keyframes_only)).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.call(|decoder| decoder.reset()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.close_with(|decoder| decoder.close()).await
    }
}
