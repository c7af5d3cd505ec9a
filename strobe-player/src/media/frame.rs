//! Decoded frames

use std::time::Duration;

use crate::playback::pool::PoolItem;

/// Interleaved f32 PCM chunk
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub timestamp: Duration,
    pub bytes: Vec<u8>,
}

impl AudioFrame {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Decoded picture written into a pool slot
///
/// Dropping the frame returns its slot to the pool.
#[derive(Debug)]
pub struct VideoFrame {
    pub timestamp: Duration,
    pub data: PoolItem,
    /// Bytes of `data` actually written by the decoder
    pub size: usize,
    pub width: u32,
    pub height: u32,
}

impl VideoFrame {
    pub fn pixels(&self) -> &[u8] {
        let bytes = self.data.as_slice();
        &bytes[..self.size.min(bytes.len())]
    }
}

/// Decoder output
#[derive(Debug)]
pub enum Frame {
    Audio(AudioFrame),
    Video(VideoFrame),
    EndOfStream,
}

impl Frame {
    pub fn timestamp(&self) -> Option<Duration> {
        match self {
            Frame::Audio(frame) => Some(frame.timestamp),
            Frame::Video(frame) => Some(frame.timestamp),
            Frame::EndOfStream => None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Frame::EndOfStream)
    }
}
