//! Media descriptors
//!
//! A `Media` value is produced once per `Prepare` by probing a location and
//! stays immutable for the lifetime of the pipeline built from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::{Error, Result};

/// PCM stream layout delivered by an audio decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Bytes per second of interleaved f32 samples
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * std::mem::size_of::<f32>() as u64
    }

    /// Playback duration of `len` bytes of interleaved f32 samples
    pub fn duration_of(&self, len: usize) -> Duration {
        let rate = self.bytes_per_second();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(len as u64 * 1_000_000 / rate)
    }
}

/// Frame geometry and cadence delivered by a video decoder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    /// Frames per second; zero for still images
    pub frame_rate: f64,
    /// Size in bytes of one decoded frame (pool slot size)
    pub buffer_capacity: usize,
}

impl VideoFormat {
    /// Nominal spacing between frames, `None` for still images
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.frame_rate > 0.0).then(|| Duration::from_secs_f64(1.0 / self.frame_rate))
    }
}

/// Probed media descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Media {
    Audio {
        id: Uuid,
        location: String,
        duration: Duration,
        format: AudioFormat,
    },
    Video {
        id: Uuid,
        location: String,
        duration: Duration,
        format: VideoFormat,
    },
    AudioVideo {
        id: Uuid,
        location: String,
        duration: Duration,
        audio_format: AudioFormat,
        video_format: VideoFormat,
    },
}

impl Media {
    /// Build a descriptor from whichever streams a probe found.
    ///
    /// Returns `None` when neither stream is present.
    pub fn from_streams(
        location: impl Into<String>,
        duration: Duration,
        audio: Option<AudioFormat>,
        video: Option<VideoFormat>,
    ) -> Option<Self> {
        let id = Uuid::new_v4();
        let location = location.into();
        match (audio, video) {
            (Some(audio_format), Some(video_format)) => Some(Media::AudioVideo {
                id,
                location,
                duration,
                audio_format,
                video_format,
            }),
            (Some(format), None) => Some(Media::Audio {
                id,
                location,
                duration,
                format,
            }),
            (None, Some(format)) => Some(Media::Video {
                id,
                location,
                duration,
                format,
            }),
            (None, None) => None,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Media::Audio { id, .. } | Media::Video { id, .. } | Media::AudioVideo { id, .. } => *id,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Media::Audio { location, .. }
            | Media::Video { location, .. }
            | Media::AudioVideo { location, .. } => location,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Media::Audio { duration, .. }
            | Media::Video { duration, .. }
            | Media::AudioVideo { duration, .. } => *duration,
        }
    }

    pub fn audio_format(&self) -> Option<&AudioFormat> {
        match self {
            Media::Audio { format, .. } => Some(format),
            Media::AudioVideo { audio_format, .. } => Some(audio_format),
            Media::Video { .. } => None,
        }
    }

    pub fn video_format(&self) -> Option<&VideoFormat> {
        match self {
            Media::Video { format, .. } => Some(format),
            Media::AudioVideo { video_format, .. } => Some(video_format),
            Media::Audio { .. } => None,
        }
    }

    /// Whether time-based commands (play, pause, seek) apply to this media.
    ///
    /// A still image has a zero duration or a zero frame rate and no audio.
    pub fn is_continuous(&self) -> bool {
        if self.duration().is_zero() {
            return false;
        }
        self.audio_format().is_some()
            || self.video_format().is_some_and(|format| format.frame_rate > 0.0)
    }
}

/// Hardware decoding backends a video decoder may try, in caller order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareAcceleration {
    None,
    Vdpau,
    Cuda,
    Vaapi,
    Dxva2,
    Qsv,
    VideoToolbox,
    D3d11va,
    Drm,
    OpenCl,
    MediaCodec,
    Vulkan,
    D3d12va,
}

impl HardwareAcceleration {
    pub const ALL: [HardwareAcceleration; 13] = [
        HardwareAcceleration::None,
        HardwareAcceleration::Vdpau,
        HardwareAcceleration::Cuda,
        HardwareAcceleration::Vaapi,
        HardwareAcceleration::Dxva2,
        HardwareAcceleration::Qsv,
        HardwareAcceleration::VideoToolbox,
        HardwareAcceleration::D3d11va,
        HardwareAcceleration::Drm,
        HardwareAcceleration::OpenCl,
        HardwareAcceleration::MediaCodec,
        HardwareAcceleration::Vulkan,
        HardwareAcceleration::D3d12va,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareAcceleration::None => "none",
            HardwareAcceleration::Vdpau => "vdpau",
            HardwareAcceleration::Cuda => "cuda",
            HardwareAcceleration::Vaapi => "vaapi",
            HardwareAcceleration::Dxva2 => "dxva2",
            HardwareAcceleration::Qsv => "qsv",
            HardwareAcceleration::VideoToolbox => "videotoolbox",
            HardwareAcceleration::D3d11va => "d3d11va",
            HardwareAcceleration::Drm => "drm",
            HardwareAcceleration::OpenCl => "opencl",
            HardwareAcceleration::MediaCodec => "mediacodec",
            HardwareAcceleration::Vulkan => "vulkan",
            HardwareAcceleration::D3d12va => "d3d12va",
        }
    }
}

impl fmt::Display for HardwareAcceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardwareAcceleration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown hardware acceleration: {}", s)))
    }
}
