//! Player commands

use std::fmt;
use std::time::Duration;
use strobe_common::config::PlayerConfig;
use strobe_common::HardwareAcceleration;

/// Parameters for loading a media item
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareRequest {
    /// Opaque location handed to the decoder factory
    pub location: String,
    /// Audio frames buffered ahead; 0 skips the audio stream
    pub audio_buffer_size: usize,
    /// Video frames buffered ahead; 0 skips the video stream
    pub video_buffer_size: usize,
    pub hardware_acceleration: Vec<HardwareAcceleration>,
}

impl PrepareRequest {
    pub fn new(location: impl Into<String>) -> Self {
        let defaults = PlayerConfig::default();
        Self {
            location: location.into(),
            audio_buffer_size: defaults.audio_buffer_size,
            video_buffer_size: defaults.video_buffer_size,
            hardware_acceleration: defaults.hardware_acceleration,
        }
    }

    /// Buffer sizes and acceleration candidates from the `[player]` section
    pub fn from_config(location: impl Into<String>, config: &PlayerConfig) -> Self {
        Self {
            location: location.into(),
            audio_buffer_size: config.audio_buffer_size,
            video_buffer_size: config.video_buffer_size,
            hardware_acceleration: config.hardware_acceleration.clone(),
        }
    }

    pub fn with_buffer_sizes(mut self, audio: usize, video: usize) -> Self {
        self.audio_buffer_size = audio;
        self.video_buffer_size = video;
        self
    }

    pub fn with_hardware_acceleration(mut self, candidates: Vec<HardwareAcceleration>) -> Self {
        self.hardware_acceleration = candidates;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Prepare(PrepareRequest),
    Play,
    Pause,
    Resume,
    Stop,
    SeekTo { timestamp: Duration, keyframes_only: bool },
    Release,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Prepare(_) => "prepare",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::SeekTo { .. } => "seek",
            Command::Release => "release",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Prepare(request) => write!(f, "prepare({})", request.location),
            Command::SeekTo { timestamp, .. } => write!(f, "seek({}ms)", timestamp.as_millis()),
            other => f.write_str(other.name()),
        }
    }
}
