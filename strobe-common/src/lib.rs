//! # strobe Common Library
//!
//! Shared descriptors and bootstrap plumbing for the strobe playback engine.
//!
//! - `media` - media descriptors produced by probing (`Media`, stream formats)
//! - `settings` - user-adjustable playback settings and their bounds
//! - `config` - TOML bootstrap configuration
//! - `time` - timestamp conversion and display helpers

pub mod config;
pub mod error;
pub mod media;
pub mod settings;
pub mod time;

pub use error::{Error, Result};
pub use media::{AudioFormat, HardwareAcceleration, Media, VideoFormat};
pub use settings::PlayerSettings;
