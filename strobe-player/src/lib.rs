//! # Strobe Player Library (strobe-player)
//!
//! Playback engine: decode-ahead buffering, clock-paced presentation with
//! audio-master synchronization, and a command-driven player state machine.
//!
//! **Architecture:** a [`PlayerController`] owns one [`Pipeline`] per loaded
//! media item plus two background loops, the buffer loop (decoder into bounded
//! buffers) and the playback loop (buffers to sampler and renderer). Decoders
//! and outputs are collaborators behind the traits in [`media`].

pub mod controller;
pub mod error;
pub mod media;
pub mod playback;

pub use controller::{
    Command, ControllerConfig, PlayerController, PlayerEvent, PlayerState, PrepareRequest, ReadyStatus,
};
pub use error::{Error, Result};
pub use playback::{BufferLevels, Pipeline, PlaybackStatsSnapshot};
