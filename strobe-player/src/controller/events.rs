//! Events published by the player

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::controller::state::PlayerState;
use crate::error::Error;

/// Broadcast to every subscriber of [`PlayerController::subscribe_events`]
///
/// [`PlayerController::subscribe_events`]: crate::controller::PlayerController::subscribe_events
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// A loop or command failed; the pipeline is left as it was
    Error(Arc<Error>),

    /// Every stream has been decoded to the end
    BufferComplete,

    /// Playback is waiting on the decoder
    BufferWaiting,

    StateChanged {
        previous: PlayerState,
        current: PlayerState,
        at: DateTime<Utc>,
    },
}
