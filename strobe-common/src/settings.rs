//! Playback settings

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const MIN_PLAYBACK_SPEED: f32 = 0.5;
pub const MAX_PLAYBACK_SPEED: f32 = 2.0;
pub const NORMAL_PLAYBACK_SPEED: f32 = 1.0;

/// User-adjustable playback settings
///
/// Values are validated where they enter the player; out-of-range values are
/// rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Linear gain in `[0, 1]`
    pub volume: f32,
    pub is_muted: bool,
    /// Speed multiplier in `[MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED]`
    pub playback_speed_factor: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            is_muted: false,
            playback_speed_factor: NORMAL_PLAYBACK_SPEED,
        }
    }
}

impl PlayerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::InvalidInput(format!(
                "Volume {} outside [0, 1]",
                self.volume
            )));
        }
        if !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&self.playback_speed_factor) {
            return Err(Error::InvalidInput(format!(
                "Playback speed {} outside [{}, {}]",
                self.playback_speed_factor, MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED
            )));
        }
        Ok(())
    }

    /// Gain actually applied to samples
    pub fn effective_volume(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            self.volume
        }
    }
}
