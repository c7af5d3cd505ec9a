//! Audio/video synchronization primitives
//!
//! Audio is the master clock. A video frame is compared against the last
//! audio position handed to the sampler:
//! - more than the threshold behind: dropped
//! - within the threshold: presented now
//! - more than the threshold ahead: presented after the gap, scaled by speed
//!
//! Without an audio clock (video-only media, or audio already finished) frames
//! are paced against the wall clock instead and never dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strobe_common::time::{duration_to_micros, scale_by_speed};
use tokio::time::Instant;

/// What to do with a video frame relative to the audio clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Drop,
    Present,
    Delay(Duration),
}

/// Decide how to present a video frame stamped `frame` when audio is at `audio`
pub fn decide(frame: Duration, audio: Duration, threshold: Duration, speed: f32) -> SyncAction {
    if frame + threshold < audio {
        SyncAction::Drop
    } else if frame > audio + threshold {
        SyncAction::Delay(scale_by_speed(frame - audio, speed))
    } else {
        SyncAction::Present
    }
}

const UNKNOWN: u64 = u64::MAX;

/// Last audio position written to the sampler, shared with the video task
#[derive(Debug)]
pub struct AudioClock(AtomicU64);

impl Default for AudioClock {
    fn default() -> Self {
        Self(AtomicU64::new(UNKNOWN))
    }
}

impl AudioClock {
    pub fn set(&self, position: Duration) {
        self.0.store(duration_to_micros(position), Ordering::Release);
    }

    /// Forget the position (audio finished)
    pub fn clear(&self) {
        self.0.store(UNKNOWN, Ordering::Release);
    }

    pub fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Acquire) {
            UNKNOWN => None,
            micros => Some(Duration::from_micros(micros)),
        }
    }
}

/// Gate that only lets strictly increasing timestamps through
///
/// Shared by the audio and video halves of a loop so that published
/// positions never go backwards.
#[derive(Debug, Default)]
pub struct MonotonicTimestamp(AtomicU64);

impl MonotonicTimestamp {
    /// Record `position`, returning whether it advanced the high-water mark
    pub fn advance(&self, position: Duration) -> bool {
        // Stored off by one so zero means "nothing yet"
        let candidate = duration_to_micros(position) + 1;
        self.0.fetch_max(candidate, Ordering::AcqRel) < candidate
    }
}

/// Wall-clock pacing for frames without a competing clock
#[derive(Debug, Default)]
pub struct Pacer {
    anchor: Option<(Instant, Duration)>,
}

impl Pacer {
    /// Time to wait before presenting a frame stamped `position`
    pub fn delay_for(&self, position: Duration, speed: f32) -> Option<Duration> {
        let (shown_at, shown_position) = self.anchor?;
        let gap = position.checked_sub(shown_position)?;
        let due = shown_at + scale_by_speed(gap, speed);
        let delay = due.saturating_duration_since(Instant::now());
        (!delay.is_zero()).then_some(delay)
    }

    /// Advance the reference to a frame presented now
    pub fn mark(&mut self, position: Duration) {
        self.anchor = Some((Instant::now(), position));
    }
}
