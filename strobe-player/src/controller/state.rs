//! Player state machine values
//!
//! `InternalPlayerState` is authoritative and includes the ephemeral
//! `Transition` phase held while a Ready-to-Ready handler runs. `PlayerState`
//! is what hosts observe; transitions are not part of it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strobe_common::Media;

use crate::error::Error;

/// Sub-state of a loaded player
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadyStatus {
    Stopped,
    Playing,
    Paused,
    Completed,
    Seeking,
}

impl fmt::Display for ReadyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadyStatus::Stopped => write!(f, "Stopped"),
            ReadyStatus::Playing => write!(f, "Playing"),
            ReadyStatus::Paused => write!(f, "Paused"),
            ReadyStatus::Completed => write!(f, "Completed"),
            ReadyStatus::Seeking => write!(f, "Seeking"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyPhase {
    Settled(ReadyStatus),
    /// A handler moving to `destination` is in flight
    Transition { destination: ReadyStatus },
}

#[derive(Debug, Clone)]
pub enum InternalPlayerState {
    Empty,
    Preparing,
    Ready { media: Media, phase: ReadyPhase },
    Releasing,
    Error { cause: Arc<Error> },
}

impl InternalPlayerState {
    pub fn settled(media: Media, status: ReadyStatus) -> Self {
        InternalPlayerState::Ready {
            media,
            phase: ReadyPhase::Settled(status),
        }
    }

    pub fn transition(media: Media, destination: ReadyStatus) -> Self {
        InternalPlayerState::Ready {
            media,
            phase: ReadyPhase::Transition { destination },
        }
    }

    /// Media and status when settled in a Ready state
    pub fn ready_status(&self) -> Option<(&Media, ReadyStatus)> {
        match self {
            InternalPlayerState::Ready {
                media,
                phase: ReadyPhase::Settled(status),
            } => Some((media, *status)),
            _ => None,
        }
    }

    /// Host-visible projection; `None` while a transition is in flight
    pub fn project(&self) -> Option<PlayerState> {
        match self {
            InternalPlayerState::Empty => Some(PlayerState::Empty),
            InternalPlayerState::Preparing => Some(PlayerState::Preparing),
            InternalPlayerState::Ready {
                media,
                phase: ReadyPhase::Settled(status),
            } => Some(PlayerState::Ready {
                media: media.clone(),
                status: *status,
            }),
            InternalPlayerState::Ready {
                phase: ReadyPhase::Transition { .. },
                ..
            } => None,
            InternalPlayerState::Releasing => Some(PlayerState::Releasing),
            InternalPlayerState::Error { cause } => Some(PlayerState::Error {
                cause: Arc::clone(cause),
            }),
        }
    }
}

/// Observable player state
#[derive(Debug, Clone)]
pub enum PlayerState {
    Empty,
    Preparing,
    Ready { media: Media, status: ReadyStatus },
    Releasing,
    Error { cause: Arc<Error> },
}

impl PlayerState {
    pub fn status(&self) -> Option<ReadyStatus> {
        match self {
            PlayerState::Ready { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn media(&self) -> Option<&Media> {
        match self {
            PlayerState::Ready { media, .. } => Some(media),
            _ => None,
        }
    }
}

impl PartialEq for PlayerState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PlayerState::Empty, PlayerState::Empty)
            | (PlayerState::Preparing, PlayerState::Preparing)
            | (PlayerState::Releasing, PlayerState::Releasing) => true,
            (
                PlayerState::Ready { media: a, status: x },
                PlayerState::Ready { media: b, status: y },
            ) => a == b && x == y,
            (PlayerState::Error { cause: a }, PlayerState::Error { cause: b }) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerState::Empty => write!(f, "Empty"),
            PlayerState::Preparing => write!(f, "Preparing"),
            PlayerState::Ready { status, .. } => write!(f, "Ready.{}", status),
            PlayerState::Releasing => write!(f, "Releasing"),
            PlayerState::Error { cause } => write!(f, "Error({})", cause),
        }
    }
}
