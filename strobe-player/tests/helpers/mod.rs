//! Test helper modules for strobe-player integration tests
//!
//! - `fakes`: decoder, sampler and renderer collaborators with failure
//!   injection and open/close accounting
//! - controller construction and wait utilities

#![allow(dead_code)]

pub mod fakes;

use std::sync::Arc;
use std::time::Duration;
use strobe_player::{ControllerConfig, PlayerController, PlayerEvent, PlayerState, ReadyStatus};
use tokio::sync::broadcast;

pub use fakes::{Faults, Ledger, RecordingRenderer, TestDecoderFactory, TestSamplerFactory};

/// Ten seconds of 25fps video with a light audio track
pub const AV_10S: &str =
    "synthetic:av?duration_ms=10000&fps=25&sample_rate=8000&channels=1&width=4&height=4&keyframe_interval=1";

pub const AUDIO_2S: &str = "synthetic:audio?duration_ms=2000&sample_rate=8000&channels=1";

pub const VIDEO_2S: &str = "synthetic:video?duration_ms=2000&fps=25&width=4&height=4";

pub const STILL_IMAGE: &str = "synthetic:image?width=4&height=4";

pub const FRAME_INTERVAL: Duration = Duration::from_millis(40);

/// Controller wired to the test fakes
pub struct Harness {
    pub controller: PlayerController,
    pub ledger: Arc<Ledger>,
    pub renderer: Arc<RecordingRenderer>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_faults(Faults::default()).await
    }

    pub async fn with_faults(faults: Faults) -> Self {
        let ledger = Arc::new(Ledger::default());
        let faults = Arc::new(faults);
        let controller = PlayerController::new(
            ControllerConfig::default(),
            Arc::new(TestDecoderFactory::new(Arc::clone(&ledger), Arc::clone(&faults))),
            Arc::new(TestSamplerFactory::new(Arc::clone(&ledger), faults)),
        );
        let renderer = Arc::new(RecordingRenderer::default());
        controller.attach_renderer(renderer.clone()).await;
        Self {
            controller,
            ledger,
            renderer,
        }
    }

    pub fn status(&self) -> Option<ReadyStatus> {
        self.controller.state().status()
    }
}

/// Wait until the published state satisfies `predicate`
pub async fn wait_for_state(controller: &PlayerController, predicate: impl FnMut(&PlayerState) -> bool) {
    let mut state = controller.subscribe_state();
    tokio::time::timeout(Duration::from_secs(15), state.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

/// Wait for the next event matching `predicate`, skipping others
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<PlayerEvent>,
    mut predicate: impl FnMut(&PlayerEvent) -> bool,
) -> PlayerEvent {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Statuses carried by `StateChanged` events received so far
pub fn drain_statuses(events: &mut broadcast::Receiver<PlayerEvent>) -> Vec<Option<ReadyStatus>> {
    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PlayerEvent::StateChanged { current, .. } = event {
            statuses.push(current.status());
        }
    }
    statuses
}
