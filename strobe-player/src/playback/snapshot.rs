//! Still captures of a video stream at chosen timestamps
//!
//! Works without a player: the location is probed, one video decoder and a
//! single-slot pool are opened, and each requested position is seeked,
//! decoded and handed to the renderer. Decoder and pool are closed on every
//! exit path.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use strobe_common::time::{duration_from_micros, format_timestamp};
use strobe_common::HardwareAcceleration;
use tracing::{debug, warn};

use crate::error::{first_failure, Error, Result};
use crate::media::decoder::{DecoderFactory, DecoderHandle};
use crate::media::frame::Frame;
use crate::media::output::Renderer;
use crate::playback::pool::Pool;

/// One frame is decoded, rendered and released at a time
const POOL_CAPACITY: usize = 1;

/// Capture frames at the positions `timestamps` picks from the media duration.
///
/// Positions outside `[0, duration]` are skipped and repeats are captured
/// once, in first-seen order. Returns the timestamp of every frame handed to
/// `renderer`; a position past the last frame captures nothing.
pub async fn snapshots<F>(
    decoders: Arc<dyn DecoderFactory>,
    location: &str,
    hardware_acceleration: &[HardwareAcceleration],
    keyframes_only: bool,
    timestamps: F,
    renderer: &dyn Renderer,
) -> Result<Vec<Duration>>
where
    F: FnOnce(Duration) -> Vec<Duration>,
{
    let probe = {
        let decoders = Arc::clone(&decoders);
        let location = location.to_string();
        tokio::task::spawn_blocking(move || decoders.probe(&location, false, true)).await??
    };
    let duration = duration_from_micros(probe.duration_micros)
        .ok_or_else(|| Error::Unsupported("Media does not support playback".to_string()))?;
    let format = probe
        .video
        .ok_or_else(|| Error::Unsupported(format!("no video stream in {}", location)))?;

    let mut seen = HashSet::new();
    let positions: Vec<Duration> = timestamps(duration)
        .into_iter()
        .filter(|ts| *ts <= duration && seen.insert(*ts))
        .collect();
    if positions.is_empty() {
        debug!(location, "No snapshot positions within the media");
        return Ok(Vec::new());
    }

    let decoder = {
        let location = location.to_string();
        let hardware_acceleration = hardware_acceleration.to_vec();
        tokio::task::spawn_blocking(move || {
            decoders.create_video_decoder(&location, &format, &hardware_acceleration)
        })
        .await??
    };
    let decoder = DecoderHandle::new("snapshot decoder", decoder);
    let pool = match Pool::new(POOL_CAPACITY, format.buffer_capacity) {
        Ok(pool) => pool,
        Err(e) => {
            if let Err(close_err) = decoder.close().await {
                warn!(error = %close_err, "Failed to close snapshot decoder");
            }
            return Err(e);
        }
    };

    let captured = capture(&decoder, &pool, &positions, keyframes_only, renderer).await;

    pool.close();
    let closed = first_failure("snapshot close", vec![("snapshot decoder", decoder.close().await)]);

    let captured = captured?;
    closed?;
    debug!(location, requested = positions.len(), captured = captured.len(), "Snapshots taken");
    Ok(captured)
}

/// Capture a single frame, `None` when the position holds no frame
pub async fn snapshot<F>(
    decoders: Arc<dyn DecoderFactory>,
    location: &str,
    hardware_acceleration: &[HardwareAcceleration],
    keyframes_only: bool,
    timestamp: F,
    renderer: &dyn Renderer,
) -> Result<Option<Duration>>
where
    F: FnOnce(Duration) -> Duration,
{
    let captured = snapshots(
        decoders,
        location,
        hardware_acceleration,
        keyframes_only,
        |duration| vec![timestamp(duration)],
        renderer,
    )
    .await?;
    Ok(captured.into_iter().next())
}

async fn capture(
    decoder: &DecoderHandle,
    pool: &Pool,
    positions: &[Duration],
    keyframes_only: bool,
    renderer: &dyn Renderer,
) -> Result<Vec<Duration>> {
    let mut captured = Vec::with_capacity(positions.len());
    for &position in positions {
        if !position.is_zero() {
            decoder.seek_to(position, keyframes_only).await?;
        }

        // The slot returns to the pool when the frame drops
        let item = pool.acquire().await?;
        match decoder.decode_video(item).await? {
            Frame::Video(frame) => {
                renderer.render(&frame)?;
                captured.push(frame.timestamp);
            }
            Frame::EndOfStream => {
                debug!(position = %format_timestamp(position), "No frame at snapshot position");
            }
            Frame::Audio(_) => return Err(Error::Decode("video decoder produced an audio frame".to_string())),
        }
    }
    Ok(captured)
}
