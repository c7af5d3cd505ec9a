//! PlayerController integration tests
//!
//! Drive the controller end to end over the synthetic decoder with recording
//! fakes for the sampler and renderer.

mod helpers;

use helpers::*;
use std::io::Write;
use std::time::Duration;
use strobe_common::config::TomlConfig;
use strobe_common::PlayerSettings;
use strobe_player::{ControllerConfig, Error, PlayerEvent, PlayerState, PrepareRequest, ReadyStatus};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

const SHORT_AV: &str =
    "synthetic:av?duration_ms=300&fps=25&sample_rate=8000&channels=1&width=4&height=4&keyframe_interval=1";

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_prepare_renders_first_frame_and_stops() {
    let harness = Harness::new().await;

    harness
        .controller
        .prepare(PrepareRequest::new(AV_10S).with_buffer_sizes(8, 8))
        .await
        .unwrap();

    assert_eq!(harness.status(), Some(ReadyStatus::Stopped));
    assert_eq!(harness.renderer.timestamps(), vec![Duration::ZERO], "preview renders the first frame once");
    assert_eq!(harness.controller.buffer_timestamp(), Duration::ZERO);
    assert_eq!(harness.controller.playback_timestamp(), Duration::ZERO);

    let media = harness.controller.state().media().cloned().unwrap();
    assert_eq!(media.duration(), ms(10_000));
    assert!(media.audio_format().is_some() && media.video_format().is_some());
}

#[tokio::test]
async fn test_playback_timestamps_advance_behind_buffer() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    harness.controller.play().await.unwrap();
    assert_eq!(harness.status(), Some(ReadyStatus::Playing));

    let mut playback = harness.controller.subscribe_playback_timestamp();
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(ms(1_200), async {
        while playback.changed().await.is_ok() {
            seen.push(*playback.borrow_and_update());
        }
    })
    .await;

    assert!(seen.len() > 5, "expected steady progress, saw {:?}", seen);
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "not monotonic: {:?}", seen);
    assert!(*seen.last().unwrap() >= ms(500));

    // Read playback first; the buffer position only grows
    let played = harness.controller.playback_timestamp();
    let buffered = harness.controller.buffer_timestamp();
    assert!(buffered >= played, "buffer {:?} behind playback {:?}", buffered, played);

    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_seek_while_playing_passes_through_seeking_to_paused() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    harness.controller.play().await.unwrap();
    tokio::time::sleep(ms(300)).await;

    let mut events = harness.controller.subscribe_events();
    harness.controller.seek_to(ms(5_000)).await.unwrap();

    assert_eq!(
        drain_statuses(&mut events),
        vec![Some(ReadyStatus::Seeking), Some(ReadyStatus::Paused)]
    );
    assert_eq!(harness.status(), Some(ReadyStatus::Paused));

    let position = harness.controller.playback_timestamp();
    let distance = position.max(ms(5_000)) - position.min(ms(5_000));
    assert!(distance <= FRAME_INTERVAL, "landed at {:?}", position);
    assert_eq!(harness.renderer.last(), Some(position), "the frame at the new position is shown");

    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_stop_while_playing_rewinds_and_rerenders_first_frame() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    harness.controller.play().await.unwrap();
    tokio::time::sleep(ms(500)).await;
    assert!(harness.controller.playback_timestamp() > Duration::ZERO);

    harness.controller.stop().await.unwrap();

    assert_eq!(harness.status(), Some(ReadyStatus::Stopped));
    assert_eq!(harness.controller.buffer_timestamp(), Duration::ZERO);
    assert_eq!(harness.controller.playback_timestamp(), Duration::ZERO);
    assert_eq!(harness.renderer.last(), Some(Duration::ZERO));

    // Nothing queued and no pool slot checked out
    let levels = harness.controller.buffer_levels().await.unwrap();
    assert_eq!(levels.audio_queued, 0);
    assert_eq!(levels.video_queued, 0);
    assert_eq!(levels.video_slots_outstanding, 0);

    // Playback starts over from the beginning
    harness.controller.play().await.unwrap();
    tokio::time::sleep(ms(200)).await;
    assert!(harness.controller.playback_timestamp() < ms(1_000));
    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_release_from_every_ready_state() {
    let harness = Harness::new().await;
    let statuses = [
        ReadyStatus::Stopped,
        ReadyStatus::Playing,
        ReadyStatus::Paused,
        ReadyStatus::Completed,
    ];

    for target in statuses {
        harness.controller.prepare(PrepareRequest::new(SHORT_AV)).await.unwrap();
        match target {
            ReadyStatus::Stopped => {}
            ReadyStatus::Playing => harness.controller.play().await.unwrap(),
            ReadyStatus::Paused => {
                harness.controller.play().await.unwrap();
                harness.controller.pause().await.unwrap();
            }
            ReadyStatus::Completed => {
                harness.controller.play().await.unwrap();
                wait_for_state(&harness.controller, |s| s.status() == Some(ReadyStatus::Completed)).await;
            }
            ReadyStatus::Seeking => unreachable!(),
        }
        assert_eq!(harness.status(), Some(target));

        harness.controller.release().await.unwrap();

        assert!(matches!(harness.controller.state(), PlayerState::Empty), "release from {}", target);
        assert_eq!(harness.ledger.open_handles(), 0, "handles leaked releasing from {}", target);
        assert_eq!(harness.controller.buffer_timestamp(), Duration::ZERO);
        assert_eq!(harness.controller.playback_timestamp(), Duration::ZERO);
    }

    assert_eq!(Ledger::count(&harness.ledger.video_decoders_opened), statuses.len());
}

#[tokio::test]
async fn test_playback_completes_at_end_of_media() {
    let harness = Harness::new().await;
    let mut events = harness.controller.subscribe_events();
    harness.controller.prepare(PrepareRequest::new(SHORT_AV)).await.unwrap();
    harness.controller.play().await.unwrap();

    wait_for_event(&mut events, |e| matches!(e, PlayerEvent::BufferComplete)).await;
    wait_for_state(&harness.controller, |s| s.status() == Some(ReadyStatus::Completed)).await;

    let stats = harness.controller.playback_stats().await.unwrap();
    assert!(stats.rendered_frames > 0);
    assert_eq!(stats.audio_frames, 15, "300ms of audio in 20ms chunks");
    assert_eq!(harness.controller.buffer_timestamp(), ms(300));

    // Completed media can be stopped back to the start
    harness.controller.stop().await.unwrap();
    assert_eq!(harness.status(), Some(ReadyStatus::Stopped));
    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_pause_during_end_hold_then_resume_completes() {
    // Two frames, the second held on screen for its last 500ms
    const TWO_FRAMES: &str = "synthetic:video?duration_ms=1000&fps=2&width=4&height=4";

    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(TWO_FRAMES)).await.unwrap();
    harness.controller.play().await.unwrap();

    let mut playback = harness.controller.subscribe_playback_timestamp();
    tokio::time::timeout(ms(5_000), playback.wait_for(|ts| *ts >= ms(500)))
        .await
        .expect("last frame never shown")
        .unwrap();
    tokio::time::sleep(ms(100)).await;

    harness.controller.pause().await.unwrap();
    assert_eq!(harness.status(), Some(ReadyStatus::Paused));
    harness.controller.resume().await.unwrap();

    wait_for_state(&harness.controller, |s| s.status() == Some(ReadyStatus::Completed)).await;
    assert_eq!(harness.renderer.last(), Some(ms(500)));
    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_preview_failure_closes_pipeline_even_when_close_fails() {
    let harness = Harness::with_faults(Faults {
        video_decode_fails_after: Some(0),
        fail_decoder_close: true,
        ..Faults::default()
    })
    .await;

    let err = harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap_err();
    assert!(matches!(err.root(), Error::Decode(_)), "preview error is reported, not the close error: {}", err);
    assert!(matches!(harness.controller.state(), PlayerState::Error { .. }));
    assert_eq!(harness.ledger.open_handles(), 0);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_commands_run_one_at_a_time() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    let mut events = harness.controller.subscribe_events();

    // Pause queues behind play and sees it finished
    let (played, paused) = tokio::join!(harness.controller.play(), harness.controller.pause());
    played.unwrap();
    paused.unwrap();

    assert_eq!(harness.status(), Some(ReadyStatus::Paused));
    assert_eq!(
        drain_statuses(&mut events),
        vec![Some(ReadyStatus::Playing), Some(ReadyStatus::Paused)]
    );
    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_sampler_failure_rolls_back_built_resources() {
    let harness = Harness::with_faults(Faults {
        fail_sampler: true,
        ..Faults::default()
    })
    .await;

    let err = harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap_err();

    assert!(matches!(err.root(), Error::Sampler(_)), "unexpected error {:?}", err);
    match harness.controller.state() {
        PlayerState::Error { cause } => assert!(matches!(cause.root(), Error::Sampler(_))),
        other => panic!("expected Error state, got {}", other),
    }
    assert_eq!(Ledger::count(&harness.ledger.audio_decoders_opened), 1);
    assert_eq!(Ledger::count(&harness.ledger.audio_decoders_closed), 1);
    assert_eq!(Ledger::count(&harness.ledger.video_decoders_closed), 1);
    assert_eq!(harness.ledger.open_handles(), 0);
}

#[tokio::test]
async fn test_video_decoder_failure_closes_audio_side_once() {
    let harness = Harness::with_faults(Faults {
        fail_video_decoder: true,
        ..Faults::default()
    })
    .await;

    assert!(harness.controller.prepare(PrepareRequest::new(AV_10S)).await.is_err());

    assert!(matches!(harness.controller.state(), PlayerState::Error { .. }));
    assert_eq!(Ledger::count(&harness.ledger.video_decoders_opened), 0);
    assert_eq!(Ledger::count(&harness.ledger.samplers_opened), 1);
    assert_eq!(Ledger::count(&harness.ledger.samplers_closed), 1);
    assert_eq!(Ledger::count(&harness.ledger.audio_decoders_closed), 1);
}

#[tokio::test]
async fn test_prepare_recovers_from_error_state() {
    let harness = Harness::new().await;

    let err = harness
        .controller
        .prepare(PrepareRequest::new("synthetic:hologram"))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::Unsupported(_)));
    assert!(matches!(harness.controller.state(), PlayerState::Error { .. }));

    harness.controller.prepare(PrepareRequest::new(VIDEO_2S)).await.unwrap();
    assert_eq!(harness.status(), Some(ReadyStatus::Stopped));
    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_negative_probe_duration_is_unsupported() {
    let harness = Harness::with_faults(Faults {
        probe_duration_micros: Some(-1),
        ..Faults::default()
    })
    .await;

    let err = harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap_err();

    assert!(matches!(err.root(), Error::Unsupported(msg) if msg.contains("does not support playback")));
    assert_eq!(harness.ledger.open_handles(), 0);
}

#[tokio::test]
async fn test_play_while_playing_changes_nothing() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    harness.controller.play().await.unwrap();
    tokio::time::sleep(ms(300)).await;

    let mut events = harness.controller.subscribe_events();
    let before = harness.controller.playback_timestamp();
    let starts = Ledger::count(&harness.ledger.samplers_started);

    harness.controller.play().await.unwrap();

    assert_eq!(harness.status(), Some(ReadyStatus::Playing));
    assert!(drain_statuses(&mut events).is_empty());
    assert!(harness.controller.playback_timestamp() >= before, "timestamps were reset");
    assert_eq!(Ledger::count(&harness.ledger.samplers_started), starts);
    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_commands_outside_their_states_are_ignored() {
    let harness = Harness::new().await;

    // Nothing loaded
    harness.controller.play().await.unwrap();
    harness.controller.stop().await.unwrap();
    harness.controller.release().await.unwrap();
    assert!(matches!(harness.controller.state(), PlayerState::Empty));

    harness.controller.prepare(PrepareRequest::new(AUDIO_2S)).await.unwrap();
    harness.controller.pause().await.unwrap();
    harness.controller.resume().await.unwrap();
    harness.controller.stop().await.unwrap();
    assert_eq!(harness.status(), Some(ReadyStatus::Stopped));

    // A second prepare does not replace the loaded media
    harness.controller.prepare(PrepareRequest::new(VIDEO_2S)).await.unwrap();
    assert!(harness.controller.state().media().unwrap().video_format().is_none());
    harness.controller.release().await.unwrap();
}

// ============================================================================
// Seeking edge cases
// ============================================================================

#[tokio::test]
async fn test_seek_beyond_duration_is_rejected() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    let mut events = harness.controller.subscribe_events();

    let err = harness.controller.seek_to(ms(10_001)).await.unwrap_err();

    assert!(matches!(err.root(), Error::InvalidInput(_)));
    assert_eq!(harness.status(), Some(ReadyStatus::Stopped));
    wait_for_event(&mut events, |e| matches!(e, PlayerEvent::Error(_))).await;
    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_seek_from_stopped_lands_paused() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(VIDEO_2S)).await.unwrap();

    harness.controller.seek_to_with(ms(1_000), false).await.unwrap();

    assert_eq!(harness.status(), Some(ReadyStatus::Paused));
    assert_eq!(harness.controller.playback_timestamp(), ms(1_000));
    assert_eq!(harness.renderer.last(), Some(ms(1_000)));

    harness.controller.resume().await.unwrap();
    tokio::time::sleep(ms(200)).await;
    assert!(harness.controller.playback_timestamp() > ms(1_000));
    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_still_image_is_not_continuous() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(STILL_IMAGE)).await.unwrap();
    assert_eq!(harness.renderer.count(), 1);

    harness.controller.play().await.unwrap();
    assert_eq!(harness.status(), Some(ReadyStatus::Stopped), "play is a no-op for a still image");

    let err = harness.controller.seek_to(Duration::ZERO).await.unwrap_err();
    assert!(matches!(err.root(), Error::InvalidState(_)));

    harness.controller.release().await.unwrap();
    assert_eq!(harness.ledger.open_handles(), 0);
}

// ============================================================================
// Runtime faults and teardown
// ============================================================================

#[tokio::test]
async fn test_decode_fault_is_reported_without_state_change() {
    let harness = Harness::with_faults(Faults {
        video_decode_fails_after: Some(20),
        ..Faults::default()
    })
    .await;
    let mut events = harness.controller.subscribe_events();
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    harness.controller.play().await.unwrap();

    let event = wait_for_event(&mut events, |e| matches!(e, PlayerEvent::Error(_))).await;
    match event {
        PlayerEvent::Error(cause) => assert!(matches!(cause.root(), Error::Decode(_))),
        _ => unreachable!(),
    }
    assert_eq!(harness.status(), Some(ReadyStatus::Playing));

    harness.controller.release().await.unwrap();
    assert_eq!(harness.ledger.open_handles(), 0);
}

#[tokio::test]
async fn test_release_reaches_empty_despite_close_failure() {
    let harness = Harness::with_faults(Faults {
        fail_decoder_close: true,
        ..Faults::default()
    })
    .await;
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    let mut events = harness.controller.subscribe_events();

    let err = harness.controller.release().await.unwrap_err();

    assert!(matches!(err.root(), Error::Decode(_)));
    assert!(matches!(harness.controller.state(), PlayerState::Empty));
    // Every resource was still closed
    assert_eq!(harness.ledger.open_handles(), 0);
    wait_for_event(&mut events, |e| matches!(e, PlayerEvent::Error(_))).await;
}

#[tokio::test]
async fn test_close_releases_media_and_rejects_commands() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(AV_10S)).await.unwrap();
    harness.controller.play().await.unwrap();

    harness.controller.close().await.unwrap();

    assert!(matches!(harness.controller.state(), PlayerState::Empty));
    assert_eq!(harness.ledger.open_handles(), 0);
    let err = harness.controller.play().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    // Closing twice is harmless
    harness.controller.close().await.unwrap();
}

// ============================================================================
// Settings and configuration
// ============================================================================

#[tokio::test]
async fn test_settings_are_validated_and_pushed_to_sampler() {
    let harness = Harness::new().await;
    harness.controller.prepare(PrepareRequest::new(AUDIO_2S)).await.unwrap();
    assert_eq!(harness.ledger.last_sampler_settings(), Some(PlayerSettings::default()));

    let too_fast = PlayerSettings {
        playback_speed_factor: 3.0,
        ..PlayerSettings::default()
    };
    let err = harness.controller.change_settings(too_fast).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(harness.controller.settings(), PlayerSettings::default(), "never clamped");

    let quiet_and_quick = PlayerSettings {
        volume: 0.25,
        is_muted: true,
        playback_speed_factor: 1.5,
    };
    harness.controller.change_settings(quiet_and_quick).await.unwrap();
    assert_eq!(harness.controller.settings(), quiet_and_quick);
    assert_eq!(harness.ledger.last_sampler_settings(), Some(quiet_and_quick));

    harness.controller.reset_settings().await.unwrap();
    assert_eq!(harness.controller.settings(), PlayerSettings::default());
    assert_eq!(harness.ledger.last_sampler_settings(), Some(PlayerSettings::default()));

    harness.controller.release().await.unwrap();
}

#[tokio::test]
async fn test_controller_built_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strobe.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        "[player]\nsync_threshold_ms = 30\naudio_buffer_size = 4\nvideo_buffer_size = 2\nplayback_speed = 1.25"
    )
    .unwrap();

    let config = TomlConfig::load_or_default(&path).unwrap();
    let controller_config = ControllerConfig::from_player_config(&config.player).unwrap();
    assert_eq!(controller_config.sync_threshold, ms(30));
    assert_eq!(controller_config.initial_settings.playback_speed_factor, 1.25);

    let ledger = std::sync::Arc::new(Ledger::default());
    let faults = std::sync::Arc::new(Faults::default());
    let controller = strobe_player::PlayerController::new(
        controller_config,
        std::sync::Arc::new(TestDecoderFactory::new(ledger.clone(), faults.clone())),
        std::sync::Arc::new(TestSamplerFactory::new(ledger.clone(), faults)),
    );
    assert_eq!(controller.settings().playback_speed_factor, 1.25);

    controller
        .prepare(PrepareRequest::from_config(AV_10S, &config.player))
        .await
        .unwrap();
    controller.play().await.unwrap();
    tokio::time::sleep(ms(200)).await;

    let levels = controller.buffer_levels().await.unwrap();
    assert!(levels.audio_queued <= 4);
    assert!(levels.video_queued <= 2);
    assert!(levels.video_slots_outstanding <= 2 + 2);

    controller.close().await.unwrap();
    assert_eq!(ledger.open_handles(), 0);
}
