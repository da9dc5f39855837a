mod support;

use std::time::Duration;

use guildbeat::{
    common::{ChannelId, CommandRejection, FetchReason, Severity},
    player::{CloseReason, PlaybackState, VoiceConnectionState},
    protocol::{EngineEvent, TrackEndReason},
};
use support::{Harness, Script, SourceEvent, g, seqs_of, test_config, wait_until};
use tokio::time::Instant;

const CH: ChannelId = ChannelId(1);

fn idle(h: &Harness, guild: &str) -> bool {
    h.status(guild).is_some_and(|s| {
        s.state == PlaybackState::Idle && s.current.is_none() && s.queue_len == 0
    })
}

#[tokio::test(start_paused = true)]
async fn plays_tracks_in_enqueue_order() {
    let h = Harness::new(test_config());
    let a = h.track("a", Script::Frames(3));
    let b = h.track("b", Script::Frames(3));
    let c = h.track("c", Script::Frames(3));

    assert_eq!(h.dispatcher.play(&g("1"), CH, a).await.unwrap(), "Now playing: a");
    assert_eq!(
        h.dispatcher.play(&g("1"), CH, b).await.unwrap(),
        "Queued b at position 1"
    );
    assert_eq!(
        h.dispatcher.play(&g("1"), CH, c).await.unwrap(),
        "Queued c at position 2"
    );

    let queued: Vec<String> = h
        .dispatcher
        .queue_list(&g("1"))
        .await
        .unwrap()
        .iter()
        .map(|t| t.title().to_owned())
        .collect();
    assert_eq!(queued, ["b", "c"]);

    assert!(wait_until(|| h.frames("1").len() == 9 && idle(&h, "1")).await);
    let order: Vec<(String, u32)> = ["a", "b", "c"]
        .iter()
        .flat_map(|n| (0..3).map(move |s| (n.to_string(), s)))
        .collect();
    assert_eq!(h.frames("1"), order);
}

#[tokio::test(start_paused = true)]
async fn skip_releases_the_stream_before_opening_the_next() {
    let h = Harness::new(test_config());
    let a = h.track("a", Script::Forever);
    let b = h.track("b", Script::Forever);
    let c = h.track("c", Script::Frames(1));
    for track in [a, b, c] {
        h.dispatcher.play(&g("1"), CH, track).await.unwrap();
    }

    assert!(wait_until(|| h.frame_count("1", "a") >= 3).await);
    assert_eq!(h.dispatcher.skip(&g("1")).await.unwrap(), "Skipped a");

    // never idle in between
    let state = h.status("1").unwrap().state;
    assert!(matches!(state, PlaybackState::Loading | PlaybackState::Playing));

    assert!(wait_until(|| h.frame_count("1", "b") >= 2).await);
    let closed_a = h.source.position(&SourceEvent::Closed("a".into())).unwrap();
    let opened_b = h.source.position(&SourceEvent::Opened("b".into())).unwrap();
    assert!(closed_a < opened_b);

    let queued = h.dispatcher.queue_list(&g("1")).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].title(), "c");

    let now = h.dispatcher.now_playing(&g("1")).await.unwrap();
    assert_eq!(now.track.title(), "b");

    // no frame of `a` after the first frame of `b`
    let frames = h.frames("1");
    let first_b = frames.iter().position(|(n, _)| n == "b").unwrap();
    assert!(frames[first_b..].iter().all(|(n, _)| n == "b"));
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_continue_the_same_stream() {
    let h = Harness::new(test_config());
    let a = h.track("a", Script::Frames(50));
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();

    assert!(wait_until(|| h.frame_count("1", "a") >= 5).await);
    assert_eq!(h.dispatcher.pause(&g("1")).await.unwrap(), "Paused");
    assert_eq!(
        h.dispatcher.pause(&g("1")).await,
        Err(CommandRejection::AlreadyPaused)
    );
    assert_eq!(h.status("1").unwrap().state, PlaybackState::Paused);

    let sent = h.frames("1").len();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.frames("1").len(), sent);

    let now = h.dispatcher.now_playing(&g("1")).await.unwrap();
    assert!(now.paused);
    assert_eq!(now.position_ms, sent as u64 * 20);

    assert_eq!(h.dispatcher.resume(&g("1")).await.unwrap(), "Resumed");
    assert_eq!(
        h.dispatcher.resume(&g("1")).await,
        Err(CommandRejection::NotPaused)
    );

    assert!(wait_until(|| idle(&h, "1")).await);
    assert_eq!(seqs_of(&h.frames("1"), "a"), (0..50).collect::<Vec<_>>());
    assert_eq!(h.source.opens("a"), 1);
}

#[tokio::test(start_paused = true)]
async fn three_failures_halt_and_keep_the_rest_of_the_queue() {
    let mut h = Harness::with_open_delay(test_config(), Duration::from_millis(100));
    let tracks = [
        h.track("f1", Script::FailOpen(FetchReason::NotFound)),
        h.track("f2", Script::FailOpen(FetchReason::NetworkTimeout)),
        h.track("f3", Script::DecodeErrorAfter(0)),
        h.track("x4", Script::Frames(2)),
    ];
    for track in tracks {
        h.dispatcher.play(&g("1"), CH, track).await.unwrap();
    }

    assert!(wait_until(|| h.status("1").is_some_and(|s| s.error.is_some())).await);
    let status = h.status("1").unwrap();
    assert_eq!(status.state, PlaybackState::Idle);
    assert_eq!(h.source.opens("x4"), 0);

    let queued = h.dispatcher.queue_list(&g("1")).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].title(), "x4");

    assert!(matches!(
        h.dispatcher.skip(&g("1")).await,
        Err(CommandRejection::PlaybackHalted(_))
    ));
    assert!(h.events().iter().any(|e| matches!(
        e,
        EngineEvent::PlaybackHalted {
            consecutive_failures: 3,
            ..
        }
    )));
    assert!(h.events().iter().any(|e| matches!(
        e,
        EngineEvent::TrackException {
            severity: Severity::Common,
            ..
        }
    )));

    // the next play clears the halt and resumes from the preserved queue
    let y5 = h.track("y5", Script::Frames(1));
    assert_eq!(
        h.dispatcher.play(&g("1"), CH, y5).await.unwrap(),
        "Queued y5 at position 1"
    );
    assert!(wait_until(|| h.frames("1").len() == 3 && idle(&h, "1")).await);
    assert_eq!(
        h.frames("1"),
        [("x4".to_string(), 0), ("x4".to_string(), 1), ("y5".to_string(), 0)]
    );
    assert!(h.status("1").unwrap().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn failures_from_a_drained_queue_do_not_count_against_new_requests() {
    let mut h = Harness::new(test_config());
    let f1 = h.track("f1", Script::FailOpen(FetchReason::NotFound));
    let f2 = h.track("f2", Script::FailOpen(FetchReason::NotFound));
    h.dispatcher.play(&g("1"), CH, f1).await.unwrap();
    h.dispatcher.play(&g("1"), CH, f2).await.unwrap();

    assert!(wait_until(|| h.source.opens("f2") == 1 && idle(&h, "1")).await);
    let status = h.status("1").unwrap();
    assert!(status.error.is_none());
    assert_eq!(status.consecutive_failures, 0);

    tokio::time::sleep(Duration::from_secs(10)).await;

    let f3 = h.track("f3", Script::FailOpen(FetchReason::NotFound));
    let ok = h.track("ok", Script::Frames(1));
    h.dispatcher.play(&g("1"), CH, f3).await.unwrap();
    h.dispatcher.play(&g("1"), CH, ok).await.unwrap();

    assert!(wait_until(|| h.frame_count("1", "ok") == 1 && idle(&h, "1")).await);
    assert!(h.status("1").unwrap().error.is_none());
    assert!(
        !h.events()
            .iter()
            .any(|e| matches!(e, EngineEvent::PlaybackHalted { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn delivered_frames_reset_the_failure_count() {
    let h = Harness::new(test_config());
    let tracks = [
        h.track("f1", Script::FailOpen(FetchReason::Unsupported)),
        h.track("f2", Script::FailOpen(FetchReason::Unsupported)),
        h.track("ok", Script::Frames(2)),
        h.track("f3", Script::FailOpen(FetchReason::Unsupported)),
        h.track("last", Script::Frames(1)),
    ];
    for track in tracks {
        h.dispatcher.play(&g("1"), CH, track).await.unwrap();
    }

    assert!(wait_until(|| h.frame_count("1", "last") == 1 && idle(&h, "1")).await);
    let status = h.status("1").unwrap();
    assert!(status.error.is_none());
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn transport_error_reconnects_and_resumes_from_the_cursor() {
    let mut h = Harness::new(test_config());
    let a = h.track("a", Script::Frames(40));
    let b = h.track("b", Script::Frames(1));
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    h.dispatcher.play(&g("1"), CH, b).await.unwrap();

    assert!(wait_until(|| h.frame_count("1", "a") >= 5).await);
    h.transport.fail_next_sends("1", 1);

    assert!(wait_until(|| h.frame_count("1", "b") == 1).await);
    assert_eq!(seqs_of(&h.frames("1"), "a"), (0..40).collect::<Vec<_>>());
    assert_eq!(h.transport.connects("1"), 2);
    assert_eq!(h.source.opens("a"), 1);

    let voice: Vec<VoiceConnectionState> = h
        .events()
        .iter()
        .filter_map(|e| match e {
            EngineEvent::VoiceStateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        voice,
        [
            VoiceConnectionState::Connecting,
            VoiceConnectionState::Connected,
            VoiceConnectionState::Reconnecting,
            VoiceConnectionState::Connected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnects_go_idle_with_an_error() {
    let h = Harness::new(test_config());
    let a = h.track("a", Script::Forever);
    let b = h.track("b", Script::Frames(1));
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    h.dispatcher.play(&g("1"), CH, b).await.unwrap();

    assert!(wait_until(|| h.frame_count("1", "a") >= 3).await);
    h.transport.refuse_connects("1", u32::MAX);
    h.transport.fail_next_sends("1", 1);

    assert!(
        wait_until(|| h
            .status("1")
            .is_some_and(|s| s.voice == VoiceConnectionState::Failed))
        .await
    );
    let status = h.status("1").unwrap();
    assert_eq!(status.state, PlaybackState::Idle);
    assert!(status.error.unwrap().contains("voice connection lost"));
    assert!(h.source.closed("a"));
    // one initial connect plus every reconnect attempt
    assert_eq!(h.transport.connects("1"), 1 + 3);

    let queued = h.dispatcher.queue_list(&g("1")).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].title(), "b");

    // a dead voice link does not keep the session alive past the idle timeout
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.registry.reap_idle().await, 1);
}

#[tokio::test(start_paused = true)]
async fn halted_session_keeps_its_queue_past_the_idle_timeout() {
    let h = Harness::with_open_delay(test_config(), Duration::from_millis(100));
    let tracks = [
        h.track("f1", Script::FailOpen(FetchReason::NotFound)),
        h.track("f2", Script::FailOpen(FetchReason::NotFound)),
        h.track("f3", Script::FailOpen(FetchReason::NotFound)),
        h.track("x4", Script::Frames(1)),
    ];
    for track in tracks {
        h.dispatcher.play(&g("1"), CH, track).await.unwrap();
    }
    assert!(wait_until(|| h.status("1").is_some_and(|s| s.error.is_some())).await);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.registry.reap_idle().await, 0);
    assert_eq!(h.status("1").unwrap().queue_len, 1);
}

#[tokio::test(start_paused = true)]
async fn transport_reported_drop_reconnects_and_ignores_stale_reports() {
    let h = Harness::new(test_config());
    let a = h.track("a", Script::Forever);
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    assert!(wait_until(|| h.frame_count("1", "a") >= 2).await);

    let first = h.transport.sinks("1").remove(0);
    assert!(first.notify(VoiceConnectionState::Disconnected));
    assert!(wait_until(|| h.transport.connects("1") == 2
        && h.status("1").unwrap().voice == VoiceConnectionState::Connected)
    .await);

    // the first connection is gone; its reports no longer count
    first.notify(VoiceConnectionState::Failed);
    let before = h.frame_count("1", "a");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.status("1").unwrap().voice, VoiceConnectionState::Connected);
    assert_eq!(h.transport.connects("1"), 2);
    assert!(h.frame_count("1", "a") > before);
    assert_eq!(
        seqs_of(&h.frames("1"), "a"),
        (0..h.frame_count("1", "a") as u32).collect::<Vec<_>>()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_or_create_returns_one_session() {
    let h = Harness::new(test_config());
    let registry = h.registry.clone();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_or_create(&g("race")).id() })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(registry.len(), 1);

    registry.shutdown_all().await;
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn guilds_play_independently() {
    let h = Harness::new(test_config());
    let a = h.track("a", Script::Forever);
    let b = h.track("b", Script::Frames(5));
    let c = h.track("c", Script::Frames(5));
    let d = h.track("d", Script::Frames(20));

    for track in [a, b, c] {
        h.dispatcher.play(&g("1"), CH, track).await.unwrap();
    }
    h.dispatcher.play(&g("2"), ChannelId(2), d).await.unwrap();

    assert!(wait_until(|| h.frame_count("1", "a") >= 3).await);
    h.dispatcher.skip(&g("1")).await.unwrap();

    assert!(wait_until(|| idle(&h, "1") && idle(&h, "2") && h.frame_count("1", "c") == 5).await);

    let g1 = h.frames("1");
    assert!(g1.iter().all(|(n, _)| n != "d"));
    assert_eq!(seqs_of(&g1, "b"), (0..5).collect::<Vec<_>>());
    assert_eq!(seqs_of(&g1, "c"), (0..5).collect::<Vec<_>>());

    let g2 = h.frames("2");
    assert_eq!(g2.len(), 20);
    assert_eq!(seqs_of(&g2, "d"), (0..20).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_are_reaped_after_the_timeout() {
    let mut config = test_config();
    config.idle_timeout_secs = 2;
    let mut h = Harness::new(config);
    let a = h.track("a", Script::Frames(2));
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    assert!(wait_until(|| h.frame_count("1", "a") == 2 && idle(&h, "1")).await);

    let cancel = tokio_util::sync::CancellationToken::new();
    let reaper = h.registry.spawn_reaper(cancel.clone());

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert!(h.registry.get(&g("1")).is_some());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(h.registry.get(&g("1")).is_none());
    assert!(h.registry.is_empty());
    assert!(h.events().iter().any(|e| matches!(
        e,
        EngineEvent::SessionClosed {
            reason: CloseReason::Idle,
            ..
        }
    )));

    cancel.cancel();
    reaper.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn busy_sessions_are_not_reaped() {
    let mut config = test_config();
    config.idle_timeout_secs = 1;
    let h = Harness::new(config);
    let a = h.track("a", Script::Forever);
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.registry.reap_idle().await, 0);
    assert!(h.registry.get(&g("1")).is_some());
}

#[tokio::test(start_paused = true)]
async fn stop_clears_everything_and_is_reaped_on_the_next_sweep() {
    let h = Harness::new(test_config());
    let a = h.track("a", Script::Forever);
    let b = h.track("b", Script::Forever);
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    h.dispatcher.play(&g("1"), CH, b).await.unwrap();
    assert!(wait_until(|| h.frame_count("1", "a") >= 2).await);

    h.dispatcher.stop(&g("1")).await.unwrap();
    assert!(h.source.closed("a"));
    assert!(h.dispatcher.queue_list(&g("1")).await.unwrap().is_empty());
    assert_eq!(
        h.dispatcher.now_playing(&g("1")).await,
        Err(CommandRejection::NothingPlaying)
    );
    assert_eq!(h.status("1").unwrap().state, PlaybackState::Idle);

    assert_eq!(h.registry.reap_idle().await, 1);
    assert!(h.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn leave_closes_the_session_and_a_new_play_starts_fresh() {
    let h = Harness::new(test_config());
    let a = h.track("a", Script::Forever);
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    assert!(wait_until(|| h.frame_count("1", "a") >= 1).await);
    let first = h.registry.get(&g("1")).unwrap().id();

    assert_eq!(
        h.dispatcher.leave(&g("1")).await.unwrap(),
        "Left the voice channel"
    );
    assert!(h.source.closed("a"));
    assert!(h.registry.get(&g("1")).is_none());
    assert_eq!(
        h.dispatcher.skip(&g("1")).await,
        Err(CommandRejection::SessionNotFound)
    );

    let b = h.track("b", Script::Frames(1));
    h.dispatcher.play(&g("1"), CH, b).await.unwrap();
    assert_ne!(h.registry.get(&g("1")).unwrap().id(), first);
}

#[tokio::test(start_paused = true)]
async fn dispatcher_rejects_invalid_actions() {
    let h = Harness::new(test_config());

    assert_eq!(
        h.dispatcher.skip(&g("none")).await,
        Err(CommandRejection::SessionNotFound)
    );
    assert_eq!(
        h.dispatcher.leave(&g("none")).await,
        Err(CommandRejection::SessionNotFound)
    );
    assert_eq!(
        h.dispatcher
            .play(&g("1"), CH, guildbeat::player::Track::new(" ", "", None))
            .await,
        Err(CommandRejection::EmptySource)
    );

    assert_eq!(h.dispatcher.join(&g("1"), CH).await.unwrap(), "Joined channel 1");
    assert_eq!(
        h.dispatcher.join(&g("1"), CH).await.unwrap(),
        "Already connected to channel 1"
    );
    assert_eq!(
        h.dispatcher.pause(&g("1")).await,
        Err(CommandRejection::NothingPlaying)
    );
    assert_eq!(
        h.dispatcher.set_volume(&g("1"), 250).await,
        Err(CommandRejection::VolumeOutOfRange {
            requested: 250,
            max: 200
        })
    );
    assert_eq!(
        h.dispatcher.set_volume(&g("1"), 80).await,
        Err(CommandRejection::NothingPlaying)
    );

    let a = h.track("a", Script::Forever);
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    assert_eq!(
        h.dispatcher.join(&g("1"), ChannelId(2)).await,
        Err(CommandRejection::Busy(CH))
    );

    assert_eq!(
        h.dispatcher.set_volume(&g("1"), 80).await.unwrap(),
        "Volume set to 80%"
    );
    assert_eq!(h.dispatcher.now_playing(&g("1")).await.unwrap().volume, 80);

    h.transport.refuse_connects("2", 1);
    let b = h.track("b", Script::Forever);
    assert!(matches!(
        h.dispatcher.play(&g("2"), CH, b).await,
        Err(CommandRejection::Connect(_))
    ));
    assert!(h.dispatcher.queue_list(&g("2")).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn idle_session_moves_to_another_channel() {
    let h = Harness::new(test_config());
    h.dispatcher.join(&g("1"), CH).await.unwrap();
    assert_eq!(
        h.dispatcher.join(&g("1"), ChannelId(9)).await.unwrap(),
        "Moved from channel 1 to 9"
    );
    assert_eq!(h.status("1").unwrap().channel_id, Some(ChannelId(9)));
}

#[tokio::test(start_paused = true)]
async fn skip_interrupts_a_stalled_pull() {
    let mut config = test_config();
    config.frame_timeout_ms = 10_000;
    let h = Harness::new(config);
    let a = h.track("a", Script::StallAfter(2));
    let b = h.track("b", Script::Frames(3));
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    h.dispatcher.play(&g("1"), CH, b).await.unwrap();

    assert!(wait_until(|| h.frame_count("1", "a") == 2).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    h.dispatcher.skip(&g("1")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(h.source.closed("a"));

    assert!(wait_until(|| h.frame_count("1", "b") == 3).await);
}

#[tokio::test(start_paused = true)]
async fn stalled_track_ends_and_the_next_one_plays() {
    let mut h = Harness::new(test_config());
    let a = h.track("a", Script::StallAfter(2));
    let b = h.track("b", Script::Frames(3));
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    h.dispatcher.play(&g("1"), CH, b).await.unwrap();

    assert!(wait_until(|| h.frame_count("1", "b") == 3 && idle(&h, "1")).await);
    assert_eq!(seqs_of(&h.frames("1"), "a"), [0, 1]);
    assert!(h.events().iter().any(|e| matches!(
        e,
        EngineEvent::TrackEnd {
            reason: TrackEndReason::Stalled,
            frames_sent: 2,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn decode_error_skips_to_the_next_track() {
    let mut h = Harness::new(test_config());
    let a = h.track("a", Script::DecodeErrorAfter(3));
    let b = h.track("b", Script::Frames(2));
    h.dispatcher.play(&g("1"), CH, a).await.unwrap();
    h.dispatcher.play(&g("1"), CH, b).await.unwrap();

    assert!(wait_until(|| h.frame_count("1", "b") == 2 && idle(&h, "1")).await);
    assert_eq!(seqs_of(&h.frames("1"), "a"), [0, 1, 2]);
    assert!(h.status("1").unwrap().error.is_none());
    assert!(h.events().iter().any(|e| matches!(
        e,
        EngineEvent::TrackException {
            severity: Severity::Fault,
            ..
        }
    )));
}
