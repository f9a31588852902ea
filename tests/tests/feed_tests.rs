//! End-to-end coordinator tests.
//!
//! Every test spawns a real `FrameFeed` over a temporary frame-file directory and a
//! recording sink, on a paused tokio clock so the millisecond cadences of
//! `FeedSettings::fast()` play out deterministically.

use std::time::Duration;

use rstest::rstest;

use frame_feed::{
    AdvanceReason, Channel, EndReason, ExhaustionPolicy, FeedError, FeedEvent, FeedSettings, FeederState,
    FrameFeed, PipelineType, TransitionState,
};
use frame_feed_tests::{FrameFixture, RecordingSink, collect_until, init_tracing, timestamps, wait_for};

fn spawn_with_sink(fixture: &FrameFixture, settings: FeedSettings, sink: &RecordingSink) -> FrameFeed {
    FrameFeed::spawn(fixture.layout(), settings, sink.clone(), sink.oracle()).expect("spawn feed")
}

#[tokio::test(start_paused = true)]
async fn advances_to_next_segment_with_rebased_timestamps() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture
        .segment(0, &timestamps(0, 500_000, 9), &timestamps(0, 500_000, 8))
        .segment(
            1,
            &timestamps(4_000_000, 500_000, 9),
            &timestamps(4_000_000, 500_000, 8),
        );
    let sink = RecordingSink::new();
    let feed = spawn_with_sink(&fixture, FeedSettings::new().fast(), &sink);
    let mut events = feed.subscribe();

    let seen = collect_until(&mut events, |e| {
        matches!(e, FeedEvent::SeekCompleted { segment: 1, .. })
    })
    .await;
    assert_eq!(
        seen.first(),
        Some(&FeedEvent::Configured {
            pipeline: PipelineType::AudioVideo
        })
    );
    assert!(seen.contains(&FeedEvent::SeekStarted {
        from: 0,
        to: 1,
        reason: AdvanceReason::ReachedEnd
    }));
    assert_eq!(
        seen.last(),
        Some(&FeedEvent::SeekCompleted {
            segment: 1,
            start_offset_us: 4_000_000
        })
    );

    let status = feed.status().await.unwrap();
    assert_eq!(status.segment, 1);
    assert_eq!(status.offset_us, 4_000_000);
    assert_eq!(status.end_time_us, 7_500_000);

    // Wait for segment 1 to be left as well, then look at what it delivered.
    wait_for(&mut events, |e| matches!(e, FeedEvent::SeekStarted { from: 1, .. })).await;
    let log = sink.log();
    let segment_one = log.epoch(1);
    assert!(!segment_one.is_empty());
    assert!(segment_one
        .iter()
        .all(|f| (0..=4_000_000).contains(&f.timestamp_us)));
    for channel in Channel::ALL {
        let first = segment_one.iter().find(|f| f.channel == channel).unwrap();
        assert_eq!(first.timestamp_us, 0, "{channel} should restart at zero");
    }
    drop(log);

    feed.shutdown().await.unwrap();
}

#[rstest]
#[case(1)]
#[case(3)]
#[tokio::test(start_paused = true)]
async fn exhaustion_loops_back_to_segment_zero(#[case] segments: u32) {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.continuous(segments, 1_000_000);
    let sink = RecordingSink::new();
    let feed = spawn_with_sink(&fixture, FeedSettings::new().fast(), &sink);
    let mut events = feed.subscribe();

    let seen = collect_until(&mut events, |e| matches!(e, FeedEvent::PlaybackRestarted)).await;
    let last = segments - 1;
    assert!(seen.contains(&FeedEvent::StreamComplete { last_segment: last }));
    assert!(seen
        .iter()
        .any(|e| matches!(e, FeedEvent::SeekStarted { from, to: 0, .. } if *from == last)));
    assert!(!seen.contains(&FeedEvent::EndOfStream));

    let completed = wait_for(&mut events, |e| matches!(e, FeedEvent::SeekCompleted { .. })).await;
    assert_eq!(
        completed,
        FeedEvent::SeekCompleted {
            segment: 0,
            start_offset_us: 0
        }
    );
    let status = feed.status().await.unwrap();
    assert_eq!(status.segment, 0);
    assert_eq!(status.state, TransitionState::Playing);

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_policy_ends_stream_once_downstream_drains() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.continuous(2, 1_000_000);
    let sink = RecordingSink::new().answering_eos();
    let settings = FeedSettings::new()
        .fast()
        .exhaustion_policy(ExhaustionPolicy::Stop);
    let feed = spawn_with_sink(&fixture, settings, &sink);
    let mut events = feed.subscribe();

    let seen = collect_until(&mut events, |e| matches!(e, FeedEvent::EndOfStream)).await;
    assert!(seen.contains(&FeedEvent::StreamComplete { last_segment: 1 }));
    assert!(!seen.contains(&FeedEvent::PlaybackRestarted));

    tokio::time::timeout(Duration::from_secs(1), feed.join())
        .await
        .expect("worker exits after end of stream")
        .unwrap();
    assert_eq!(sink.log().eos_requests, vec![Channel::Audio, Channel::Video]);
}

#[tokio::test(start_paused = true)]
async fn stop_policy_waits_for_every_channel() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.continuous(1, 1_000_000);
    let sink = RecordingSink::new();
    let settings = FeedSettings::new()
        .fast()
        .exhaustion_policy(ExhaustionPolicy::Stop);
    let feed = spawn_with_sink(&fixture, settings, &sink);
    let mut events = feed.subscribe();

    wait_for(&mut events, |e| matches!(e, FeedEvent::StreamComplete { .. })).await;
    let status = feed.status().await.unwrap();
    assert_eq!(status.state, TransitionState::Completed);
    assert_eq!(status.feeders[Channel::Audio], FeederState::Idle);
    assert_eq!(status.feeders[Channel::Video], FeederState::Idle);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!feed.is_finished());

    let signaller = feed.signaller();
    signaller.end_of_stream(Channel::Audio).unwrap();
    signaller.end_of_stream(Channel::Audio).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!feed.is_finished());

    signaller.end_of_stream(Channel::Video).unwrap();
    wait_for(&mut events, |e| matches!(e, FeedEvent::EndOfStream)).await;
    tokio::time::timeout(Duration::from_secs(1), feed.join())
        .await
        .expect("worker exits after end of stream")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn stalled_position_forces_transition_before_end_time() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.continuous(2, 5_000_000);
    let sink = RecordingSink::new();
    let feed = FrameFeed::spawn(
        fixture.layout(),
        FeedSettings::new().fast(),
        sink.clone(),
        || Some(3_600_000_i64),
    )
    .unwrap();
    let mut events = feed.subscribe();

    let started = wait_for(&mut events, |e| matches!(e, FeedEvent::SeekStarted { .. })).await;
    assert_eq!(
        started,
        FeedEvent::SeekStarted {
            from: 0,
            to: 1,
            reason: AdvanceReason::Stalled
        }
    );

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn playback_start_is_detected_and_pause_toggles() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.segment(0, &[0, 60_000_000], &[0, 60_000_000]);
    let sink = RecordingSink::new();
    let mut position: i64 = 0;
    let feed = FrameFeed::spawn(fixture.layout(), FeedSettings::new().fast(), sink.clone(), move || {
        position += 50_000;
        Some(position)
    })
    .unwrap();
    let mut events = feed.subscribe();

    let seen = collect_until(&mut events, |e| matches!(e, FeedEvent::PlaybackStarted { .. })).await;
    assert_eq!(seen.last(), Some(&FeedEvent::PlaybackStarted { segment: 0 }));
    assert!(feed.status().await.unwrap().playback_started);

    feed.toggle_pause().await.unwrap();
    wait_for(&mut events, |e| matches!(e, FeedEvent::Paused)).await;
    assert!(!feed.status().await.unwrap().playing);
    assert!(!sink.log().is_playing());

    feed.toggle_pause().await.unwrap();
    wait_for(&mut events, |e| matches!(e, FeedEvent::Resumed)).await;
    assert!(feed.status().await.unwrap().playing);
    assert!(sink.log().is_playing());

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn enough_data_stops_delivery_until_more_is_requested() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.segment(
        0,
        &timestamps(0, 100_000, 400),
        &timestamps(0, 40_000, 1000),
    );
    let sink = RecordingSink::new();
    let feed = FrameFeed::spawn(fixture.layout(), FeedSettings::new().fast(), sink.clone(), || None::<i64>)
        .unwrap();
    let mut events = feed.subscribe();
    wait_for(&mut events, |e| matches!(e, FeedEvent::Configured { .. })).await;

    let signaller = feed.signaller();
    signaller.enough_data(Channel::Video).unwrap();
    let status = feed.status().await.unwrap();
    assert_eq!(status.feeders[Channel::Video], FeederState::Idle);
    assert_eq!(status.feeders[Channel::Audio], FeederState::Reading);
    assert_eq!(
        status.delivered[Channel::Video] as usize,
        sink.log().count(Channel::Video)
    );

    let video_before = sink.log().count(Channel::Video);
    let audio_before = sink.log().count(Channel::Audio);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.log().count(Channel::Video), video_before);
    assert!(sink.log().count(Channel::Audio) > audio_before);

    signaller.need_data(Channel::Video).unwrap();
    signaller.need_data(Channel::Video).unwrap();
    assert_eq!(
        feed.status().await.unwrap().feeders[Channel::Video],
        FeederState::Reading
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    let delivered = sink.log().count(Channel::Video) - video_before;
    // One timer at 2ms cadence: a second need-data must not double the rate.
    assert!((5..=10).contains(&delivered), "delivered {delivered} video frames");

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn suspend_tears_down_and_resume_restarts_at_segment_zero() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.continuous(3, 1_000_000);
    let sink = RecordingSink::new();
    let feed = spawn_with_sink(&fixture, FeedSettings::new().fast(), &sink);
    let mut events = feed.subscribe();

    wait_for(&mut events, |e| matches!(e, FeedEvent::SeekCompleted { segment: 1, .. })).await;

    feed.suspend().await.unwrap();
    wait_for(&mut events, |e| matches!(e, FeedEvent::Suspended)).await;
    feed.suspend().await.unwrap();
    let status = feed.status().await.unwrap();
    assert!(!status.active);
    assert_eq!(status.feeders[Channel::Audio], FeederState::Idle);
    assert_eq!(status.feeders[Channel::Video], FeederState::Idle);

    let frames = sink.log().frames.len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.log().frames.len(), frames);

    // Ignored while suspended.
    feed.signaller().need_data(Channel::Audio).unwrap();
    feed.toggle_pause().await.unwrap();
    assert_eq!(feed.status().await.unwrap().feeders[Channel::Audio], FeederState::Idle);

    feed.resume().await.unwrap();
    wait_for(&mut events, |e| matches!(e, FeedEvent::Reactivated)).await;
    wait_for(&mut events, |e| matches!(e, FeedEvent::Configured { .. })).await;
    let status = feed.status().await.unwrap();
    assert!(status.active);
    assert_eq!(status.segment, 0);
    assert_eq!(status.offset_us, 0);
    assert_eq!(sink.log().configured.len(), 2);

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_flush_still_completes_the_transition() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.continuous(2, 1_000_000);
    let sink = RecordingSink::new().failing_flush();
    let feed = spawn_with_sink(&fixture, FeedSettings::new().fast(), &sink);
    let mut events = feed.subscribe();

    wait_for(&mut events, |e| matches!(e, FeedEvent::SeekCompleted { segment: 1, .. })).await;
    assert_eq!(sink.log().flushes(), 1);

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rejected_frames_are_dropped_and_feeding_continues() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.continuous(2, 1_000_000);
    let sink = RecordingSink::new().rejecting(Channel::Audio);
    let feed = spawn_with_sink(&fixture, FeedSettings::new().fast(), &sink);
    let mut events = feed.subscribe();

    wait_for(&mut events, |e| matches!(e, FeedEvent::SeekCompleted { segment: 1, .. })).await;
    let log = sink.log();
    assert_eq!(log.count(Channel::Audio), 0);
    assert!(log.rejected > 0);
    assert!(log.count(Channel::Video) > 0);
    drop(log);

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn pause_before_seek_wraps_the_flush() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.continuous(2, 1_000_000);
    let sink = RecordingSink::new();
    let settings = FeedSettings::new().fast().pause_before_seek(true);
    let feed = spawn_with_sink(&fixture, settings, &sink);
    let mut events = feed.subscribe();

    wait_for(&mut events, |e| matches!(e, FeedEvent::SeekCompleted { segment: 1, .. })).await;
    assert_eq!(sink.log().playing, vec![true, false, true]);

    feed.shutdown().await.unwrap();
}

#[rstest]
#[case(Channel::Audio, PipelineType::AudioOnly)]
#[case(Channel::Video, PipelineType::VideoOnly)]
#[tokio::test(start_paused = true)]
async fn single_channel_segments_feed_only_that_channel(
    #[case] channel: Channel,
    #[case] expected: PipelineType,
) {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.channel(0, channel, &timestamps(0, 40_000, 25));
    let sink = RecordingSink::new();
    let feed = spawn_with_sink(&fixture, FeedSettings::new().fast(), &sink);
    let mut events = feed.subscribe();

    let configured = wait_for(&mut events, |e| matches!(e, FeedEvent::Configured { .. })).await;
    assert_eq!(configured, FeedEvent::Configured { pipeline: expected });
    wait_for(&mut events, |e| matches!(e, FeedEvent::PlaybackRestarted)).await;

    let other = match channel {
        Channel::Audio => Channel::Video,
        Channel::Video => Channel::Audio,
    };
    assert!(sink.log().count(channel) > 0);
    assert_eq!(sink.log().count(other), 0);
    assert_eq!(sink.log().configured, vec![expected]);

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn pipeline_change_reconfigures_the_sink() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture
        .segment(0, &timestamps(0, 100_000, 11), &timestamps(0, 40_000, 25))
        .channel(1, Channel::Audio, &timestamps(1_000_000, 100_000, 11));
    let sink = RecordingSink::new();
    let feed = spawn_with_sink(&fixture, FeedSettings::new().fast(), &sink);
    let mut events = feed.subscribe();

    let seen = collect_until(&mut events, |e| {
        matches!(e, FeedEvent::SeekCompleted { segment: 1, .. })
    })
    .await;
    assert!(seen.contains(&FeedEvent::Configured {
        pipeline: PipelineType::AudioOnly
    }));
    assert_eq!(
        sink.log().configured,
        vec![PipelineType::AudioVideo, PipelineType::AudioOnly]
    );
    assert_eq!(feed.status().await.unwrap().pipeline, PipelineType::AudioOnly);

    feed.shutdown().await.unwrap();
}

#[tokio::test]
async fn spawn_rejects_missing_root_and_empty_directory() {
    let fixture = FrameFixture::new();
    let missing = fixture.root().join("does-not-exist");
    let sink = RecordingSink::new();

    let err = FrameFeed::spawn(
        frame_feed::SegmentLayout::new(&missing),
        FeedSettings::new(),
        sink.clone(),
        || None::<i64>,
    )
    .err()
    .expect("missing root must fail");
    match err {
        FeedError::Context { source, .. } => {
            assert!(matches!(*source, FeedError::MissingRoot(ref p) if *p == missing));
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = FrameFeed::spawn(fixture.layout(), FeedSettings::new(), sink, || None::<i64>)
        .err()
        .expect("empty directory must fail");
    assert!(matches!(err, FeedError::NoSegments(_)));
}

/// Index files promising more frames than their data files hold.
fn truncated_segment(fixture: &FrameFixture, segment: u32) {
    let audio: String = (0..40).map(|i| format!("{},16,", i * 100_000)).collect();
    let video: String = (0..40).map(|i| format!("{},16,", i * 40_000)).collect();
    fixture.raw(segment, Channel::Audio, &audio, &[0u8; 80]);
    fixture.raw(segment, Channel::Video, &video, &[0u8; 80]);
}

#[tokio::test(start_paused = true)]
async fn short_read_drains_channels_and_forces_a_transition() {
    init_tracing();
    let fixture = FrameFixture::new();
    truncated_segment(&fixture, 0);
    fixture.segment(
        1,
        &timestamps(4_000_000, 100_000, 10),
        &timestamps(4_000_000, 40_000, 25),
    );
    let sink = RecordingSink::new();
    let feed = spawn_with_sink(&fixture, FeedSettings::new().fast(), &sink);
    let mut events = feed.subscribe();

    let seen = collect_until(&mut events, |e| matches!(e, FeedEvent::SeekStarted { from: 0, .. })).await;
    for channel in Channel::ALL {
        assert!(
            seen.contains(&FeedEvent::SegmentDrained {
                segment: 0,
                channel,
                reason: EndReason::ShortRead
            }),
            "{channel} should drain with a short read; saw {seen:?}"
        );
    }
    assert_eq!(
        seen.last(),
        Some(&FeedEvent::SeekStarted {
            from: 0,
            to: 1,
            reason: AdvanceReason::Stalled
        })
    );
    assert_eq!(sink.log().count(Channel::Audio), 5);
    assert_eq!(sink.log().count(Channel::Video), 5);

    let status = feed.status().await.unwrap();
    assert_eq!(status.state, TransitionState::SeekFlushing);
    assert_eq!(status.seek_target, Some(1));

    wait_for(&mut events, |e| matches!(e, FeedEvent::SeekCompleted { segment: 1, .. })).await;
    assert_eq!(feed.status().await.unwrap().seek_target, None);

    feed.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn drained_channel_reports_once_per_segment() {
    init_tracing();
    let fixture = FrameFixture::new();
    fixture.channel(0, Channel::Audio, &timestamps(0, 100_000, 3));
    let sink = RecordingSink::new();
    let feed = FrameFeed::spawn(fixture.layout(), FeedSettings::new().fast(), sink.clone(), || None::<i64>)
        .unwrap();
    let mut events = feed.subscribe();

    wait_for(&mut events, |e| {
        matches!(e, FeedEvent::SegmentDrained { channel: Channel::Audio, .. })
    })
    .await;

    let signaller = feed.signaller();
    signaller.need_data(Channel::Audio).unwrap();
    signaller.need_data(Channel::Audio).unwrap();
    let status = feed.status().await.unwrap();
    assert_eq!(status.feeders[Channel::Audio], FeederState::Idle);
    assert_eq!(status.delivered[Channel::Audio], 3);

    tokio::time::sleep(Duration::from_millis(20)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, FeedEvent::SegmentDrained { .. }),
            "drain reported twice: {event:?}"
        );
    }
    assert_eq!(sink.log().count(Channel::Audio), 3);

    feed.shutdown().await.unwrap();
}
