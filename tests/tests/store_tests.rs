//! Frame store behaviour over fixture directories.

use rstest::rstest;

use frame_feed::{Channel, EndReason, FrameRead, PipelineType, SegmentFrameStore};
use frame_feed_tests::{FrameFixture, timestamps};

#[test]
fn segment_end_is_the_shorter_channel() {
    let fixture = FrameFixture::new();
    fixture.segment(
        0,
        &timestamps(0, 500_000, 9),
        &timestamps(0, 500_000, 8),
    );
    let store = SegmentFrameStore::new(fixture.layout());

    let info = store.describe(0).unwrap();
    assert_eq!(info.end_time_us, 3_500_000);
    assert_eq!(info.pipeline, Some(PipelineType::AudioVideo));
}

#[rstest]
#[case(2, true)]
#[case(3, false)]
fn probing_does_not_open_files(#[case] segment: u32, #[case] exists: bool) {
    let fixture = FrameFixture::new();
    fixture.continuous(3, 1_000_000);
    let store = SegmentFrameStore::new(fixture.layout());

    assert_eq!(store.segment_has_any_channel(segment), exists);
    assert!(!store.is_open(Channel::Audio));
    assert!(!store.is_open(Channel::Video));
}

#[test]
fn reads_every_frame_then_reports_end_of_segment() {
    let fixture = FrameFixture::new().with_frame_size(4);
    fixture.channel(0, Channel::Video, &timestamps(0, 40_000, 3));
    let mut store = SegmentFrameStore::new(fixture.layout());

    let mut seen = Vec::new();
    loop {
        match store.next_frame(Channel::Video) {
            FrameRead::Frame(frame) => {
                assert_eq!(frame.size(), 4);
                seen.push(frame.timestamp_us);
            }
            FrameRead::EndOfSegment(reason) => {
                assert_eq!(reason, EndReason::Exhausted);
                break;
            }
            FrameRead::NotOpen => panic!("video must be readable"),
        }
    }
    assert_eq!(seen, vec![0, 40_000, 80_000]);
    assert_eq!(store.next_frame(Channel::Audio), FrameRead::NotOpen);
}

#[test]
fn truncated_data_file_ends_segment_early() {
    let fixture = FrameFixture::new();
    fixture.raw(0, Channel::Audio, "0,4,20000,4,40000,4,", b"aaaabbbbcc");
    let mut store = SegmentFrameStore::new(fixture.layout());

    assert!(matches!(store.next_frame(Channel::Audio), FrameRead::Frame(_)));
    assert!(matches!(store.next_frame(Channel::Audio), FrameRead::Frame(_)));
    assert_eq!(
        store.next_frame(Channel::Audio),
        FrameRead::EndOfSegment(EndReason::ShortRead)
    );
}

#[test]
fn advancing_closes_previous_segment() {
    let fixture = FrameFixture::new();
    fixture.continuous(2, 1_000_000);
    let mut store = SegmentFrameStore::new(fixture.layout());

    assert!(matches!(store.next_frame(Channel::Audio), FrameRead::Frame(_)));
    assert!(store.is_open(Channel::Audio));

    store.advance_to(1);
    assert!(!store.is_open(Channel::Audio));
    match store.next_frame(Channel::Audio) {
        FrameRead::Frame(frame) => assert_eq!(frame.timestamp_us, 1_000_000),
        other => panic!("expected first frame of segment 1, got {other:?}"),
    }
}

#[test]
fn oversized_index_record_is_a_short_read() {
    let fixture = FrameFixture::new();
    fixture.raw(0, Channel::Audio, "0,9223372036854775807,", b"aaaa");
    let mut store = SegmentFrameStore::new(fixture.layout());

    assert_eq!(
        store.next_frame(Channel::Audio),
        FrameRead::EndOfSegment(EndReason::ShortRead)
    );
}
