//! Segment scheduler integration tests

mod helpers;

use helpers::{FakeDecoder, RecordingSink, ScriptedFetcher, TS};
use piradio_ap::http::Fetched;
use piradio_ap::playlist::{parse_playlist, Segment};
use piradio_ap::audio::streaming_decoder;
use piradio_ap::scheduler::{BatchOutcome, SegmentScheduler, StreamStop};
use piradio_ap::scratch::ScratchArea;
use piradio_ap::sequence::SequenceTracker;
use piradio_ap::Error;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const BASE: &str = "http://h/live.m3u8";

fn segments(start: i64, uris: &[&str]) -> Vec<Segment> {
    uris.iter()
        .enumerate()
        .map(|(i, uri)| Segment {
            sequence: start + i as i64,
            uri: uri.to_string(),
        })
        .collect()
}

fn tracker_before(start: i64) -> SequenceTracker {
    let playlist = parse_playlist(&format!("#EXT-X-MEDIA-SEQUENCE:{}\na.ts\nb.ts\n", start)).unwrap();
    SequenceTracker::start_at(&playlist)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_plays_in_order_and_records_each_segment() {
    let fetcher = ScriptedFetcher::new();
    fetcher.reply("http://h/a.ts", TS, "a");
    fetcher.reply("http://h/b.ts", TS, "b");
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut scheduler = SegmentScheduler::new(decoder.clone(), sink.clone(), ScratchArea::disabled());
    let mut tracker = tracker_before(4);

    let outcome = scheduler
        .run(
            &fetcher,
            BASE,
            &segments(4, &["a.ts", "b.ts"]),
            &mut tracker,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        BatchOutcome {
            played: 2,
            cancelled: false
        }
    );
    assert_eq!(fetcher.requests(), vec!["http://h/a.ts", "http://h/b.ts"]);
    assert_eq!(decoder.decoded(), vec!["a", "b"]);
    assert_eq!(tracker.last_played(), Some(5));
    assert_eq!(sink.log().frames_written, 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_failure_aborts_remaining_segments() {
    let fetcher = ScriptedFetcher::new();
    fetcher.reply("http://h/a.ts", TS, "a");
    fetcher.fail("http://h/b.ts", "timed out");
    fetcher.reply("http://h/c.ts", TS, "c");
    let decoder = FakeDecoder::new();
    let mut scheduler =
        SegmentScheduler::new(decoder.clone(), RecordingSink::new(), ScratchArea::disabled());
    let mut tracker = tracker_before(1);

    let result = scheduler
        .run(
            &fetcher,
            BASE,
            &segments(1, &["a.ts", "b.ts", "c.ts"]),
            &mut tracker,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(Error::Fetch { .. })));
    assert_eq!(decoder.decoded(), vec!["a"]);
    assert_eq!(tracker.last_played(), Some(1));
    assert!(!fetcher.requests().contains(&"http://h/c.ts".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sink_failure_is_surfaced() {
    let fetcher = ScriptedFetcher::new();
    fetcher.reply("http://h/a.ts", TS, "a");
    let mut scheduler =
        SegmentScheduler::new(FakeDecoder::new(), RecordingSink::failing(), ScratchArea::disabled());
    let mut tracker = tracker_before(1);

    let result = scheduler
        .run(
            &fetcher,
            BASE,
            &segments(1, &["a.ts"]),
            &mut tracker,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(Error::Sink(_))));
    assert_eq!(tracker.last_played(), Some(0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_batch_starts_nothing() {
    let fetcher = ScriptedFetcher::new();
    fetcher.reply("http://h/a.ts", TS, "a");
    let mut scheduler =
        SegmentScheduler::new(FakeDecoder::new(), RecordingSink::new(), ScratchArea::disabled());
    let mut tracker = tracker_before(1);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = scheduler
        .run(&fetcher, BASE, &segments(1, &["a.ts"]), &mut tracker, &cancel)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.played, 0);
    assert!(fetcher.requests().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sink_reconfigured_only_on_format_change() {
    let fetcher = ScriptedFetcher::new();
    fetcher.reply("http://h/a.ts", TS, "a");
    fetcher.reply("http://h/b.ts", TS, "b");
    fetcher.reply("http://h/c.ts", TS, "mono c");
    let sink = RecordingSink::new();
    let mut scheduler =
        SegmentScheduler::new(FakeDecoder::new(), sink.clone(), ScratchArea::disabled());
    let mut tracker = tracker_before(1);

    scheduler
        .run(
            &fetcher,
            BASE,
            &segments(1, &["a.ts", "b.ts", "c.ts"]),
            &mut tracker,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(sink.log().configured, vec![(44100, 2), (22050, 1)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_segment_and_pcm_are_staged() {
    let temp = TempDir::new().unwrap();
    let scratch = ScratchArea::new(temp.path());
    scratch.prepare().unwrap();
    let mut scheduler = SegmentScheduler::new(FakeDecoder::new(), RecordingSink::new(), scratch);

    let fetched = Fetched {
        url: "http://h/clip.ts".to_string(),
        media_type: TS.to_string(),
        body: bytes::Bytes::from_static(b"clip"),
    };
    scheduler.play_unsequenced(&fetched).unwrap();

    assert_eq!(std::fs::read(temp.path().join("piradio.ts")).unwrap(), b"clip");
    // Eight f32 samples
    let pcm = std::fs::read(temp.path().join("piradio.pcm")).unwrap();
    assert_eq!(pcm.len(), 8 * 4);
}

#[test]
fn test_stream_without_data_ends_without_configuring() {
    let sink = RecordingSink::new();
    let mut scheduler = SegmentScheduler::new(FakeDecoder::new(), sink.clone(), ScratchArea::disabled());
    let (feeder, mut stream) = streaming_decoder();
    drop(feeder);

    let stopped = scheduler
        .play_stream(&mut stream, &CancellationToken::new())
        .unwrap();

    assert_eq!(stopped, StreamStop::Ended);
    let log = sink.log();
    assert!(log.configured.is_empty());
    assert_eq!(log.writes, 0);
}

#[test]
fn test_cancelled_stream_stops_before_reading() {
    let sink = RecordingSink::new();
    let mut scheduler = SegmentScheduler::new(FakeDecoder::new(), sink.clone(), ScratchArea::disabled());
    // Feeder stays alive: reading would block
    let (_feeder, mut stream) = streaming_decoder();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stopped = scheduler.play_stream(&mut stream, &cancel).unwrap();

    assert_eq!(stopped, StreamStop::Cancelled);
    assert!(sink.log().configured.is_empty());
}
