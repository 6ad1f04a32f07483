//! Seek semantics across the fast paths and real source seeks.

use std::sync::atomic::Ordering;

use slipstream_core::demux::{CursorPosition, PacketDemuxer};
use slipstream_core::source::{MediaTime, StreamId, TimeBase, TimestampKind};
use slipstream_sim::{SimulatedPacketSource, StreamSpec};

use crate::support::{demux_config, init_test_tracing};

const STREAM: StreamId = StreamId(0);

fn storm_source() -> SimulatedPacketSource {
    // 300 packets at 30 ticks/s, keyframe every 10th
    let mut spec = StreamSpec::video(TimeBase::new(1, 30), 300);
    spec.keyframe_interval = 10;
    SimulatedPacketSource::builder().stream(spec).build()
}

#[tokio::test]
async fn test_seek_storm_always_lands_at_or_before() {
    init_test_tracing();

    let demuxer = PacketDemuxer::new(Box::new(storm_source()), demux_config(64, 8))
        .await
        .unwrap();

    for (value, timescale) in [(25, 10), (7, 10), (99, 10), (0, 1), (42, 10), (42, 10)] {
        let time = MediaTime::new(value, timescale);
        let landed = demuxer
            .seek(STREAM, time, TimestampKind::Decode)
            .await
            .unwrap();
        let packet = demuxer
            .get(STREAM, landed)
            .unwrap_or_else(|| panic!("no packet at {landed} after seek to {time}"));
        let seconds = TimeBase::new(1, 30).ticks_to_seconds(packet.dts.unwrap());
        assert!(
            seconds <= time.seconds(),
            "seek to {time} landed at {seconds}s"
        );
    }

    let stats = demuxer.stats();
    assert!(stats.source_seeks >= 1);
    demuxer.shutdown().await;
}

#[tokio::test]
async fn test_seek_to_infinity_is_constant_time() {
    init_test_tracing();

    let demuxer = PacketDemuxer::new(Box::new(storm_source()), demux_config(64, 8))
        .await
        .unwrap();

    let landed = demuxer
        .seek(STREAM, MediaTime::POSITIVE_INFINITY, TimestampKind::Presentation)
        .await
        .unwrap();
    assert_eq!(landed, CursorPosition::Last);

    let last = demuxer.get(STREAM, CursorPosition::Last).unwrap();
    assert_eq!(last.dts, Some(299));

    demuxer.shutdown().await;
}

#[tokio::test]
async fn test_repeated_seek_skips_the_source() {
    init_test_tracing();

    let source = storm_source();
    let seeks = source.seek_counter();
    let demuxer = PacketDemuxer::new(Box::new(source), demux_config(64, 8))
        .await
        .unwrap();
    let baseline = seeks.load(Ordering::SeqCst);

    let time = MediaTime::new(50, 10);
    let first = demuxer
        .seek(STREAM, time, TimestampKind::Decode)
        .await
        .unwrap();
    let second = demuxer
        .seek(STREAM, time, TimestampKind::Decode)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(seeks.load(Ordering::SeqCst), baseline + 1);
    assert_eq!(demuxer.stats().remembered_seek_hits, 1);

    demuxer.shutdown().await;
}
