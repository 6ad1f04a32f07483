//! Halting on end-of-source and read errors, and recovery through seeks.

use slipstream_core::demux::{CursorPosition, PacketDemuxer};
use slipstream_core::source::{MediaTime, PacketIndex, StreamId, TimeBase, TimestampKind};
use slipstream_sim::{SimulatedPacketSource, StreamSpec};

use crate::support::{demux_config, init_test_tracing, wait_until};

const STREAM: StreamId = StreamId(0);

#[tokio::test]
async fn test_end_of_source_halts_and_steps_clamp() {
    init_test_tracing();

    let source = SimulatedPacketSource::builder()
        .stream(StreamSpec::audio(TimeBase::new(1, 10), 30))
        .build();
    let demuxer = PacketDemuxer::new(Box::new(source), demux_config(64, 8))
        .await
        .unwrap();

    wait_until("pump to halt at end of source", || demuxer.is_halted()).await;
    assert_eq!(
        demuxer.window(STREAM),
        Some((PacketIndex::new(0), PacketIndex::new(29)))
    );

    // A step far past the end comes back clamped, not blocked
    let landed = demuxer
        .step(STREAM, CursorPosition::Index(PacketIndex::new(10)), 1000)
        .await;
    assert_eq!(landed, CursorPosition::Index(PacketIndex::new(29)));
    assert_eq!(demuxer.stats().halts, 1);

    demuxer.shutdown().await;
}

#[tokio::test]
async fn test_read_failure_halts_and_seek_recovers() {
    init_test_tracing();

    let source = SimulatedPacketSource::builder()
        .stream(StreamSpec::video(TimeBase::new(1, 10), 100))
        .fail_read_after(20)
        .build();
    let demuxer = PacketDemuxer::new(Box::new(source), demux_config(256, 8))
        .await
        .unwrap();

    wait_until("pump to halt on the injected read error", || {
        demuxer.is_halted()
    })
    .await;
    assert_eq!(
        demuxer.window(STREAM),
        Some((PacketIndex::new(0), PacketIndex::new(19)))
    );

    // Past-window seek forces a real source seek, which clears the halt
    let landed = demuxer
        .seek(STREAM, MediaTime::new(5, 1), TimestampKind::Decode)
        .await
        .unwrap();
    assert_eq!(landed, CursorPosition::Index(PacketIndex::new(0)));

    let packet = demuxer.get(STREAM, landed).unwrap();
    assert_eq!(packet.dts, Some(48));
    assert!(packet.flags.keyframe);

    let stats = demuxer.stats();
    assert!(stats.halts >= 1);
    assert!(stats.source_seeks >= 1);

    demuxer.shutdown().await;
}
