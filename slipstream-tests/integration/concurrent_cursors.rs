//! Multiple cursors walking the same demuxer concurrently.

use std::sync::Arc;

use slipstream_core::demux::{CursorPosition, PacketDemuxer};
use slipstream_core::source::{StreamId, TimeBase};
use slipstream_sim::{SimulatedPacketSource, StreamSpec};

use crate::support::{demux_config, init_test_tracing, wait_until};

/// Walks a stream packet by packet until the cursor stops advancing,
/// collecting the decode timestamps it observed.
async fn walk_stream(demuxer: Arc<PacketDemuxer>, stream: StreamId) -> Vec<i64> {
    let mut observed = Vec::new();
    let mut position = CursorPosition::Index(slipstream_core::PacketIndex::new(0));
    loop {
        let packet = demuxer
            .get(stream, position)
            .unwrap_or_else(|| panic!("cursor at {position} on stream {stream} found no packet"));
        assert_eq!(packet.stream, stream);
        observed.push(packet.dts.unwrap());

        let next = demuxer.step(stream, position, 1).await;
        if next == position {
            return observed;
        }
        position = next;
    }
}

#[tokio::test]
async fn test_concurrent_cursors_each_see_the_full_stream_in_order() {
    init_test_tracing();

    let source = SimulatedPacketSource::builder()
        .stream(StreamSpec::video(TimeBase::new(1, 24), 48))
        .stream(StreamSpec::audio(TimeBase::new(1, 48), 96))
        .build();
    // Rings large enough that nothing is ever evicted
    let demuxer = Arc::new(
        PacketDemuxer::new(Box::new(source), demux_config(256, 8))
            .await
            .unwrap(),
    );

    let video = StreamId::new(0);
    let audio = StreamId::new(1);
    wait_until("both streams to buffer", || {
        demuxer.window(video).is_some() && demuxer.window(audio).is_some()
    })
    .await;

    let mut walkers = Vec::new();
    for _ in 0..2 {
        walkers.push(tokio::spawn(walk_stream(Arc::clone(&demuxer), video)));
        walkers.push(tokio::spawn(walk_stream(Arc::clone(&demuxer), audio)));
    }

    let mut results = Vec::new();
    for walker in walkers {
        results.push(walker.await.unwrap());
    }

    let expected_video: Vec<i64> = (0..48).collect();
    let expected_audio: Vec<i64> = (0..96).collect();
    assert_eq!(results[0], expected_video);
    assert_eq!(results[1], expected_audio);
    assert_eq!(results[2], expected_video);
    assert_eq!(results[3], expected_audio);

    assert_eq!(demuxer.stats().packets_routed, 144);
    demuxer.shutdown().await;
}
