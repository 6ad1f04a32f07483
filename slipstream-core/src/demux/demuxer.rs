//! Consumer-facing packet demuxer facade.
//!
//! [`PacketDemuxer`] owns the per-stream rings, the background pump, and the
//! end-of-stream packet table, and exposes the get/step/seek/stop contract
//! to an arbitrary number of concurrent cursors. One producer (the pump) and
//! many consumers share a single state lock; blocked operations wait on a
//! pure re-evaluate signal and re-check their predicate after every wakeup.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pump::{self, DemuxShared, DemuxState};
use super::ring::PacketRing;
use super::stats::DemuxStats;
use super::{CursorPosition, DemuxError};
use crate::config::SlipstreamConfig;
use crate::source::{
    MediaTime, Packet, PacketIndex, PacketSource, StreamDescriptor, StreamId, TimestampKind,
};

/// Bridges a sequential packet source to randomly accessed cursors.
///
/// Memory stays bounded by the configured per-stream ring capacity no
/// matter how large the source is; random access is approximate in that
/// indices behind the window are permanently gone and indices ahead of it
/// are produced on demand.
pub struct PacketDemuxer {
    shared: Arc<DemuxShared>,
    streams: Vec<StreamDescriptor>,
    /// Final packet of each stream, captured once by the construction-time
    /// pre-scan. Lives for the demuxer's lifetime, unaffected by flushes.
    last_packets: Vec<Option<Arc<Packet>>>,
    pump_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PacketDemuxer {
    /// Creates the demuxer and starts its pump.
    ///
    /// Pre-scans the source once to capture each stream's final packet,
    /// then seeks back to the start and begins filling. A failed pre-scan
    /// is tolerated (end-of-stream queries find nothing); a failed seek
    /// back to the start is not.
    ///
    /// # Errors
    ///
    /// - `DemuxError::SeekFailed` - The source could not be repositioned to
    ///   the start after the pre-scan.
    pub async fn new(
        mut source: Box<dyn PacketSource>,
        config: SlipstreamConfig,
    ) -> Result<Self, DemuxError> {
        let streams = source.streams().to_vec();
        let correction = config.source.byte_offset_correction;

        let mut last_packets: Vec<Option<Arc<Packet>>> = vec![None; streams.len()];
        match source.scan_to_end_collecting_last_packets().await {
            Ok(collected) => {
                for (stream, mut packet) in collected {
                    if correction != 0 {
                        packet.byte_offset = packet
                            .byte_offset
                            .map(|pos| pos.saturating_add_signed(correction));
                    }
                    if let Some(slot) = last_packets.get_mut(stream.as_usize()) {
                        *slot = Some(Arc::new(packet));
                    }
                }
            }
            // Not fatal: seeks to the very end will simply find no packet
            Err(error) => warn!("Failed to collect last packets: {error}"),
        }

        // If we cannot return to the start we cannot demux at all
        source.seek_to(None, MediaTime::ZERO).await?;

        let rings = streams
            .iter()
            .map(|descriptor| {
                let capacity = if descriptor.discard {
                    0
                } else {
                    config.demux.ring_capacity
                };
                PacketRing::new(capacity, descriptor.time_base)
            })
            .collect();

        let shared = Arc::new(DemuxShared {
            state: Mutex::new(DemuxState::new(rings)),
            pump_wake: Notify::new(),
            packet_wake: Notify::new(),
            source: tokio::sync::Mutex::new(source),
            readahead: config.demux.readahead,
            byte_offset_correction: correction,
        });
        let pump_task = tokio::spawn(pump::run(Arc::clone(&shared)));
        info!("Packet demuxer started with {} streams", streams.len());

        Ok(Self {
            shared,
            streams,
            last_packets,
            pump_task: tokio::sync::Mutex::new(Some(pump_task)),
        })
    }

    /// The source's stream table.
    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    /// Looks up a buffered packet. Never blocks.
    ///
    /// [`CursorPosition::Last`] answers from the pre-scanned end-of-stream
    /// table regardless of ring state. An index outside the buffered
    /// window, whether evicted or not yet produced, returns `None`; so does
    /// every call after [`stop`](PacketDemuxer::stop).
    pub fn get(&self, stream: StreamId, position: CursorPosition) -> Option<Arc<Packet>> {
        let stream_index = stream.as_usize();
        let mut state = self.shared.state.lock();
        if state.stopping {
            return None;
        }
        match position {
            CursorPosition::Last => {
                let packet = self
                    .last_packets
                    .get(stream_index)
                    .and_then(|slot| slot.clone());
                state.stats.record_lookup(packet.is_some());
                packet
            }
            CursorPosition::Index(index) => {
                let (packet, window) = match state.rings.get(stream_index) {
                    None => (None, None),
                    Some(ring) => (ring.get(index), ring.min_index().zip(ring.max_index())),
                };
                state.stats.record_lookup(packet.is_some());
                if packet.is_none() {
                    match window {
                        Some((min, max)) => warn!(
                            "Lookup for stream {stream} idx {index} outside window {min}-{max}"
                        ),
                        None => debug!("Lookup for stream {stream} idx {index} with empty window"),
                    }
                }
                packet
            }
        }
    }

    /// Advances a cursor by `by` packets (negative steps backwards) and
    /// returns the new position. Never errors.
    ///
    /// If the destination is already buffered this returns immediately,
    /// leaving the pump a readahead target. If it is ahead of the window
    /// the call blocks until the pump produces it; once the stream halts
    /// the result is clamped to the furthest available index instead.
    /// Stepping from the end-of-stream position stays there, stepping onto
    /// an evicted index returns `from` unchanged, and any step after
    /// [`stop`](PacketDemuxer::stop) returns `from`.
    pub async fn step(&self, stream: StreamId, from: CursorPosition, by: i64) -> CursorPosition {
        let CursorPosition::Index(from_index) = from else {
            return CursorPosition::Last;
        };
        let stream_index = stream.as_usize();
        if stream_index >= self.streams.len() {
            warn!("Step on unknown stream {stream}");
            return from;
        }
        let requested = PacketIndex::new(from_index.as_u64().saturating_add_signed(by));
        let target = PacketIndex::new(requested.as_u64().saturating_add(self.shared.readahead));

        loop {
            let notified = self.shared.packet_wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.shared.state.lock();
                if state.stopping {
                    return from;
                }
                if state.halted {
                    let clamped = state.rings[stream_index]
                        .max_index()
                        .map_or(from_index, |max| {
                            PacketIndex::new(requested.as_u64().min(max.as_u64()))
                        });
                    debug!("Step on halted stream {stream} clamped to {clamped}");
                    return CursorPosition::Index(clamped);
                }
                if state.rings[stream_index].get(requested).is_some() {
                    state.set_target(stream_index, target);
                    drop(state);
                    self.shared.pump_wake.notify_waiters();
                    return CursorPosition::Index(requested);
                }
                if let Some(min) = state.rings[stream_index].min_index() {
                    if requested < min {
                        warn!(
                            "Step on stream {stream} from {from_index} by {by} hit evicted idx, window starts at {min}"
                        );
                        return from;
                    }
                }
                // Underrun: destination is ahead of the window
                state.set_target(stream_index, target);
                debug!("Step on stream {stream} waiting for idx {requested}");
            }
            self.shared.pump_wake.notify_waiters();
            notified.await;
        }
    }

    /// Positions a cursor at `time` and returns where it landed.
    ///
    /// Seeking to [`MediaTime::POSITIVE_INFINITY`] resolves to the
    /// end-of-stream position in O(1) without touching rings or source.
    /// Repeating the previous seek is answered from memory when the window
    /// still covers index 0, and a time bracketed by the live window is
    /// answered from it; both fast paths are best-effort optimizations, not
    /// guarantees. Everything else is a real seek: reposition the source,
    /// flush every ring, and block until the first post-seek packet for
    /// `stream` arrives.
    ///
    /// # Errors
    ///
    /// - `DemuxError::SeekFailed` - The source rejected the seek; all
    ///   buffered state is left untouched.
    /// - `DemuxError::UnknownStream` - `stream` is not in the stream table.
    /// - `DemuxError::Stopped` - The demuxer was stopped.
    pub async fn seek(
        &self,
        stream: StreamId,
        time: MediaTime,
        kind: TimestampKind,
    ) -> Result<CursorPosition, DemuxError> {
        let stream_index = stream.as_usize();
        if stream_index >= self.streams.len() {
            return Err(DemuxError::UnknownStream { stream });
        }
        if time.is_positive_infinity() {
            let state = self.shared.state.lock();
            if state.stopping {
                return Err(DemuxError::Stopped);
            }
            return Ok(CursorPosition::Last);
        }

        {
            let mut state = self.shared.state.lock();
            if state.stopping {
                return Err(DemuxError::Stopped);
            }
            if state.remembered_seek == Some((time, kind)) {
                let ring = &state.rings[stream_index];
                if ring.is_empty() {
                    // The remembered seek is still filling; wait for its
                    // first packet like the original seek did
                    drop(state);
                    debug!("Seek stream {stream} to {time} repeated while refilling");
                    self.wait_for_first_packet(stream_index).await;
                    return Ok(CursorPosition::Index(PacketIndex::new(0)));
                }
                if ring.min_index() == Some(PacketIndex::new(0)) {
                    state.stats.remembered_seek_hits += 1;
                    debug!("Seek stream {stream} to {time} answered by remembered seek");
                    return Ok(CursorPosition::Index(PacketIndex::new(0)));
                }
                warn!("Seek stream {stream} to {time} matched remembered seek but idx 0 is evicted");
            }
            if let Some(hit) = state.rings[stream_index].nearest(time, kind) {
                state.stats.window_seek_hits += 1;
                debug!("Seek stream {stream} to {time} answered from window at idx {hit}");
                return Ok(CursorPosition::Index(hit));
            }
        }

        // Real seek: reposition the source first so a failure leaves every
        // ring untouched
        {
            let mut source = self.shared.source.lock().await;
            source.seek_to(Some(stream), time).await?;
            // Flush while still holding the source so the pump cannot slip
            // a read in between the source seek and the flush
            let mut state = self.shared.state.lock();
            state.flush();
            state.remembered_seek = Some((time, kind));
            state.stats.record_source_seek();
            debug!("Seek stream {stream} to {time} repositioned source, refilling");
        }
        self.shared.pump_wake.notify_waiters();
        self.wait_for_first_packet(stream_index).await;
        Ok(CursorPosition::Index(PacketIndex::new(0)))
    }

    /// Stops the demuxer: the pump exits and every subsequent consumer
    /// call fails fast. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.stopping {
                return;
            }
            state.stopping = true;
        }
        info!("Packet demuxer stopping");
        self.shared.pump_wake.notify_waiters();
        self.shared.packet_wake.notify_waiters();
    }

    /// Stops the demuxer and waits for the pump task to finish.
    pub async fn shutdown(&self) {
        self.stop();
        if let Some(handle) = self.pump_task.lock().await.take() {
            if let Err(error) = handle.await {
                warn!("Demux pump task ended abnormally: {error}");
            }
        }
    }

    /// Whether the pump has halted on end-of-source or a read error.
    pub fn is_halted(&self) -> bool {
        self.shared.state.lock().halted
    }

    /// The buffered `(min, max)` logical index window for a stream, or
    /// `None` if nothing is buffered.
    pub fn window(&self, stream: StreamId) -> Option<(PacketIndex, PacketIndex)> {
        let state = self.shared.state.lock();
        let ring = state.rings.get(stream.as_usize())?;
        ring.min_index().zip(ring.max_index())
    }

    /// Snapshot of the demux counters.
    pub fn stats(&self) -> DemuxStats {
        self.shared.state.lock().stats.clone()
    }

    /// Blocks until `stream` has its first post-seek packet, the pump
    /// halts, or the demuxer stops.
    async fn wait_for_first_packet(&self, stream_index: usize) {
        loop {
            let notified = self.shared.packet_wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.shared.state.lock();
                if state.stopping || state.halted || !state.rings[stream_index].is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

impl Drop for PacketDemuxer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::config::{DemuxConfig, SourceConfig};
    use crate::source::{PacketFlags, ReadOutcome, SourceError, TimeBase};

    /// Scripted in-memory source with observable seek behavior.
    struct MockPacketSource {
        streams: Vec<StreamDescriptor>,
        packets: Vec<Packet>,
        position: usize,
        seek_calls: Arc<AtomicUsize>,
        /// Fail every seek once this many seeks have been served.
        fail_seeks_after: Option<usize>,
        /// One-shot read failure when reaching this position.
        fail_read_at: Option<usize>,
    }

    impl MockPacketSource {
        fn new(streams: Vec<StreamDescriptor>, packets: Vec<Packet>) -> Self {
            Self {
                streams,
                packets,
                position: 0,
                seek_calls: Arc::new(AtomicUsize::new(0)),
                fail_seeks_after: None,
                fail_read_at: None,
            }
        }

        fn seek_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.seek_calls)
        }

        fn seconds_of(&self, packet: &Packet) -> Option<f64> {
            let time_base = self.streams[packet.stream.as_usize()].time_base;
            packet.dts.map(|dts| time_base.ticks_to_seconds(dts))
        }
    }

    #[async_trait::async_trait]
    impl PacketSource for MockPacketSource {
        fn streams(&self) -> &[StreamDescriptor] {
            &self.streams
        }

        async fn read_next_packet(&mut self) -> Result<ReadOutcome, SourceError> {
            if let Some(fail_at) = self.fail_read_at {
                if self.position == fail_at {
                    self.fail_read_at = None;
                    return Err(SourceError::Read {
                        reason: "injected read failure".to_string(),
                    });
                }
            }
            match self.packets.get(self.position) {
                Some(packet) => {
                    self.position += 1;
                    Ok(ReadOutcome::Packet(packet.clone()))
                }
                None => Ok(ReadOutcome::EndOfSource),
            }
        }

        async fn seek_to(
            &mut self,
            _stream: Option<StreamId>,
            time: MediaTime,
        ) -> Result<(), SourceError> {
            let served = self.seek_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_seeks_after {
                if served >= limit {
                    return Err(SourceError::Seek {
                        reason: "injected seek failure".to_string(),
                    });
                }
            }
            // Resume at the last packet at-or-before the requested time
            let target = time.seconds();
            let mut position = 0;
            for (index, packet) in self.packets.iter().enumerate() {
                match self.seconds_of(packet) {
                    Some(seconds) if seconds <= target => position = index,
                    Some(_) => break,
                    None => continue,
                }
            }
            self.position = position;
            Ok(())
        }

        async fn scan_to_end_collecting_last_packets(
            &mut self,
        ) -> Result<HashMap<StreamId, Packet>, SourceError> {
            let mut collected = HashMap::new();
            for packet in &self.packets {
                collected.insert(packet.stream, packet.clone());
            }
            self.position = self.packets.len();
            Ok(collected)
        }
    }

    fn test_packet(stream: usize, dts: i64) -> Packet {
        Packet {
            stream: StreamId::new(stream),
            dts: Some(dts),
            pts: Some(dts),
            duration: Some(1),
            data: Bytes::from_static(b"payload"),
            byte_offset: Some(dts as u64 * 100),
            flags: PacketFlags {
                keyframe: true,
                ..PacketFlags::default()
            },
        }
    }

    fn single_stream_source(packet_count: i64) -> MockPacketSource {
        let streams = vec![StreamDescriptor {
            id: StreamId::new(0),
            time_base: TimeBase::new(1, 10),
            discard: false,
        }];
        let packets = (0..packet_count).map(|dts| test_packet(0, dts)).collect();
        MockPacketSource::new(streams, packets)
    }

    fn test_config(ring_capacity: usize, readahead: u64) -> SlipstreamConfig {
        SlipstreamConfig {
            demux: DemuxConfig {
                ring_capacity,
                readahead,
            },
            source: SourceConfig::default(),
        }
    }

    async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if predicate() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await;
        assert!(result.is_ok(), "timed out waiting for {what}");
    }

    const STREAM: StreamId = StreamId(0);

    #[tokio::test]
    async fn test_filling_pauses_at_capacity() {
        let demuxer = PacketDemuxer::new(Box::new(single_stream_source(10)), test_config(4, 8))
            .await
            .unwrap();

        wait_until("window to fill", || {
            demuxer.window(STREAM) == Some((PacketIndex::new(0), PacketIndex::new(3)))
        })
        .await;

        // The pump must be paused, not racing ahead
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            demuxer.window(STREAM),
            Some((PacketIndex::new(0), PacketIndex::new(3)))
        );
        assert_eq!(demuxer.stats().source_reads, 4);

        for index in 0..4 {
            let packet = demuxer
                .get(STREAM, CursorPosition::Index(PacketIndex::new(index)))
                .unwrap();
            assert_eq!(packet.dts, Some(index as i64));
        }
        assert!(
            demuxer
                .get(STREAM, CursorPosition::Index(PacketIndex::new(4)))
                .is_none()
        );

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_step_past_window_chases_target() {
        let demuxer = PacketDemuxer::new(Box::new(single_stream_source(10)), test_config(4, 1))
            .await
            .unwrap();

        wait_until("window to fill", || {
            demuxer.window(STREAM) == Some((PacketIndex::new(0), PacketIndex::new(3)))
        })
        .await;

        let landed = demuxer
            .step(STREAM, CursorPosition::Index(PacketIndex::new(3)), 5)
            .await;
        assert_eq!(landed, CursorPosition::Index(PacketIndex::new(8)));

        let packet = demuxer
            .get(STREAM, CursorPosition::Index(PacketIndex::new(8)))
            .unwrap();
        assert_eq!(packet.dts, Some(8));

        // Early indices were evicted to admit the new ones, permanently
        assert!(
            demuxer
                .get(STREAM, CursorPosition::Index(PacketIndex::new(0)))
                .is_none()
        );
        assert!(demuxer.stats().packets_evicted > 0);

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_step_within_window_returns_immediately() {
        let demuxer = PacketDemuxer::new(Box::new(single_stream_source(10)), test_config(4, 8))
            .await
            .unwrap();

        wait_until("window to fill", || demuxer.window(STREAM).is_some()).await;

        let landed = demuxer
            .step(STREAM, CursorPosition::Index(PacketIndex::new(0)), 2)
            .await;
        assert_eq!(landed, CursorPosition::Index(PacketIndex::new(2)));

        let back = demuxer
            .step(STREAM, CursorPosition::Index(PacketIndex::new(2)), -1)
            .await;
        assert_eq!(back, CursorPosition::Index(PacketIndex::new(1)));

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_repeated_seek_hits_remembered_fast_path() {
        let source = single_stream_source(10);
        let seeks = source.seek_counter();
        let demuxer = PacketDemuxer::new(Box::new(source), test_config(4, 8))
            .await
            .unwrap();
        let seeks_after_construction = seeks.load(Ordering::SeqCst);

        // 0.5s is past anything the initial window can bracket
        let time = MediaTime::new(5, 10);
        let first = demuxer
            .seek(STREAM, time, TimestampKind::Decode)
            .await
            .unwrap();
        assert_eq!(first, CursorPosition::Index(PacketIndex::new(0)));
        assert_eq!(seeks.load(Ordering::SeqCst), seeks_after_construction + 1);

        let second = demuxer
            .seek(STREAM, time, TimestampKind::Decode)
            .await
            .unwrap();
        assert_eq!(second, CursorPosition::Index(PacketIndex::new(0)));
        // The repeat issued zero source-level seeks
        assert_eq!(seeks.load(Ordering::SeqCst), seeks_after_construction + 1);
        assert_eq!(demuxer.stats().remembered_seek_hits, 1);

        // The landed packet honors the at-or-before contract
        let packet = demuxer
            .get(STREAM, CursorPosition::Index(PacketIndex::new(0)))
            .unwrap();
        assert_eq!(packet.dts, Some(5));

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_seek_with_different_kind_misses_fast_path() {
        let source = single_stream_source(10);
        let seeks = source.seek_counter();
        let demuxer = PacketDemuxer::new(Box::new(source), test_config(4, 8))
            .await
            .unwrap();
        let baseline = seeks.load(Ordering::SeqCst);

        let time = MediaTime::new(5, 10);
        demuxer
            .seek(STREAM, time, TimestampKind::Decode)
            .await
            .unwrap();
        let second = demuxer
            .seek(STREAM, time, TimestampKind::Presentation)
            .await
            .unwrap();

        // Different ordering kind misses the remembered fast path; the
        // refilled window happens to cover the time exactly, so the second
        // seek is answered from it instead
        assert_eq!(second, CursorPosition::Index(PacketIndex::new(0)));
        assert_eq!(seeks.load(Ordering::SeqCst), baseline + 1);
        assert_eq!(demuxer.stats().remembered_seek_hits, 0);
        assert_eq!(demuxer.stats().window_seek_hits, 1);

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_step_after_end_of_source_clamps() {
        let demuxer = PacketDemuxer::new(Box::new(single_stream_source(10)), test_config(16, 8))
            .await
            .unwrap();

        wait_until("pump to halt at end of source", || demuxer.is_halted()).await;

        let landed = demuxer
            .step(STREAM, CursorPosition::Index(PacketIndex::new(9)), 5)
            .await;
        assert_eq!(landed, CursorPosition::Index(PacketIndex::new(9)));

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_seek_to_infinity_resolves_to_last_packet() {
        let demuxer = PacketDemuxer::new(Box::new(single_stream_source(10)), test_config(4, 8))
            .await
            .unwrap();

        let landed = demuxer
            .seek(STREAM, MediaTime::POSITIVE_INFINITY, TimestampKind::Presentation)
            .await
            .unwrap();
        assert_eq!(landed, CursorPosition::Last);

        let packet = demuxer.get(STREAM, CursorPosition::Last).unwrap();
        assert_eq!(packet.dts, Some(9));

        // Stepping from the end-of-stream position stays there
        let stepped = demuxer.step(STREAM, CursorPosition::Last, 3).await;
        assert_eq!(stepped, CursorPosition::Last);

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_seek_within_window_avoids_source() {
        let source = single_stream_source(10);
        let seeks = source.seek_counter();
        let demuxer = PacketDemuxer::new(Box::new(source), test_config(4, 8))
            .await
            .unwrap();

        wait_until("window to fill", || {
            demuxer.window(STREAM) == Some((PacketIndex::new(0), PacketIndex::new(3)))
        })
        .await;
        let baseline = seeks.load(Ordering::SeqCst);

        // 0.15s lies between buffered dts 1 and dts 2
        let landed = demuxer
            .seek(STREAM, MediaTime::new(15, 100), TimestampKind::Decode)
            .await
            .unwrap();
        assert_eq!(landed, CursorPosition::Index(PacketIndex::new(1)));
        assert_eq!(seeks.load(Ordering::SeqCst), baseline);
        assert_eq!(demuxer.stats().window_seek_hits, 1);

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_seek_leaves_buffers_untouched() {
        let mut source = single_stream_source(10);
        // Allow the construction-time seek back to start, fail the rest
        source.fail_seeks_after = Some(1);
        let demuxer = PacketDemuxer::new(Box::new(source), test_config(4, 8))
            .await
            .unwrap();

        wait_until("window to fill", || {
            demuxer.window(STREAM) == Some((PacketIndex::new(0), PacketIndex::new(3)))
        })
        .await;

        let result = demuxer
            .seek(STREAM, MediaTime::new(8, 10), TimestampKind::Decode)
            .await;
        assert!(matches!(result, Err(DemuxError::SeekFailed(_))));

        // Nothing was flushed
        assert_eq!(
            demuxer.window(STREAM),
            Some((PacketIndex::new(0), PacketIndex::new(3)))
        );
        assert!(
            demuxer
                .get(STREAM, CursorPosition::Index(PacketIndex::new(0)))
                .is_some()
        );

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_error_halts_and_seek_recovers() {
        let mut source = single_stream_source(10);
        source.fail_read_at = Some(5);
        let demuxer = PacketDemuxer::new(Box::new(source), test_config(16, 8))
            .await
            .unwrap();

        wait_until("pump to halt on read error", || demuxer.is_halted()).await;
        assert_eq!(
            demuxer.window(STREAM),
            Some((PacketIndex::new(0), PacketIndex::new(4)))
        );

        // Halted steps clamp instead of blocking
        let landed = demuxer
            .step(STREAM, CursorPosition::Index(PacketIndex::new(4)), 3)
            .await;
        assert_eq!(landed, CursorPosition::Index(PacketIndex::new(4)));

        // A successful seek clears the halt and restarts demuxing
        let landed = demuxer
            .seek(STREAM, MediaTime::new(9, 10), TimestampKind::Decode)
            .await
            .unwrap();
        assert_eq!(landed, CursorPosition::Index(PacketIndex::new(0)));
        let packet = demuxer
            .get(STREAM, CursorPosition::Index(PacketIndex::new(0)))
            .unwrap();
        assert_eq!(packet.dts, Some(9));

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_fails_fast_and_is_idempotent() {
        let demuxer = PacketDemuxer::new(Box::new(single_stream_source(10)), test_config(4, 8))
            .await
            .unwrap();

        demuxer.stop();
        demuxer.stop();

        assert!(
            demuxer
                .get(STREAM, CursorPosition::Index(PacketIndex::new(0)))
                .is_none()
        );
        let stepped = demuxer
            .step(STREAM, CursorPosition::Index(PacketIndex::new(0)), 1)
            .await;
        assert_eq!(stepped, CursorPosition::Index(PacketIndex::new(0)));
        let result = demuxer
            .seek(STREAM, MediaTime::ZERO, TimestampKind::Decode)
            .await;
        assert!(matches!(result, Err(DemuxError::Stopped)));

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_discarded_stream_packets_are_dropped() {
        let streams = vec![
            StreamDescriptor {
                id: StreamId::new(0),
                time_base: TimeBase::new(1, 10),
                discard: false,
            },
            StreamDescriptor {
                id: StreamId::new(1),
                time_base: TimeBase::new(1, 10),
                discard: true,
            },
        ];
        let mut packets = Vec::new();
        for dts in 0..6 {
            packets.push(test_packet(0, dts));
            packets.push(test_packet(1, dts));
        }
        let source = MockPacketSource::new(streams, packets);
        let demuxer = PacketDemuxer::new(Box::new(source), test_config(8, 8))
            .await
            .unwrap();

        wait_until("wanted stream to fill", || {
            demuxer.window(STREAM).is_some_and(|(_, max)| max.as_u64() >= 5)
        })
        .await;

        assert_eq!(demuxer.window(StreamId::new(1)), None);
        assert!(
            demuxer
                .get(StreamId::new(1), CursorPosition::Index(PacketIndex::new(0)))
                .is_none()
        );
        assert!(demuxer.stats().packets_dropped >= 6);

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_byte_offset_correction_is_applied() {
        let source = single_stream_source(10);
        let config = SlipstreamConfig {
            demux: DemuxConfig {
                ring_capacity: 4,
                readahead: 8,
            },
            source: SourceConfig::matroska(),
        };
        let demuxer = PacketDemuxer::new(Box::new(source), config).await.unwrap();

        wait_until("window to fill", || demuxer.window(STREAM).is_some()).await;

        let packet = demuxer
            .get(STREAM, CursorPosition::Index(PacketIndex::new(1)))
            .unwrap();
        assert_eq!(packet.byte_offset, Some(104));

        // The pre-scanned last packet gets the same correction
        let last = demuxer.get(STREAM, CursorPosition::Last).unwrap();
        assert_eq!(last.byte_offset, Some(904));

        demuxer.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_stream_requests() {
        let demuxer = PacketDemuxer::new(Box::new(single_stream_source(4)), test_config(4, 8))
            .await
            .unwrap();
        let bogus = StreamId::new(7);

        assert!(
            demuxer
                .get(bogus, CursorPosition::Index(PacketIndex::new(0)))
                .is_none()
        );
        let stepped = demuxer
            .step(bogus, CursorPosition::Index(PacketIndex::new(0)), 1)
            .await;
        assert_eq!(stepped, CursorPosition::Index(PacketIndex::new(0)));
        let result = demuxer
            .seek(bogus, MediaTime::ZERO, TimestampKind::Decode)
            .await;
        assert!(matches!(result, Err(DemuxError::UnknownStream { .. })));

        demuxer.shutdown().await;
    }
}
