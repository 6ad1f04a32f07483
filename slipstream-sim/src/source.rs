//! Scripted in-memory packet source.
//!
//! [`SimulatedPacketSource`] generates its entire packet schedule up front
//! from per-stream specs, then serves it through the
//! [`PacketSource`] trait exactly like a container parser would: strictly
//! forward reads, keyframe-aware seeks, a pinned end-of-source, and optional
//! injected failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use slipstream_core::source::{
    MediaTime, Packet, PacketFlags, PacketSource, ReadOutcome, SourceError, StreamDescriptor,
    StreamId, TimeBase,
};
use tracing::debug;

/// Shape of one simulated elementary stream.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    /// Time base packet timestamps are expressed in.
    pub time_base: TimeBase,
    /// Total packets the stream produces.
    pub packet_count: u64,
    /// Timestamp increment between consecutive packets.
    pub ticks_per_packet: i64,
    /// Every Nth packet is a keyframe; 1 makes every packet one.
    pub keyframe_interval: u64,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Mark the stream as unwanted in its descriptor.
    pub discard: bool,
}

impl StreamSpec {
    /// A sparse keyframed stream, one packet per tick.
    pub fn video(time_base: TimeBase, packet_count: u64) -> Self {
        Self {
            time_base,
            packet_count,
            ticks_per_packet: 1,
            keyframe_interval: 12,
            payload_size: 2048,
            discard: false,
        }
    }

    /// A dense stream where every packet is a resynchronization point.
    pub fn audio(time_base: TimeBase, packet_count: u64) -> Self {
        Self {
            time_base,
            packet_count,
            ticks_per_packet: 1,
            keyframe_interval: 1,
            payload_size: 256,
            discard: false,
        }
    }
}

/// Builder for [`SimulatedPacketSource`].
#[derive(Default)]
pub struct SimulatedSourceBuilder {
    specs: Vec<StreamSpec>,
    fail_read_after: Option<usize>,
    fail_seeks_after: Option<usize>,
}

impl SimulatedSourceBuilder {
    /// Adds a stream. Stream ids are assigned in call order.
    pub fn stream(mut self, spec: StreamSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Injects a one-shot read failure after `count` successful reads.
    pub fn fail_read_after(mut self, count: usize) -> Self {
        self.fail_read_after = Some(count);
        self
    }

    /// Makes every seek fail once `count` seeks have been served.
    pub fn fail_seeks_after(mut self, count: usize) -> Self {
        self.fail_seeks_after = Some(count);
        self
    }

    /// Generates the full packet schedule and builds the source.
    pub fn build(self) -> SimulatedPacketSource {
        let streams: Vec<StreamDescriptor> = self
            .specs
            .iter()
            .enumerate()
            .map(|(index, spec)| StreamDescriptor {
                id: StreamId::new(index),
                time_base: spec.time_base,
                discard: spec.discard,
            })
            .collect();

        // Interleave all streams by decode time, the way a container stores
        // them; ties break by stream id so the schedule is deterministic.
        let mut schedule: Vec<(f64, Packet)> = Vec::new();
        let mut byte_offset = 0u64;
        for (stream_index, spec) in self.specs.iter().enumerate() {
            for sequence in 0..spec.packet_count {
                let dts = sequence as i64 * spec.ticks_per_packet;
                let keyframe = sequence % spec.keyframe_interval.max(1) == 0;
                schedule.push((
                    spec.time_base.ticks_to_seconds(dts),
                    Packet {
                        stream: StreamId::new(stream_index),
                        dts: Some(dts),
                        pts: Some(dts),
                        duration: Some(spec.ticks_per_packet),
                        data: Bytes::from(vec![stream_index as u8; spec.payload_size]),
                        byte_offset: Some(byte_offset),
                        flags: PacketFlags {
                            keyframe,
                            ..PacketFlags::default()
                        },
                    },
                ));
                byte_offset += spec.payload_size as u64;
            }
        }
        schedule.sort_by(|(a_secs, a), (b_secs, b)| {
            a_secs
                .total_cmp(b_secs)
                .then(a.stream.as_usize().cmp(&b.stream.as_usize()))
        });
        debug!(
            "Simulated source built: {} streams, {} packets",
            streams.len(),
            schedule.len()
        );

        SimulatedPacketSource {
            streams,
            schedule: schedule.into_iter().map(|(_, packet)| packet).collect(),
            position: 0,
            reads: Arc::new(AtomicUsize::new(0)),
            seeks: Arc::new(AtomicUsize::new(0)),
            fail_read_after: self.fail_read_after,
            fail_seeks_after: self.fail_seeks_after,
        }
    }
}

/// Deterministic in-memory packet source.
pub struct SimulatedPacketSource {
    streams: Vec<StreamDescriptor>,
    schedule: Vec<Packet>,
    position: usize,
    reads: Arc<AtomicUsize>,
    seeks: Arc<AtomicUsize>,
    fail_read_after: Option<usize>,
    fail_seeks_after: Option<usize>,
}

impl SimulatedPacketSource {
    /// Starts building a source.
    pub fn builder() -> SimulatedSourceBuilder {
        SimulatedSourceBuilder::default()
    }

    /// Counter handle observing successful reads; clone before boxing the
    /// source away.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }

    /// Counter handle observing seeks served.
    pub fn seek_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.seeks)
    }

    /// Total packets in the generated schedule.
    pub fn schedule_len(&self) -> usize {
        self.schedule.len()
    }

    fn seconds_of(&self, packet: &Packet) -> Option<f64> {
        let time_base = self.streams[packet.stream.as_usize()].time_base;
        packet.dts.map(|dts| time_base.ticks_to_seconds(dts))
    }
}

#[async_trait::async_trait]
impl PacketSource for SimulatedPacketSource {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    async fn read_next_packet(&mut self) -> Result<ReadOutcome, SourceError> {
        if let Some(fail_after) = self.fail_read_after {
            if self.reads.load(Ordering::SeqCst) >= fail_after {
                self.fail_read_after = None;
                return Err(SourceError::Read {
                    reason: "injected read failure".to_string(),
                });
            }
        }
        match self.schedule.get(self.position) {
            Some(packet) => {
                let packet = packet.clone();
                self.position += 1;
                self.reads.fetch_add(1, Ordering::SeqCst);
                Ok(ReadOutcome::Packet(packet))
            }
            // Pinned: stays exhausted until a successful seek
            None => Ok(ReadOutcome::EndOfSource),
        }
    }

    async fn seek_to(
        &mut self,
        stream: Option<StreamId>,
        time: MediaTime,
    ) -> Result<(), SourceError> {
        let served = self.seeks.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_seeks_after {
            if served >= limit {
                return Err(SourceError::Seek {
                    reason: "injected seek failure".to_string(),
                });
            }
        }
        // Resume at the last resynchronization point at-or-before `time`,
        // preferring keyframes of the hinted stream.
        let target = time.seconds();
        let mut position = 0;
        for (index, packet) in self.schedule.iter().enumerate() {
            let Some(seconds) = self.seconds_of(packet) else {
                continue;
            };
            if seconds > target {
                break;
            }
            let resync = packet.flags.keyframe
                && stream.is_none_or(|wanted| packet.stream == wanted);
            if resync {
                position = index;
            }
        }
        debug!("Simulated source seek to {time} resumed at schedule index {position}");
        self.position = position;
        Ok(())
    }

    async fn scan_to_end_collecting_last_packets(
        &mut self,
    ) -> Result<HashMap<StreamId, Packet>, SourceError> {
        let mut collected = HashMap::new();
        for packet in &self.schedule {
            collected.insert(packet.stream, packet.clone());
        }
        self.position = self.schedule.len();
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use slipstream_core::source::TimestampKind;

    use super::*;

    fn two_stream_source() -> SimulatedPacketSource {
        SimulatedPacketSource::builder()
            .stream(StreamSpec::video(TimeBase::new(1, 4), 8))
            .stream(StreamSpec::audio(TimeBase::new(1, 8), 16))
            .build()
    }

    #[tokio::test]
    async fn test_schedule_is_time_ordered() {
        let mut source = two_stream_source();
        assert_eq!(source.schedule_len(), 24);

        let mut previous = f64::NEG_INFINITY;
        loop {
            match source.read_next_packet().await.unwrap() {
                ReadOutcome::Packet(packet) => {
                    let seconds = source.seconds_of(&packet).unwrap();
                    assert!(seconds >= previous);
                    previous = seconds;
                }
                ReadOutcome::EndOfSource => break,
            }
        }
        assert_eq!(source.read_counter().load(Ordering::SeqCst), 24);
    }

    #[tokio::test]
    async fn test_end_of_source_is_pinned() {
        let mut source = SimulatedPacketSource::builder()
            .stream(StreamSpec::audio(TimeBase::new(1, 10), 2))
            .build();

        for _ in 0..2 {
            assert!(matches!(
                source.read_next_packet().await.unwrap(),
                ReadOutcome::Packet(_)
            ));
        }
        for _ in 0..3 {
            assert!(matches!(
                source.read_next_packet().await.unwrap(),
                ReadOutcome::EndOfSource
            ));
        }

        // A seek un-pins it
        source.seek_to(None, MediaTime::ZERO).await.unwrap();
        assert!(matches!(
            source.read_next_packet().await.unwrap(),
            ReadOutcome::Packet(_)
        ));
    }

    #[tokio::test]
    async fn test_seek_resumes_at_keyframe_of_hinted_stream() {
        // Keyframes on the video stream land at sequence 0 and 12
        let mut source = SimulatedPacketSource::builder()
            .stream(StreamSpec::video(TimeBase::new(1, 10), 24))
            .build();

        source
            .seek_to(Some(StreamId::new(0)), MediaTime::new(15, 10))
            .await
            .unwrap();

        let ReadOutcome::Packet(packet) = source.read_next_packet().await.unwrap() else {
            panic!("expected a packet after seek");
        };
        assert_eq!(packet.dts, Some(12));
        assert!(packet.flags.keyframe);
        assert_eq!(packet.timestamp(TimestampKind::Presentation), Some(12));
    }

    #[tokio::test]
    async fn test_scan_collects_final_packet_per_stream() {
        let mut source = two_stream_source();

        let last = source.scan_to_end_collecting_last_packets().await.unwrap();

        assert_eq!(last.len(), 2);
        assert_eq!(last[&StreamId::new(0)].dts, Some(7));
        assert_eq!(last[&StreamId::new(1)].dts, Some(15));

        // Scan leaves the source at the end
        assert!(matches!(
            source.read_next_packet().await.unwrap(),
            ReadOutcome::EndOfSource
        ));
    }

    #[tokio::test]
    async fn test_injected_read_failure_fires_once() {
        let mut source = SimulatedPacketSource::builder()
            .stream(StreamSpec::audio(TimeBase::new(1, 10), 5))
            .fail_read_after(2)
            .build();

        assert!(source.read_next_packet().await.is_ok());
        assert!(source.read_next_packet().await.is_ok());
        assert!(matches!(
            source.read_next_packet().await,
            Err(SourceError::Read { .. })
        ));
        // One-shot: the next read succeeds from where it left off
        assert!(matches!(
            source.read_next_packet().await.unwrap(),
            ReadOutcome::Packet(_)
        ));
    }

    #[tokio::test]
    async fn test_injected_seek_failure() {
        let mut source = SimulatedPacketSource::builder()
            .stream(StreamSpec::audio(TimeBase::new(1, 10), 5))
            .fail_seeks_after(1)
            .build();

        assert!(source.seek_to(None, MediaTime::ZERO).await.is_ok());
        assert!(matches!(
            source.seek_to(None, MediaTime::ZERO).await,
            Err(SourceError::Seek { .. })
        ));
        assert_eq!(source.seek_counter().load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_byte_offsets_are_distinct_and_increasing_per_stream() {
        let source = two_stream_source();

        let mut previous: HashMap<StreamId, u64> = HashMap::new();
        for packet in &source.schedule {
            let offset = packet.byte_offset.unwrap();
            if let Some(last) = previous.get(&packet.stream) {
                assert!(offset > *last);
            }
            previous.insert(packet.stream, offset);
        }
    }
}
