//! The demultiplexing pump: the single background worker that moves packets
//! from the sequential source into the per-stream rings.
//!
//! The pump is the only writer to rings and the only reader of the source.
//! Shared state lives behind one mutex; two [`Notify`] handles carry pure
//! "re-evaluate" signals (consumers kick the pump, the pump kicks blocked
//! consumers) and never data. Every waiter re-checks its predicate after
//! waking, with the notification armed before the check so no wakeup is
//! lost.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use super::ring::PacketRing;
use super::stats::DemuxStats;
use crate::source::{MediaTime, Packet, PacketIndex, PacketSource, ReadOutcome, TimestampKind};

/// Pump operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpMode {
    /// Steady state: top up rings, never evict, pause when one fills.
    Filling,
    /// A request missed its window: keep demuxing, evicting the oldest
    /// packets, until every outstanding target is reached.
    TargetChasing,
}

/// All mutable demux state, guarded by the facade's single lock.
pub(crate) struct DemuxState {
    pub(crate) rings: Vec<PacketRing>,
    pub(crate) mode: PumpMode,
    /// Per-stream logical index the pump must reach before returning to
    /// filling mode. `None` means no outstanding target.
    pub(crate) targets: Vec<Option<PacketIndex>>,
    /// Set on end-of-source or unrecoverable read error; cleared only by a
    /// successful seek.
    pub(crate) halted: bool,
    /// Set once by `stop()`; never cleared.
    pub(crate) stopping: bool,
    /// Bumped on every flush so the pump can discard a packet whose read
    /// overlapped a seek.
    pub(crate) epoch: u64,
    /// The `(time, kind)` of the last real seek, for the best-effort
    /// repeated-seek fast path.
    pub(crate) remembered_seek: Option<(MediaTime, TimestampKind)>,
    pub(crate) stats: DemuxStats,
}

impl DemuxState {
    pub(crate) fn new(rings: Vec<PacketRing>) -> Self {
        let targets = vec![None; rings.len()];
        Self {
            rings,
            mode: PumpMode::Filling,
            targets,
            halted: false,
            stopping: false,
            epoch: 0,
            remembered_seek: None,
            stats: DemuxStats::new(),
        }
    }

    /// Decides whether the pump should block instead of reading.
    ///
    /// Also performs the target-chasing to filling transition the moment
    /// every outstanding target is met.
    pub(crate) fn should_pause(&mut self) -> bool {
        if self.halted {
            return true;
        }
        if self.mode == PumpMode::TargetChasing {
            if self.targets_met() {
                debug!("All readahead targets met, returning to filling mode");
                self.mode = PumpMode::Filling;
                for target in &mut self.targets {
                    *target = None;
                }
            } else {
                return false;
            }
        }
        // Filling pauses once any bounded ring is full
        self.rings
            .iter()
            .any(|ring| ring.capacity() > 0 && ring.is_full())
    }

    fn targets_met(&self) -> bool {
        self.targets
            .iter()
            .zip(&self.rings)
            .all(|(target, ring)| match target {
                None => true,
                Some(target) => ring.max_index().is_some_and(|max| max >= *target),
            })
    }

    /// Registers a readahead target and switches to target-chasing.
    pub(crate) fn set_target(&mut self, stream_index: usize, target: PacketIndex) {
        self.targets[stream_index] = Some(target);
        self.mode = PumpMode::TargetChasing;
    }

    /// Evicts everything and restarts in a fresh filling state. Outstanding
    /// logical indices become permanently unavailable; the epoch bump makes
    /// the pump drop any read that was in flight.
    pub(crate) fn flush(&mut self) {
        for ring in &mut self.rings {
            ring.reset();
        }
        for target in &mut self.targets {
            *target = None;
        }
        self.epoch += 1;
        self.halted = false;
        self.mode = PumpMode::Filling;
    }

    /// Routes one packet into its stream's ring according to the current
    /// mode, disposing of any evictee.
    pub(crate) fn route_packet(&mut self, packet: Packet) {
        let stream_index = packet.stream.as_usize();
        let Some(ring) = self.rings.get_mut(stream_index) else {
            warn!(
                "Dropping packet for stream {} not in the stream table",
                packet.stream
            );
            self.stats.record_packet_dropped();
            return;
        };
        if ring.capacity() == 0 {
            debug!("Dropping packet for discarded stream {}", packet.stream);
            self.stats.record_packet_dropped();
            return;
        }

        let packet = Arc::new(packet);
        match self.mode {
            PumpMode::Filling => {
                if !ring.append_no_evict(Arc::clone(&packet)) {
                    // The pause predicate keeps filling away from full
                    // rings, so this only fires on racing mode changes.
                    warn!(
                        "Ring for stream {} full in filling mode, dropping packet",
                        packet.stream
                    );
                    self.stats.record_packet_dropped();
                    return;
                }
            }
            PumpMode::TargetChasing => {
                if ring.append_evicting_oldest(Arc::clone(&packet)).is_some() {
                    self.stats.record_packet_evicted();
                }
            }
        }
        self.stats.record_packet_routed();

        if let Some(index) = self.rings[stream_index].max_index() {
            debug!(
                "Queued stream {} idx:{} dts:{:?} pts:{:?} duration:{:?} pos:{:?} size:{} flags:{}",
                packet.stream,
                index,
                packet.dts,
                packet.pts,
                packet.duration,
                packet.byte_offset,
                packet.size(),
                packet.flags,
            );
        }
    }
}

/// Shared ownership between the facade and the pump task.
pub(crate) struct DemuxShared {
    pub(crate) state: Mutex<DemuxState>,
    /// Wakes the pump when consumers need more data or state changed.
    pub(crate) pump_wake: Notify,
    /// Wakes blocked consumers when a packet arrived or the pump halted.
    pub(crate) packet_wake: Notify,
    /// The sequential source. Its own lock, never held together with the
    /// state lock across a read, so consumers can inspect state while a
    /// read is in flight.
    pub(crate) source: tokio::sync::Mutex<Box<dyn PacketSource>>,
    pub(crate) readahead: u64,
    pub(crate) byte_offset_correction: i64,
}

/// The pump loop. Runs until the facade sets the stopping flag.
pub(crate) async fn run(shared: Arc<DemuxShared>) {
    debug!("Demux pump started");
    loop {
        let notified = shared.pump_wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let epoch = {
            let mut state = shared.state.lock();
            if state.stopping {
                break;
            }
            if state.should_pause() {
                None
            } else {
                Some(state.epoch)
            }
        };
        let epoch = match epoch {
            Some(epoch) => epoch,
            None => {
                notified.await;
                continue;
            }
        };

        // Read with only the source lock held; state stays inspectable.
        let outcome = { shared.source.lock().await.read_next_packet().await };

        {
            let mut state = shared.state.lock();
            if state.stopping {
                break;
            }
            if state.epoch != epoch {
                // A seek flushed while the read was in flight; whatever the
                // outcome was, it describes the pre-flush position.
                if let Ok(ReadOutcome::Packet(packet)) = outcome {
                    state.stats.record_source_read();
                    state.stats.record_packet_dropped();
                    debug!(
                        "Discarding stream {} packet read before flush",
                        packet.stream
                    );
                }
            } else {
                match outcome {
                    Ok(ReadOutcome::Packet(mut packet)) => {
                        state.stats.record_source_read();
                        if shared.byte_offset_correction != 0 {
                            packet.byte_offset = packet
                                .byte_offset
                                .map(|pos| pos.saturating_add_signed(shared.byte_offset_correction));
                        }
                        state.route_packet(packet);
                    }
                    Ok(ReadOutcome::EndOfSource) => {
                        state.halted = true;
                        state.stats.record_halt();
                        debug!("Demux pump reached end of source");
                    }
                    Err(error) => {
                        state.halted = true;
                        state.stats.record_halt();
                        error!("Demux pump read failed, halting: {error}");
                    }
                }
            }
        }
        shared.packet_wake.notify_waiters();
    }
    debug!("Demux pump stopped");
}
