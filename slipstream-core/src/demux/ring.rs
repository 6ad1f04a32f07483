//! Fixed-capacity circular packet store addressed by logical index.
//!
//! One ring exists per stream. Packets enter at the tail in demultiplexing
//! order and are assigned strictly increasing logical indices that are never
//! reused; eviction advances the head. The held indices always form a
//! contiguous `[min, max]` window. All mutation happens while the facade's
//! state lock is held, so the ring itself carries no synchronization.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::source::{MediaTime, Packet, PacketIndex, TimeBase, TimestampKind};

/// Bounded circular buffer of packets for one stream.
pub struct PacketRing {
    slots: Vec<Option<Arc<Packet>>>,
    head: usize,
    count: usize,
    /// Logical index of the packet at `head`.
    head_index: u64,
    capacity: usize,
    time_base: TimeBase,
}

impl PacketRing {
    /// Creates an empty ring holding at most `capacity` packets.
    ///
    /// A zero-capacity ring is valid and rejects every append; it is used
    /// for streams marked discard.
    pub fn new(capacity: usize, time_base: TimeBase) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            count: 0,
            head_index: 0,
            capacity,
            time_base,
        }
    }

    /// Maximum number of live packets.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Time base packet timestamps are expressed in.
    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Number of packets currently held.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the ring holds no packets.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether the ring is at capacity.
    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Smallest buffered logical index, or `None` if empty.
    pub fn min_index(&self) -> Option<PacketIndex> {
        if self.is_empty() {
            None
        } else {
            Some(PacketIndex::new(self.head_index))
        }
    }

    /// Largest buffered logical index, or `None` if empty.
    pub fn max_index(&self) -> Option<PacketIndex> {
        if self.is_empty() {
            None
        } else {
            Some(PacketIndex::new(self.head_index + self.count as u64 - 1))
        }
    }

    /// Appends without evicting. Returns false (a no-op) if the ring is
    /// full. Used in filling mode, where the pump pauses before any ring
    /// overflows, so the caller never blocks.
    pub fn append_no_evict(&mut self, packet: Arc<Packet>) -> bool {
        if self.is_full() {
            return false;
        }
        let tail = (self.head + self.count) % self.capacity;
        self.slots[tail] = Some(packet);
        self.count += 1;
        true
    }

    /// Appends, displacing the oldest packet when full. Always succeeds;
    /// returns the evicted packet for disposal. Used in target-chasing
    /// mode. The evicted index is permanently gone, never reused.
    pub fn append_evicting_oldest(&mut self, packet: Arc<Packet>) -> Option<Arc<Packet>> {
        if self.capacity == 0 {
            // Nothing can be held; the incoming packet is its own evictee.
            return Some(packet);
        }
        let mut evicted = None;
        if self.is_full() {
            evicted = self.slots[self.head].take();
            self.head = (self.head + 1) % self.capacity;
            self.head_index += 1;
            self.count -= 1;
        }
        let tail = (self.head + self.count) % self.capacity;
        self.slots[tail] = Some(packet);
        self.count += 1;
        evicted
    }

    /// O(1) lookup by logical index. `None` outside the buffered window,
    /// whether the index was evicted or not yet produced.
    pub fn get(&self, index: PacketIndex) -> Option<Arc<Packet>> {
        let index = index.as_u64();
        if self.is_empty() || index < self.head_index {
            return None;
        }
        let offset = (index - self.head_index) as usize;
        if offset >= self.count {
            return None;
        }
        self.slots[(self.head + offset) % self.capacity].clone()
    }

    /// Finds the logical index of the closest packet at-or-before `time`.
    ///
    /// Returns `None` unless the buffered window brackets `time` (some
    /// packet at-or-before and some packet at-or-after it), forcing the
    /// caller to perform a real source-level seek instead of answering from
    /// a window that may be missing closer packets. Packets with an unknown
    /// timestamp of the requested kind are skipped.
    pub fn nearest(&self, time: MediaTime, kind: TimestampKind) -> Option<PacketIndex> {
        let mut below: Option<u64> = None;
        let mut bracketed = false;
        for offset in 0..self.count as u64 {
            let index = self.head_index + offset;
            let slot = (self.head + offset as usize) % self.capacity;
            let Some(packet) = self.slots[slot].as_ref() else {
                continue;
            };
            let Some(ticks) = packet.timestamp(kind) else {
                continue;
            };
            match compare_ticks(ticks, self.time_base, time) {
                Ordering::Equal => return Some(PacketIndex::new(index)),
                Ordering::Less => below = Some(index),
                Ordering::Greater => {
                    bracketed = true;
                    break;
                }
            }
        }
        if bracketed {
            below.map(PacketIndex::new)
        } else {
            None
        }
    }

    /// Evicts and releases every buffered packet. Logical indexing restarts
    /// at zero; callers only reset as part of a full flush that invalidates
    /// outstanding indices.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.count = 0;
        self.head_index = 0;
    }
}

/// Compares a tick count in `time_base` against a [`MediaTime`] exactly,
/// cross-multiplying in i128 to avoid rounding.
fn compare_ticks(ticks: i64, time_base: TimeBase, time: MediaTime) -> Ordering {
    if time.is_positive_infinity() {
        return Ordering::Less;
    }
    let lhs = ticks as i128 * time_base.num as i128 * time.timescale as i128;
    let rhs = time.value as i128 * time_base.den as i128;
    lhs.cmp(&rhs)
}
