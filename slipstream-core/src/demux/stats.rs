//! Statistics tracking for the demux engine.

/// Counters for pump and facade activity.
///
/// Updated under the demuxer's state lock; a clone is returned to callers
/// so reads never observe a torn snapshot.
#[derive(Debug, Clone, Default)]
pub struct DemuxStats {
    /// Packets pulled from the source.
    pub source_reads: u64,

    /// Packets routed into a ring.
    pub packets_routed: u64,

    /// Packets displaced by target-chasing appends.
    pub packets_evicted: u64,

    /// Packets dropped without buffering (discarded streams, stale reads
    /// overlapping a flush, overflow in filling mode).
    pub packets_dropped: u64,

    /// Source-level seeks issued.
    pub source_seeks: u64,

    /// Seeks answered from the remembered previous seek.
    pub remembered_seek_hits: u64,

    /// Seeks answered from the live window.
    pub window_seek_hits: u64,

    /// Lookups that found their packet.
    pub lookup_hits: u64,

    /// Lookups for an evicted or not-yet-produced index.
    pub lookup_misses: u64,

    /// Times the pump observed end-of-source or a read error.
    pub halts: u64,
}

impl DemuxStats {
    /// Creates new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of lookups served from a ring (0-1).
    pub fn lookup_hit_ratio(&self) -> f64 {
        let total = self.lookup_hits + self.lookup_misses;
        if total == 0 {
            return 0.0;
        }
        self.lookup_hits as f64 / total as f64
    }

    /// Fraction of seeks answered without touching the source (0-1).
    pub fn seek_fast_path_ratio(&self) -> f64 {
        let total = self.remembered_seek_hits + self.window_seek_hits + self.source_seeks;
        if total == 0 {
            return 0.0;
        }
        (self.remembered_seek_hits + self.window_seek_hits) as f64 / total as f64
    }

    /// Records a packet pulled from the source.
    pub fn record_source_read(&mut self) {
        self.source_reads += 1;
    }

    /// Records a packet routed into a ring.
    pub fn record_packet_routed(&mut self) {
        self.packets_routed += 1;
    }

    /// Records a packet displaced by an evicting append.
    pub fn record_packet_evicted(&mut self) {
        self.packets_evicted += 1;
    }

    /// Records a packet disposed of without buffering.
    pub fn record_packet_dropped(&mut self) {
        self.packets_dropped += 1;
    }

    /// Records a lookup and whether it hit.
    pub fn record_lookup(&mut self, hit: bool) {
        if hit {
            self.lookup_hits += 1;
        } else {
            self.lookup_misses += 1;
        }
    }

    /// Records a real source-level seek.
    pub fn record_source_seek(&mut self) {
        self.source_seeks += 1;
    }

    /// Records a halt transition.
    pub fn record_halt(&mut self) {
        self.halts += 1;
    }

    /// Formats statistics as human-readable string.
    pub fn format_summary(&self) -> String {
        format!(
            "Demux Stats: {} read / {} routed / {} evicted / {} dropped, seeks: {} source + {} window + {} remembered ({:.1}% fast path), lookup hit ratio: {:.1}%",
            self.source_reads,
            self.packets_routed,
            self.packets_evicted,
            self.packets_dropped,
            self.source_seeks,
            self.window_seek_hits,
            self.remembered_seek_hits,
            self.seek_fast_path_ratio() * 100.0,
            self.lookup_hit_ratio() * 100.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let stats = DemuxStats::new();
        assert_eq!(stats.source_reads, 0);
        assert_eq!(stats.lookup_hit_ratio(), 0.0);
        assert_eq!(stats.seek_fast_path_ratio(), 0.0);
    }

    #[test]
    fn test_lookup_hit_ratio() {
        let mut stats = DemuxStats::new();
        stats.record_lookup(true);
        stats.record_lookup(true);
        stats.record_lookup(true);
        stats.record_lookup(false);

        assert_eq!(stats.lookup_hit_ratio(), 0.75);
    }

    #[test]
    fn test_seek_fast_path_ratio() {
        let mut stats = DemuxStats::new();
        stats.record_source_seek();
        stats.remembered_seek_hits = 2;
        stats.window_seek_hits = 1;

        assert_eq!(stats.seek_fast_path_ratio(), 0.75);
    }

    #[test]
    fn test_format_summary() {
        let mut stats = DemuxStats::new();
        stats.source_reads = 10;
        stats.packets_routed = 9;
        stats.record_source_seek();

        let summary = stats.format_summary();
        assert!(summary.contains("10 read"));
        assert!(summary.contains("9 routed"));
        assert!(summary.contains("1 source"));
    }
}
