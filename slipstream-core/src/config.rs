//! Centralized configuration for Slipstream.
//!
//! All tunable parameters live here to avoid hard-coded values scattered
//! throughout the codebase.

/// Central configuration for all Slipstream components.
///
/// Groups related settings into logical sections.
#[derive(Debug, Clone, Default)]
pub struct SlipstreamConfig {
    pub demux: DemuxConfig,
    pub source: SourceConfig,
}

/// Demux engine configuration.
///
/// Controls per-stream buffering and pump readahead behavior.
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// Maximum number of live packets buffered per stream.
    pub ring_capacity: usize,
    /// Extra packets demuxed past a requested index before the pump
    /// returns to steady state. Sized to cover bursty cursor advances on
    /// dense audio streams.
    pub readahead: u64,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1024,
            readahead: 192,
        }
    }
}

/// Source-specific configuration.
///
/// Settings that compensate for quirks of a particular container family or
/// parser rather than tuning the demux engine itself.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Signed correction added to every packet's reported byte offset.
    ///
    /// Some parsers report the enclosing framing element's position instead
    /// of the payload's. The set of affected container families is not fully
    /// characterized, so the correction is configured per source rather than
    /// keyed off the container name.
    pub byte_offset_correction: i64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            byte_offset_correction: 0,
        }
    }
}

impl SourceConfig {
    /// Preset for Matroska sources, whose parser is known to report packet
    /// positions 4 bytes early (the EBML element ID preceding the payload).
    pub fn matroska() -> Self {
        Self {
            byte_offset_correction: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SlipstreamConfig::default();

        assert_eq!(config.demux.ring_capacity, 1024);
        assert_eq!(config.demux.readahead, 192);
        assert_eq!(config.source.byte_offset_correction, 0);
    }

    #[test]
    fn test_matroska_preset() {
        assert_eq!(SourceConfig::matroska().byte_offset_correction, 4);
    }
}
