//! The sequential packet source abstraction.
//!
//! This module defines the upstream boundary of the demux engine. A
//! [`PacketSource`] is a pull-based, single-pass producer of still-encoded
//! packets in container-native order; container parsing, codec handling and
//! everything format-specific live behind this trait. The demux pump is the
//! only component that reads from it.

pub mod time;

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use thiserror::Error;

pub use time::{MediaTime, TimeBase};

/// Zero-based index of an elementary stream within a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub usize);

impl StreamId {
    /// Creates a StreamId from a zero-based track index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying track index.
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-stream logical packet index.
///
/// Strictly increasing in demultiplexing order, never reused, and the sole
/// addressing scheme consumers use. Independent of byte positions in the
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketIndex(pub u64);

impl PacketIndex {
    /// Creates a PacketIndex from a zero-based sequence number.
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    /// Returns the underlying sequence number.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PacketIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of a packet's two timestamps an operation should consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampKind {
    /// Decode-order timestamp (DTS).
    Decode,
    /// Presentation-order timestamp (PTS).
    Presentation,
}

/// Packet attribute flags reported by the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags {
    /// Packet starts a decodable unit (safe resynchronization point).
    pub keyframe: bool,
    /// Packet may be dropped without corrupting later output.
    pub discardable: bool,
    /// Source flagged the payload as damaged.
    pub corrupt: bool,
}

impl fmt::Display for PacketFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.keyframe { 'K' } else { '_' },
            if self.discardable { 'D' } else { '_' },
            if self.corrupt { 'C' } else { '_' },
        )
    }
}

/// One demultiplexed, still-encoded unit of media data for a single stream.
///
/// Timestamps and duration are tick counts in the owning stream's
/// [`TimeBase`]; any of them may be unknown. The byte offset is the packet's
/// position in the container and may be approximate.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Owning elementary stream.
    pub stream: StreamId,
    /// Decode timestamp in stream time base ticks, if known.
    pub dts: Option<i64>,
    /// Presentation timestamp in stream time base ticks, if known.
    pub pts: Option<i64>,
    /// Duration in stream time base ticks, if known.
    pub duration: Option<i64>,
    /// Encoded payload.
    pub data: Bytes,
    /// Position of the payload in the container, if known.
    pub byte_offset: Option<u64>,
    /// Attribute flags.
    pub flags: PacketFlags,
}

impl Packet {
    /// Returns the requested timestamp, if the source reported one.
    pub fn timestamp(&self, kind: TimestampKind) -> Option<i64> {
        match kind {
            TimestampKind::Decode => self.dts,
            TimestampKind::Presentation => self.pts,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Static description of one elementary stream, reported by the source.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Stream identifier, matching `Packet::stream` for its packets.
    pub id: StreamId,
    /// Time base its packet timestamps are expressed in.
    pub time_base: TimeBase,
    /// Stream is not wanted; its packets are dropped instead of buffered.
    pub discard: bool,
}

/// Result of one pull from a packet source.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The next packet in container order.
    Packet(Packet),
    /// The source is exhausted. Repeated reads keep returning this until a
    /// successful seek repositions the source.
    EndOfSource,
}

/// Errors reported by a packet source.
///
/// End of source is not an error; it is a [`ReadOutcome`] variant.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading or parsing the next packet failed. The source is assumed
    /// unrecoverable at its current position.
    #[error("source read failed: {reason}")]
    Read {
        /// Description of the failure from the source.
        reason: String,
    },

    /// The source rejected or failed an absolute seek.
    #[error("source seek failed: {reason}")]
    Seek {
        /// Description of the failure from the source.
        reason: String,
    },

    /// An I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pull-based sequential packet producer.
///
/// Implementations wrap a container parser, a network stream, or a
/// simulation. The demux engine consumes them strictly forward between
/// seeks; nothing in this trait needs to support random access beyond
/// [`seek_to`](PacketSource::seek_to).
#[async_trait::async_trait]
pub trait PacketSource: Send {
    /// The container's stream table. Stable for the source's lifetime.
    fn streams(&self) -> &[StreamDescriptor];

    /// Pulls the next packet in container-native order.
    ///
    /// Must keep returning [`ReadOutcome::EndOfSource`] after exhaustion.
    ///
    /// # Errors
    ///
    /// - `SourceError::Read` - Reading or parsing failed; the caller treats
    ///   the source as unrecoverable until the next successful seek.
    async fn read_next_packet(&mut self) -> Result<ReadOutcome, SourceError>;

    /// Absolute seek. On success, subsequent reads resume at-or-before
    /// `time`, ideally at a resynchronization point.
    ///
    /// `stream` is a hint naming the stream whose time base `time` is most
    /// naturally interpreted in; sources may ignore it.
    ///
    /// # Errors
    ///
    /// - `SourceError::Seek` - The source rejected or failed the seek. The
    ///   read position is unspecified afterwards.
    async fn seek_to(
        &mut self,
        stream: Option<StreamId>,
        time: MediaTime,
    ) -> Result<(), SourceError>;

    /// One-time pre-scan to the end of the source, collecting the final
    /// packet of each stream.
    ///
    /// Must leave the source positioned so that a subsequent seek back to
    /// [`MediaTime::ZERO`] resumes normal forward reading.
    ///
    /// # Errors
    ///
    /// - `SourceError::Read` / `SourceError::Seek` - The scan could not be
    ///   completed. Callers may treat this as non-fatal.
    async fn scan_to_end_collecting_last_packets(
        &mut self,
    ) -> Result<HashMap<StreamId, Packet>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_timestamp_selection() {
        let packet = Packet {
            stream: StreamId::new(0),
            dts: Some(100),
            pts: Some(120),
            duration: Some(20),
            data: Bytes::from_static(b"payload"),
            byte_offset: Some(4096),
            flags: PacketFlags::default(),
        };

        assert_eq!(packet.timestamp(TimestampKind::Decode), Some(100));
        assert_eq!(packet.timestamp(TimestampKind::Presentation), Some(120));
        assert_eq!(packet.size(), 7);
    }

    #[test]
    fn test_flags_display() {
        let flags = PacketFlags {
            keyframe: true,
            discardable: false,
            corrupt: true,
        };
        assert_eq!(flags.to_string(), "K_C");
        assert_eq!(PacketFlags::default().to_string(), "___");
    }
}
