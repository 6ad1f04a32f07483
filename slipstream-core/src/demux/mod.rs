//! Packet windowing and demultiplexing.
//!
//! This module turns a sequential, single-pass
//! [`PacketSource`](crate::source::PacketSource) into
//! approximate random access for concurrent consumer cursors while keeping
//! memory bounded regardless of source size. Each stream gets a fixed
//! capacity [`PacketRing`] addressed by logical index; a single background
//! pump routes packets from the source into the rings; the
//! [`PacketDemuxer`] facade owns both and exposes the consumer-facing
//! get/step/seek/stop contract.

pub mod demuxer;
pub(crate) mod pump;
pub mod ring;
pub mod stats;

use std::fmt;

pub use demuxer::PacketDemuxer;
pub use ring::PacketRing;
pub use stats::DemuxStats;

use crate::source::{PacketIndex, SourceError, StreamId};

/// Position of a consumer cursor within a stream.
///
/// Requests are tagged rather than overloading a reserved index value: a
/// cursor either addresses a buffered logical index or the pre-scanned
/// final packet of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPosition {
    /// A logical packet index.
    Index(PacketIndex),
    /// The last packet of the stream, served from the end-of-stream table.
    Last,
}

impl CursorPosition {
    /// Returns the logical index, or `None` for the end-of-stream position.
    pub fn index(self) -> Option<PacketIndex> {
        match self {
            CursorPosition::Index(index) => Some(index),
            CursorPosition::Last => None,
        }
    }
}

impl fmt::Display for CursorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorPosition::Index(index) => write!(f, "{index}"),
            CursorPosition::Last => write!(f, "last"),
        }
    }
}

/// Errors surfaced by the demuxer facade.
///
/// Source read failures and end-of-source never appear here; they are
/// absorbed into the halted state and observable only as clamped results.
#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    /// A source-level seek was rejected or failed. Buffered state is left
    /// untouched when the seek call itself fails.
    #[error("seek failed: {0}")]
    SeekFailed(#[from] SourceError),

    /// The demuxer has been stopped; all consumer calls fail fast.
    #[error("demuxer is stopped")]
    Stopped,

    /// The requested stream does not exist in the source's stream table.
    #[error("unknown stream {stream}")]
    UnknownStream {
        /// The offending stream id.
        stream: StreamId,
    },
}
