//! Slipstream Core - Packet windowing and demultiplexing engine
//!
//! This crate bridges sequential, single-pass packet sources to concurrent
//! random-access consumers: a background pump demultiplexes packets into
//! bounded per-stream rings, and the [`PacketDemuxer`] facade gives any
//! number of cursors approximate random access over them.

pub mod config;
pub mod demux;
pub mod source;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::SlipstreamConfig;
pub use demux::{CursorPosition, DemuxError, PacketDemuxer};
pub use source::{MediaTime, Packet, PacketIndex, PacketSource, SourceError, StreamId};

/// Core errors that can bubble up from any Slipstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SlipstreamError {
    #[error("Demux error: {0}")]
    Demux(#[from] DemuxError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SlipstreamError>;
