//! Slipstream Simulation Framework - Deterministic packet sources for testing.
//!
//! This crate provides scripted [`PacketSource`](slipstream_core::PacketSource)
//! implementations for exercising the demux engine under controlled,
//! reproducible conditions: multi-stream interleaving, configurable packet
//! cadence, keyframe-aware seeking, and fault injection for read and seek
//! failures.
//!
//! # Example
//!
//! ```rust,no_run
//! use slipstream_core::config::SlipstreamConfig;
//! use slipstream_core::demux::PacketDemuxer;
//! use slipstream_core::source::TimeBase;
//! use slipstream_sim::{SimulatedPacketSource, StreamSpec};
//!
//! # async fn demo() -> Result<(), slipstream_core::DemuxError> {
//! let source = SimulatedPacketSource::builder()
//!     .stream(StreamSpec::video(TimeBase::new(1, 24), 240))
//!     .stream(StreamSpec::audio(TimeBase::new(1, 48), 480))
//!     .build();
//! let _demuxer = PacketDemuxer::new(Box::new(source), SlipstreamConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod source;

pub use source::{SimulatedPacketSource, SimulatedSourceBuilder, StreamSpec};
