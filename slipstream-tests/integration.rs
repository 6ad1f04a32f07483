//! Integration tests for Slipstream
//!
//! These tests drive the demux engine end to end through simulated packet
//! sources: concurrent cursors, seek storms, and halt/recovery behavior.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/concurrent_cursors.rs"]
mod concurrent_cursors;

#[path = "integration/seek_behavior.rs"]
mod seek_behavior;

#[path = "integration/halt_recovery.rs"]
mod halt_recovery;
