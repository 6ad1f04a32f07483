//! Shared helpers for integration tests.

use std::sync::Once;
use std::time::Duration;

use slipstream_core::config::{DemuxConfig, SlipstreamConfig, SourceConfig};
use slipstream_core::tracing_setup::init_tracing;
use tracing::Level;

static TRACING: Once = Once::new();

/// Initializes tracing once per test binary; repeat calls are no-ops.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        if let Err(error) = init_tracing(Level::WARN, None) {
            eprintln!("tracing init skipped: {error}");
        }
    });
}

/// Config with explicit demux sizing and no byte offset correction.
pub fn demux_config(ring_capacity: usize, readahead: u64) -> SlipstreamConfig {
    SlipstreamConfig {
        demux: DemuxConfig {
            ring_capacity,
            readahead,
        },
        source: SourceConfig::default(),
    }
}

/// Polls `predicate` until it holds or a 5 second deadline passes.
pub async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}
