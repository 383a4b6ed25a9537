//! Base trait for alert handlers

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::record::HeartbeatRecord;

/// Callbacks a timer invokes over its lifetime.
///
/// Implementations own their failures: nothing they do may stop the timer
/// that called them.
#[async_trait]
pub trait Handler: Send + Sync {
    /// A heartbeat arrived and the deadline was restarted
    async fn feed(&self, record: &HeartbeatRecord);

    /// The deadline elapsed without a heartbeat
    async fn starve(&self, record: &HeartbeatRecord);
}

/// Handler that only logs
#[derive(Debug, Default, Clone)]
pub struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    async fn feed(&self, record: &HeartbeatRecord) {
        debug!("Fed '{}' from {}", record.key, record.origin);
    }

    async fn starve(&self, record: &HeartbeatRecord) {
        warn!(
            "Starved '{}': {} (last seen from {})",
            record.key, record.text, record.origin
        );
    }
}
