//! Shared helpers for unit tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::handler::Handler;
use crate::record::HeartbeatRecord;

/// Handler that remembers every callback it receives
#[derive(Default)]
pub(crate) struct RecordingHandler {
    fed: Mutex<Vec<HeartbeatRecord>>,
    starved: Mutex<Vec<HeartbeatRecord>>,
    starve_delay: Option<Duration>,
}

impl RecordingHandler {
    /// Each `starve` call takes `delay` to complete, like a slow alert action
    pub(crate) fn with_starve_delay(delay: Duration) -> Self {
        Self {
            starve_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn feeds(&self) -> usize {
        self.fed.lock().unwrap().len()
    }

    pub(crate) fn starves(&self) -> usize {
        self.starved.lock().unwrap().len()
    }

    pub(crate) fn last_fed(&self) -> Option<HeartbeatRecord> {
        self.fed.lock().unwrap().last().cloned()
    }

    pub(crate) fn last_starved(&self) -> Option<HeartbeatRecord> {
        self.starved.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn feed(&self, record: &HeartbeatRecord) {
        self.fed.lock().unwrap().push(record.clone());
    }

    async fn starve(&self, record: &HeartbeatRecord) {
        self.starved.lock().unwrap().push(record.clone());
        if let Some(delay) = self.starve_delay {
            tokio::time::sleep(delay).await;
        }
    }
}
