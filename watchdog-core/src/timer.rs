//! Per-key timer actor
//!
//! Each timer is an independent task owning one live record, a deadline and
//! a retry counter. It reacts to whichever comes first: a signal from the
//! registry or its own deadline. When it gives up it reports its final record
//! on the removal channel and exits; a timer is never restarted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::handler::Handler;
use crate::record::HeartbeatRecord;

/// Registry-assigned identity of one timer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Messages a timer accepts, processed strictly in send order
#[derive(Debug, Clone)]
pub enum TimerSignal {
    /// Merge the incoming record's explicit fields into the current one
    Update(HeartbeatRecord),
    /// Invoke `feed`, restart the deadline and clear the retry counter
    Reset,
    /// Terminate without alerting
    Stop,
}

/// Shortest deadline a timer will arm, whatever the record asks for
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Deadlines that cannot be represented are pushed out this far instead
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Sent by a timer when it terminates
#[derive(Debug, Clone)]
pub struct Removal {
    pub key: String,
    pub id: TimerId,
    pub record: HeartbeatRecord,
    /// Updates that were still queued when the timer gave up, in send order
    pub pending: Vec<HeartbeatRecord>,
}

/// Registry-side handle to a running timer
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: TimerId,
    signals: mpsc::UnboundedSender<TimerSignal>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Deliver a signal; fails once the timer has terminated
    pub fn send(&self, signal: TimerSignal) -> Result<(), TimerSignal> {
        self.signals.send(signal).map_err(|e| e.0)
    }

    /// Deliver a record update followed by a reset.
    ///
    /// Returns `false` if the timer has already terminated.
    pub fn feed(&self, record: HeartbeatRecord) -> bool {
        self.send(TimerSignal::Update(record)).is_ok() && self.send(TimerSignal::Reset).is_ok()
    }

    /// Ask the timer to terminate
    pub fn stop(&self) {
        let _ = self.send(TimerSignal::Stop);
    }

    /// Whether the timer task has exited
    pub fn is_closed(&self) -> bool {
        self.signals.is_closed()
    }
}

/// Whether a timer that has alerted `retries` times should give up
pub fn alert_limit_reached(retries: u64, alert_limit: i64, alert_once: bool) -> bool {
    if alert_once {
        return true;
    }
    // Negative limits never give up.
    u64::try_from(alert_limit).is_ok_and(|limit| retries > limit)
}

/// The instant a deadline armed now with `timeout` expires
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.max(MIN_TIMEOUT))
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// The state machine owned by one timer task
pub struct Timer {
    key: String,
    id: TimerId,
    record: HeartbeatRecord,
    retries: u64,
    handler: Arc<dyn Handler>,
    signals: mpsc::UnboundedReceiver<TimerSignal>,
    removals: mpsc::UnboundedSender<Removal>,
}

impl Timer {
    /// Start a timer for `record` (already merged onto the server defaults).
    ///
    /// The deadline starts at now + `record.timeout`.
    pub fn spawn(
        id: TimerId,
        record: HeartbeatRecord,
        handler: Arc<dyn Handler>,
        removals: mpsc::UnboundedSender<Removal>,
    ) -> (TimerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = Timer {
            key: record.key.clone(),
            id,
            record,
            retries: 0,
            handler,
            signals: rx,
            removals,
        };
        let task = tokio::spawn(timer.run());
        (TimerHandle { id, signals: tx }, task)
    }

    async fn run(mut self) {
        let deadline = tokio::time::sleep_until(deadline_after(self.record.timeout));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                signal = self.signals.recv() => match signal {
                    Some(TimerSignal::Reset) => {
                        self.handler.feed(&self.record).await;
                        deadline.as_mut().reset(deadline_after(self.record.timeout));
                        self.retries = 0;
                    }
                    Some(TimerSignal::Update(incoming)) => {
                        debug!("Timer {} '{}': got update", self.id, self.record.key);
                        self.record.merge(&incoming);
                    }
                    Some(TimerSignal::Stop) | None => {
                        debug!("Timer {} '{}': stopped", self.id, self.record.key);
                        break;
                    }
                },
                () = &mut deadline => {
                    info!(
                        "Timeout reached for '{}' after {}",
                        self.record.key,
                        humantime::format_duration(self.record.timeout)
                    );
                    self.handler.starve(&self.record).await;
                    deadline.as_mut().reset(deadline_after(self.record.timeout));
                    self.retries += 1;
                    if alert_limit_reached(self.retries, self.record.alert_limit, self.record.alert_once) {
                        info!(
                            "Alert limit {} reached for '{}' after {} alert(s)",
                            self.record.alert_limit, self.record.key, self.retries
                        );
                        break;
                    }
                }
            }
        }

        // Heartbeats that raced the last alert are handed back to the registry.
        self.signals.close();
        let mut pending = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            if let TimerSignal::Update(record) = signal {
                pending.push(record);
            }
        }
        if !pending.is_empty() {
            debug!(
                "Timer {} '{}': returning {} queued heartbeat(s)",
                self.id,
                self.record.key,
                pending.len()
            );
        }

        // The registry may already be gone during shutdown.
        let _ = self.removals.send(Removal {
            key: self.key,
            id: self.id,
            record: self.record,
            pending,
        });
    }
}
