//! Registry of running timers
//!
//! A single task owns the key -> timer mapping and is its only writer. It
//! consumes commands from any number of [`RegistryHandle`]s and removal
//! reports from terminated timers, one event at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::TimerDefaults;
use crate::handler::Handler;
use crate::record::HeartbeatRecord;
use crate::timer::{Removal, Timer, TimerHandle, TimerId};
use crate::{Error, Result};

/// Snapshot of one tracked key
#[derive(Debug, Clone, Serialize)]
pub struct TimerStatus {
    pub key: String,
    pub id: TimerId,
    /// Alert text of the live record
    pub text: String,
    /// Alert action of the live record, empty when none was given
    pub action: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_origin: String,
    pub heartbeats: u64,
}

enum RegistryCommand {
    Record(HeartbeatRecord),
    Keys(oneshot::Sender<Vec<String>>),
    Timers(oneshot::Sender<Vec<TimerStatus>>),
    Stop(String, oneshot::Sender<bool>),
    Shutdown,
}

struct TimerEntry {
    handle: TimerHandle,
    /// Mirror of the timer's record, merged the same way the timer merges
    record: HeartbeatRecord,
    started_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    last_origin: String,
    heartbeats: u64,
}

impl TimerEntry {
    fn new(handle: TimerHandle, initial: HeartbeatRecord, record: &HeartbeatRecord) -> Self {
        Self {
            handle,
            record: initial,
            started_at: record.received_at,
            last_seen_at: record.received_at,
            last_origin: record.origin.clone(),
            heartbeats: 1,
        }
    }

    fn touch(&mut self, record: &HeartbeatRecord) {
        self.record.merge(record);
        self.last_seen_at = record.received_at;
        self.last_origin.clone_from(&record.origin);
        self.heartbeats += 1;
    }

    fn status(&self, key: &str) -> TimerStatus {
        TimerStatus {
            key: key.to_string(),
            id: self.handle.id(),
            text: self.record.text.clone(),
            action: self.record.action.clone(),
            timeout: self.record.timeout,
            started_at: self.started_at,
            last_seen_at: self.last_seen_at,
            last_origin: self.last_origin.clone(),
            heartbeats: self.heartbeats,
        }
    }
}

/// Cloneable front door to a running registry
#[derive(Clone)]
pub struct RegistryHandle {
    commands: mpsc::UnboundedSender<RegistryCommand>,
}

impl RegistryHandle {
    fn send(&self, command: RegistryCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Channel("Registry closed".to_string()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await
            .map_err(|_| Error::Channel("Registry dropped the request".to_string()))
    }

    /// Hand a decoded heartbeat to the registry; fire-and-forget
    pub fn submit(&self, record: HeartbeatRecord) -> Result<()> {
        self.send(RegistryCommand::Record(record))
    }

    /// Keys currently tracked, sorted
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.request(RegistryCommand::Keys).await
    }

    /// Status of every tracked key, sorted by key
    pub async fn timers(&self) -> Result<Vec<TimerStatus>> {
        self.request(RegistryCommand::Timers).await
    }

    /// Stop tracking `key` without alerting. Returns whether it was tracked.
    pub async fn stop(&self, key: impl Into<String>) -> Result<bool> {
        let key = key.into();
        self.request(|reply| RegistryCommand::Stop(key, reply)).await
    }

    /// Stop every timer and end the registry task
    pub fn shutdown(&self) -> Result<()> {
        self.send(RegistryCommand::Shutdown)
    }
}

/// Owner of the key -> timer mapping
pub struct Registry {
    defaults: TimerDefaults,
    handler: Arc<dyn Handler>,
    timers: HashMap<String, TimerEntry>,
    next_id: u64,
    commands: mpsc::UnboundedReceiver<RegistryCommand>,
    removals_tx: mpsc::UnboundedSender<Removal>,
    removals_rx: mpsc::UnboundedReceiver<Removal>,
}

impl Registry {
    /// Create a registry and the handle that feeds it
    pub fn new(defaults: TimerDefaults, handler: Arc<dyn Handler>) -> (Self, RegistryHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (removals_tx, removals_rx) = mpsc::unbounded_channel();
        let registry = Self {
            defaults,
            handler,
            timers: HashMap::new(),
            next_id: 1,
            commands: commands_rx,
            removals_tx,
            removals_rx,
        };
        (registry, RegistryHandle { commands: commands_tx })
    }

    /// Create a registry and run it on its own task
    pub fn spawn(
        defaults: TimerDefaults,
        handler: Arc<dyn Handler>,
    ) -> (RegistryHandle, JoinHandle<()>) {
        let (registry, handle) = Self::new(defaults, handler);
        let task = tokio::spawn(registry.run());
        (handle, task)
    }

    /// Process commands and removals until shut down or every handle is gone
    pub async fn run(mut self) {
        debug!("Registry started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(RegistryCommand::Record(record)) => self.handle_record(record),
                    Some(RegistryCommand::Keys(reply)) => {
                        let _ = reply.send(self.keys());
                    }
                    Some(RegistryCommand::Timers(reply)) => {
                        let _ = reply.send(self.statuses());
                    }
                    Some(RegistryCommand::Stop(key, reply)) => {
                        let _ = reply.send(self.stop_timer(&key));
                    }
                    Some(RegistryCommand::Shutdown) | None => break,
                },
                Some(removal) = self.removals_rx.recv() => self.handle_removal(removal),
            }
        }

        info!("Registry stopping {} timer(s)", self.timers.len());
        for (_, entry) in self.timers.drain() {
            entry.handle.stop();
        }
    }

    fn handle_record(&mut self, record: HeartbeatRecord) {
        let key = record.key.clone();
        if let Some(entry) = self.timers.get_mut(&key) {
            debug!("Another one of type '{}'", key);
            if entry.handle.feed(record.clone()) {
                entry.touch(&record);
                return;
            }
            // Terminated, removal report still in flight.
            debug!(
                "Timer {} for '{}' already terminated, starting a new one",
                entry.handle.id(),
                key
            );
        } else {
            info!("First one of type '{}' from {}", key, record.origin);
        }
        self.start_timer(key, record);
    }

    fn start_timer(&mut self, key: String, record: HeartbeatRecord) {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let initial = HeartbeatRecord::with_defaults(&self.defaults, &record);
        debug!(
            "Starting timer {} for '{}' ({}, limit {}, once {})",
            id,
            key,
            humantime::format_duration(initial.timeout),
            initial.alert_limit,
            initial.alert_once
        );
        let (handle, _task) = Timer::spawn(
            id,
            initial.clone(),
            Arc::clone(&self.handler),
            self.removals_tx.clone(),
        );
        self.timers.insert(key, TimerEntry::new(handle, initial, &record));
    }

    fn handle_removal(&mut self, removal: Removal) {
        match self.timers.get(&removal.key) {
            Some(entry) if entry.handle.id() == removal.id => {
                self.timers.remove(&removal.key);
                info!(
                    "Removed '{}' (timer {}): {}",
                    removal.key, removal.id, removal.record.text
                );
                for record in removal.pending {
                    self.handle_record(record);
                }
            }
            Some(entry) => {
                debug!(
                    "Ignoring removal of timer {} for '{}', timer {} is current",
                    removal.id,
                    removal.key,
                    entry.handle.id()
                );
            }
            None => {
                debug!(
                    "Ignoring removal of timer {} for untracked '{}'",
                    removal.id, removal.key
                );
            }
        }
    }

    fn stop_timer(&mut self, key: &str) -> bool {
        match self.timers.remove(key) {
            Some(entry) => {
                info!("Stopping '{}' (timer {})", key, entry.handle.id());
                entry.handle.stop();
                true
            }
            None => false,
        }
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.timers.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn statuses(&self) -> Vec<TimerStatus> {
        let mut statuses: Vec<TimerStatus> = self
            .timers
            .iter()
            .map(|(key, entry)| entry.status(key))
            .collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }
}
