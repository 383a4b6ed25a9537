//! Dead-man's switch over UDP
//!
//! Clients send periodic heartbeats for one or more keys. Each key gets its
//! own timer; when a key's heartbeats stop arriving within its timeout, the
//! configured [`Handler`] is told to starve it, typically running an alert
//! action.
//!
//! The data flow is: datagram -> [`HeartbeatRecord`] -> [`registry`] ->
//! per-key [`timer`] -> [`Handler`] callback.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod record;
pub mod registry;
pub mod server;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::send_heartbeat;
pub use error::{Error, Result};
pub use handler::{ActionHandler, Handler, LogHandler};
pub use record::{HeartbeatRecord, RecordField};
pub use registry::{Registry, RegistryHandle, TimerStatus};
pub use server::WatchdogServer;
pub use timer::TimerId;
