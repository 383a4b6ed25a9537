//! Heartbeat records and their wire encoding
//!
//! A heartbeat record is the partially-specified unit a client sends to
//! describe what it wants tracked. Every record remembers which of its fields
//! were explicitly supplied, so that merging a sparse update onto an existing
//! record only touches those fields.

pub mod codec;
pub mod types;

pub use codec::{parse_timeout, DEFAULT_KEY, FIELD_SEPARATOR};
pub use types::{HeartbeatRecord, RecordField};
