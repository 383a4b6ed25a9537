//! Heartbeat record and explicit-field tracking

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TimerDefaults;
use crate::record::codec::DEFAULT_KEY;

/// Identifies a record field that can be explicitly set.
///
/// `origin` has no identifier: it is always taken from the latest message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Key,
    Text,
    Action,
    Timeout,
    AlertLimit,
    AlertOnce,
}

/// What a client wants tracked for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// Which liveness check this belongs to
    pub key: String,
    /// Human-readable alert message
    pub text: String,
    /// Command to run on alert
    pub action: String,
    /// How long to wait for the next heartbeat
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Sender address of the most recent message
    pub origin: String,
    /// Consecutive timeouts tolerated; negative never gives up
    pub alert_limit: i64,
    /// Give up after the first alert regardless of `alert_limit`
    pub alert_once: bool,
    /// When this record was received or built
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    explicit_fields: BTreeSet<RecordField>,
}

impl HeartbeatRecord {
    /// Create a record with key `default`, zeroed values and nothing explicit
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            text: String::new(),
            action: String::new(),
            timeout: Duration::ZERO,
            origin: origin.into(),
            alert_limit: 0,
            alert_once: false,
            received_at: Utc::now(),
            explicit_fields: BTreeSet::new(),
        }
    }

    /// Build the baseline record a brand-new timer starts from
    pub fn baseline(defaults: &TimerDefaults) -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            text: defaults.alert_text.clone(),
            action: String::new(),
            timeout: defaults.timeout,
            origin: String::new(),
            alert_limit: defaults.alert_limit,
            alert_once: defaults.alert_once,
            received_at: Utc::now(),
            explicit_fields: BTreeSet::new(),
        }
    }

    /// Overlay `incoming` onto the server defaults and return the result as
    /// a new baseline with no explicit fields.
    pub fn with_defaults(defaults: &TimerDefaults, incoming: &HeartbeatRecord) -> Self {
        let mut record = Self::baseline(defaults);
        record.merge(incoming);
        record.received_at = incoming.received_at;
        record.explicit_fields.clear();
        record
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
        self.explicit_fields.insert(RecordField::Key);
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.explicit_fields.insert(RecordField::Text);
    }

    pub fn set_action(&mut self, action: impl Into<String>) {
        self.action = action.into();
        self.explicit_fields.insert(RecordField::Action);
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.explicit_fields.insert(RecordField::Timeout);
    }

    pub fn set_alert_limit(&mut self, alert_limit: i64) {
        self.alert_limit = alert_limit;
        self.explicit_fields.insert(RecordField::AlertLimit);
    }

    pub fn set_alert_once(&mut self, alert_once: bool) {
        self.alert_once = alert_once;
        self.explicit_fields.insert(RecordField::AlertOnce);
    }

    /// Fields that were explicitly supplied
    pub fn explicit_fields(&self) -> &BTreeSet<RecordField> {
        &self.explicit_fields
    }

    /// Check whether a field was explicitly supplied
    pub fn is_explicit(&self, field: RecordField) -> bool {
        self.explicit_fields.contains(&field)
    }

    /// Copy every explicit field of `incoming` into `self`; `origin` is
    /// always copied. `self`'s own explicit set is left as it was.
    pub fn merge(&mut self, incoming: &HeartbeatRecord) {
        for field in &incoming.explicit_fields {
            match field {
                RecordField::Key => self.key.clone_from(&incoming.key),
                RecordField::Text => self.text.clone_from(&incoming.text),
                RecordField::Action => self.action.clone_from(&incoming.action),
                RecordField::Timeout => self.timeout = incoming.timeout,
                RecordField::AlertLimit => self.alert_limit = incoming.alert_limit,
                RecordField::AlertOnce => self.alert_once = incoming.alert_once,
            }
        }
        self.origin.clone_from(&incoming.origin);
    }
}
