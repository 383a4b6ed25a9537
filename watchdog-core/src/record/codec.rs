//! Wire decoding for `key|text|action|timeout` payloads

use std::time::Duration;

use crate::record::types::HeartbeatRecord;

/// Separates the positional fields of a payload
pub const FIELD_SEPARATOR: char = '|';

/// Key used when a payload carries no configuration
pub const DEFAULT_KEY: &str = "default";

impl HeartbeatRecord {
    /// Decode a payload of the form `[key]|[text]|[action]|[timeout]`.
    ///
    /// Decoding never fails. A payload without any separator is a plain
    /// heartbeat for key `default` with nothing explicit; otherwise each
    /// field is applied (and marked explicit) according to its own rule:
    ///
    /// - `key` is always applied, even when empty
    /// - `text` is applied only when non-empty
    /// - `action` is applied whenever its slot exists, even when empty
    /// - `timeout` is applied only when it parses, see [`parse_timeout`]
    ///
    /// Fields past the fourth are ignored.
    pub fn decode(payload: &str, origin: impl Into<String>) -> Self {
        let mut record = HeartbeatRecord::new(origin);
        if !payload.contains(FIELD_SEPARATOR) {
            return record;
        }

        let mut fields = payload.split(FIELD_SEPARATOR);

        if let Some(key) = fields.next() {
            record.set_key(key);
        }
        if let Some(text) = fields.next() {
            if !text.is_empty() {
                record.set_text(text);
            }
        }
        if let Some(action) = fields.next() {
            record.set_action(action);
        }
        if let Some(timeout) = fields.next().and_then(parse_timeout) {
            record.set_timeout(timeout);
        }

        record
    }
}

/// Parse a timeout field: a bare integer is seconds, anything else is a
/// duration expression such as `19s`, `500ms` or `1h 30m`.
pub fn parse_timeout(raw: &str) -> Option<Duration> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::types::RecordField;

    #[test]
    fn test_decode_full_payload() {
        let record = HeartbeatRecord::decode("TYPE|message|Action|19", "127.0.0.1:9000");

        assert_eq!(record.key, "TYPE");
        assert_eq!(record.text, "message");
        assert_eq!(record.action, "Action");
        assert_eq!(record.timeout, Duration::from_secs(19));
        assert_eq!(record.origin, "127.0.0.1:9000");
        assert_eq!(record.explicit_fields().len(), 4);
    }

    #[test]
    fn test_decode_without_separator_is_default_heartbeat() {
        for payload in ["", "bar", "anything at all 19s"] {
            let record = HeartbeatRecord::decode(payload, "peer");
            assert_eq!(record.key, DEFAULT_KEY);
            assert!(record.explicit_fields().is_empty(), "payload {:?}", payload);
        }
    }

    #[test]
    fn test_decode_empty_key_is_explicit() {
        let record = HeartbeatRecord::decode("|hello", "peer");
        assert_eq!(record.key, "");
        assert!(record.is_explicit(RecordField::Key));
        assert_eq!(record.text, "hello");
    }

    #[test]
    fn test_decode_empty_text_is_not_explicit() {
        let record = HeartbeatRecord::decode("DWN||acton", "peer");
        assert_eq!(record.key, "DWN");
        assert!(!record.is_explicit(RecordField::Text));
        assert_eq!(record.action, "acton");
        assert!(record.is_explicit(RecordField::Action));
        assert!(!record.is_explicit(RecordField::Timeout));
    }

    #[test]
    fn test_decode_empty_action_is_explicit() {
        let record = HeartbeatRecord::decode("typeA|msg|", "peer");
        assert!(record.is_explicit(RecordField::Action));
        assert_eq!(record.action, "");
    }

    #[test]
    fn test_decode_short_payload() {
        let record = HeartbeatRecord::decode("typeA|this is a message", "peer");
        assert_eq!(record.key, "typeA");
        assert_eq!(record.text, "this is a message");
        assert!(!record.is_explicit(RecordField::Action));
        assert!(!record.is_explicit(RecordField::Timeout));
    }

    #[test]
    fn test_decode_duration_expression() {
        let record = HeartbeatRecord::decode("messageType|Nice long explanation|action1|900ms", "peer");
        assert_eq!(record.timeout, Duration::from_millis(900));
        assert!(record.is_explicit(RecordField::Timeout));
    }

    #[test]
    fn test_decode_bad_timeout_is_absent() {
        let record = HeartbeatRecord::decode("k|t|a|soon", "peer");
        assert!(!record.is_explicit(RecordField::Timeout));
        assert_eq!(record.explicit_fields().len(), 3);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let record = HeartbeatRecord::decode("k|t|a|5|extra|more", "peer");
        assert_eq!(record.timeout, Duration::from_secs(5));
        assert_eq!(record.explicit_fields().len(), 4);
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("19"), Some(Duration::from_secs(19)));
        assert_eq!(parse_timeout("19s"), Some(Duration::from_secs(19)));
        assert_eq!(parse_timeout("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_timeout("2m 30s"), Some(Duration::from_secs(150)));
        assert_eq!(parse_timeout("-5"), None);
        assert_eq!(parse_timeout(""), None);
        assert_eq!(parse_timeout("later"), None);
    }
}
