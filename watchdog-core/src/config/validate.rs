//! Configuration validation rules.

use super::schema::Config;

/// Largest payload a UDP datagram over IPv4 can carry.
const MAX_UDP_PAYLOAD: usize = 65507;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.server.listen_addr.trim().is_empty() {
        errors.push("server.listen_addr must not be empty".to_string());
    }
    if config.server.max_datagram_size == 0 || config.server.max_datagram_size > MAX_UDP_PAYLOAD {
        errors.push(format!(
            "server.max_datagram_size must be in [1, {}]",
            MAX_UDP_PAYLOAD
        ));
    }

    if config.defaults.timeout.is_zero() {
        errors.push("defaults.timeout must be > 0".to_string());
    }
    if config.defaults.action_timeout.is_zero() {
        errors.push("defaults.action_timeout must be > 0".to_string());
    }
    let mut names: Vec<&String> = config.defaults.actions.keys().collect();
    names.sort();
    for name in names {
        if name.trim().is_empty() || config.defaults.actions[name].trim().is_empty() {
            errors.push(format!(
                "defaults.actions entry '{}' needs a name and a command",
                name
            ));
        }
    }

    let format = config.logging.format.to_lowercase();
    if format != "text" && format != "json" {
        errors.push("logging.format must be either \"text\" or \"json\"".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
