//! Configuration file and environment loading
//!
//! The effective configuration is built in three layers: built-in defaults,
//! then `config.json` deep-merged on top, then `WATCHDOG__`-prefixed
//! environment variables, where `__` separates path segments
//! (`WATCHDOG__DEFAULTS__ALERT_LIMIT=-1`).

use super::schema::Config;
use super::validate::validate_config;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// File name inside the config directory
pub const CONFIG_FILE: &str = "config.json";

/// Prefix of environment variables that override config values
pub const ENV_PREFIX: &str = "WATCHDOG__";

/// Loads and saves `config.json` in one directory
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Use `~/.watchdog`, or `./.watchdog` when there is no home directory
    pub fn new() -> Self {
        let config_dir = match dirs::home_dir() {
            Some(home) => home.join(".watchdog"),
            None => PathBuf::from(".watchdog"),
        };
        Self { config_dir }
    }

    /// Use a custom config directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Build the effective configuration and validate it
    pub fn load(&self) -> crate::Result<Config> {
        let mut layered = serde_json::to_value(Config::default())?;

        if let Some(file) = self.read_file()? {
            deep_merge(&mut layered, file);
        }
        for (path, value) in env_overrides(std::env::vars()) {
            insert_at_path(&mut layered, &path, value);
        }

        let config: Config = serde_json::from_value(layered)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Write `config` as pretty JSON, creating the directory if needed
    pub fn save(&self, config: &Config) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let mut content = serde_json::to_string_pretty(config)?;
        content.push('\n');
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// The config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Full path of the config file
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    fn read_file(&self) -> crate::Result<Option<Value>> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Objects merge key by key; anything else in `overlay` replaces `base`
fn deep_merge(base: &mut Value, overlay: Value) {
    let Value::Object(overlay_map) = overlay else {
        *base = overlay;
        return;
    };
    let Value::Object(base_map) = base else {
        *base = Value::Object(overlay_map);
        return;
    };
    for (key, value) in overlay_map {
        match base_map.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base_map.insert(key, value);
            }
        }
    }
}

/// Lower-cased path segments and parsed values for every prefixed variable
fn env_overrides<I>(vars: I) -> Vec<(Vec<String>, Value)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides: Vec<(Vec<String>, Value)> = vars
        .into_iter()
        .filter_map(|(name, raw)| {
            let suffix = name.strip_prefix(ENV_PREFIX)?;
            let path: Vec<String> = suffix
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(str::to_ascii_lowercase)
                .collect();
            (!path.is_empty()).then(|| (path, parse_env_value(&raw)))
        })
        .collect();
    // Deterministic when two variables target the same path.
    overrides.sort_by(|a, b| a.0.cmp(&b.0));
    overrides
}

/// JSON when the value parses as JSON, a bool for any casing of true/false,
/// otherwise the raw string
fn parse_env_value(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Set `value` at `path`, replacing non-objects along the way
fn insert_at_path(root: &mut Value, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *root = value;
        return;
    };
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    if let Value::Object(map) = root {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        insert_at_path(child, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::config::schema::SourceRestriction;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    struct EnvVarGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe { std::env::set_var(key, value) };
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.original {
                // SAFETY: tests serialize env mutations with ENV_LOCK.
                unsafe { std::env::set_var(&self.key, value) };
            } else {
                // SAFETY: tests serialize env mutations with ENV_LOCK.
                unsafe { std::env::remove_var(&self.key) };
            }
        }
    }

    fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_load_default_config() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());
        let config = loader.load().unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:3212");
        assert_eq!(config.defaults.timeout, Duration::from_secs(30));
        assert_eq!(config.defaults.alert_limit, 10);
    }

    #[test]
    fn test_save_and_load_config() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());

        let mut config = Config::default();
        config.defaults.alert_text = "backup job missed".to_string();
        config.defaults.timeout = Duration::from_millis(1500);

        loader.save(&config).unwrap();
        let loaded = loader.load().unwrap();

        assert_eq!(loaded.defaults.alert_text, "backup job missed");
        assert_eq!(loaded.defaults.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_load_merges_partial_file() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());

        std::fs::write(
            temp_dir.path().join("config.json"),
            r#"{"server":{"restrict_source":"ip"},"defaults":{"alert_once":true}}"#,
        )
        .unwrap();

        let config = loader.load().unwrap();
        assert_eq!(config.server.restrict_source, SourceRestriction::Ip);
        assert_eq!(config.server.listen_addr, "0.0.0.0:3212");
        assert!(config.defaults.alert_once);
        assert_eq!(config.defaults.alert_text, "timeout");
    }

    #[test]
    fn test_load_applies_path_env_overrides() {
        let _lock = lock_env();
        let _addr_guard = EnvVarGuard::set("WATCHDOG__SERVER__LISTEN_ADDR", "127.0.0.1:4000");
        let _limit_guard = EnvVarGuard::set("WATCHDOG__DEFAULTS__ALERT_LIMIT", "-1");
        let _timeout_guard = EnvVarGuard::set("WATCHDOG__DEFAULTS__TIMEOUT", "2m");
        let _once_guard = EnvVarGuard::set("WATCHDOG__DEFAULTS__ALERT_ONCE", "true");

        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());
        let config = loader.load().unwrap();

        assert_eq!(config.server.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.defaults.alert_limit, -1);
        assert_eq!(config.defaults.timeout, Duration::from_secs(120));
        assert!(config.defaults.alert_once);
    }

    #[test]
    fn test_path_env_overrides_file() {
        let _lock = lock_env();
        let _text_guard = EnvVarGuard::set("WATCHDOG__DEFAULTS__ALERT_TEXT", "from env");

        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());
        std::fs::write(
            temp_dir.path().join("config.json"),
            r#"{"defaults":{"alert_text":"from file"}}"#,
        )
        .unwrap();

        let config = loader.load().unwrap();
        assert_eq!(config.defaults.alert_text, "from env");
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let _lock = lock_env();
        let _timeout_guard = EnvVarGuard::set("WATCHDOG__DEFAULTS__TIMEOUT", "0s");

        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());
        let err = loader.load().unwrap_err();
        assert!(err.to_string().contains("defaults.timeout"));
    }

    #[test]
    fn test_env_overrides_parse_paths_and_values() {
        let vars = vec![
            ("WATCHDOG__DEFAULTS__ALERT_ONCE".to_string(), "TRUE".to_string()),
            ("WATCHDOG__SERVER__LISTEN_ADDR".to_string(), "127.0.0.1:9".to_string()),
            ("WATCHDOG__".to_string(), "ignored".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let overrides = env_overrides(vars);

        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides[0].0, vec!["defaults", "alert_once"]);
        assert_eq!(overrides[0].1, Value::Bool(true));
        assert_eq!(overrides[1].0, vec!["server", "listen_addr"]);
        assert_eq!(overrides[1].1, Value::String("127.0.0.1:9".to_string()));
    }

    #[test]
    fn test_deep_merge_keeps_unrelated_keys() {
        let mut base = serde_json::json!({"server": {"listen_addr": "a", "max_datagram_size": 1024}});
        deep_merge(&mut base, serde_json::json!({"server": {"listen_addr": "b"}, "extra": 1}));
        assert_eq!(
            base,
            serde_json::json!({"server": {"listen_addr": "b", "max_datagram_size": 1024}, "extra": 1})
        );
    }

    #[test]
    fn test_insert_at_path_replaces_scalars() {
        let mut root = serde_json::json!({"defaults": 3});
        insert_at_path(
            &mut root,
            &["defaults".to_string(), "timeout".to_string()],
            Value::String("2m".to_string()),
        );
        assert_eq!(root, serde_json::json!({"defaults": {"timeout": "2m"}}));
    }
}
