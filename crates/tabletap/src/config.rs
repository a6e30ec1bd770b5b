//! Configuration loading
//!
//! Configuration lives in a properties-style `KEY=VALUE` file. The file
//! path comes from the `TABLETAP_CONFIG` environment variable, falling
//! back to `/etc/tabletap/main.conf`. Individual keys may additionally be
//! overridden through environment variables of the same name.
//!
//! Only the broker URI is hard-required, and only by the daemon; every
//! other key has a defined fallback so the registration commands work from
//! an empty file.

use crate::error::{Result, TapError};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Environment variable overriding the configuration file path.
pub const ENV_CONFIG_FILE: &str = "TABLETAP_CONFIG";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tabletap/main.conf";

/// Namespace used when `REGISTRY_LIBRARY` is not configured.
pub const DEFAULT_LIBRARY: &str = "TABLETAP";

const KEY_BROKER_URI: &str = "BROKER_URI";
const KEY_REGISTRY_LIBRARY: &str = "REGISTRY_LIBRARY";
const KEY_QUEUE_USERNAME: &str = "QUEUE_USERNAME";
const KEY_QUEUE_PASSWORD: &str = "QUEUE_PASSWORD";
const KEY_QUEUE_HOSTNAME: &str = "QUEUE_HOSTNAME";

/// Resolved configuration for the manager and the daemon.
#[derive(Debug, Clone)]
pub struct TapConfig {
    /// Message-bus broker address. Required by the daemon; registration
    /// commands never read it.
    pub broker_uri: Option<String>,
    /// Namespace (library) holding every generated trigger, staging
    /// variable, and event queue.
    pub library: String,
    /// Credentials and host for the queue-consumption side.
    pub queue_username: String,
    pub queue_password: String,
    pub queue_hostname: String,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            broker_uri: None,
            library: DEFAULT_LIBRARY.to_string(),
            queue_username: "*CURRENT".to_string(),
            queue_password: "*CURRENT".to_string(),
            queue_hostname: "localhost".to_string(),
        }
    }
}

impl TapConfig {
    /// Load configuration from the resolved file path plus environment
    /// overrides. A configured-but-missing file is an error; an absent
    /// default file is not.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(ENV_CONFIG_FILE).ok();
        let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut values = HashMap::new();
        if Path::new(&path).exists() {
            values = parse_properties(&std::fs::read_to_string(&path)?)?;
        } else if explicit.is_some() {
            return Err(TapError::config(format!(
                "configuration file is not found: {path}"
            )));
        }

        for key in [
            KEY_BROKER_URI,
            KEY_REGISTRY_LIBRARY,
            KEY_QUEUE_USERNAME,
            KEY_QUEUE_PASSWORD,
            KEY_QUEUE_HOSTNAME,
        ] {
            if let Ok(value) = std::env::var(key) {
                values.insert(key.to_string(), value);
            }
        }

        Ok(Self::from_values(values))
    }

    /// Build a configuration from a parsed key/value map, applying
    /// documented fallbacks for everything but the broker URI.
    pub fn from_values(values: HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let library = match values.get(KEY_REGISTRY_LIBRARY) {
            Some(library) if !library.trim().is_empty() => library.trim().to_uppercase(),
            _ => {
                warn!(
                    "{KEY_REGISTRY_LIBRARY} is not configured, using default '{DEFAULT_LIBRARY}'"
                );
                defaults.library
            }
        };
        Self {
            broker_uri: values.get(KEY_BROKER_URI).cloned().filter(|v| !v.is_empty()),
            library,
            queue_username: values
                .get(KEY_QUEUE_USERNAME)
                .cloned()
                .unwrap_or(defaults.queue_username),
            queue_password: values
                .get(KEY_QUEUE_PASSWORD)
                .cloned()
                .unwrap_or(defaults.queue_password),
            queue_hostname: values
                .get(KEY_QUEUE_HOSTNAME)
                .cloned()
                .unwrap_or(defaults.queue_hostname),
        }
    }

    /// The broker URI, or the error the daemon treats as fatal.
    pub fn require_broker(&self) -> Result<&str> {
        self.broker_uri
            .as_deref()
            .ok_or(TapError::ConfigMissing(KEY_BROKER_URI))
    }
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped; a
/// non-blank line without `=` is a parse error.
fn parse_properties(contents: &str) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            TapError::config(format!("malformed line {} in configuration", lineno + 1))
        })?;
        values.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let values = parse_properties(
            "# comment\n\nBROKER_URI=broker:9092\nREGISTRY_LIBRARY = streams \n",
        )
        .unwrap();
        assert_eq!(values.get("BROKER_URI").unwrap(), "broker:9092");
        assert_eq!(values.get("REGISTRY_LIBRARY").unwrap(), "streams");
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        assert!(parse_properties("BROKER_URI broker:9092").is_err());
    }

    #[test]
    fn test_defaults_applied() {
        let config = TapConfig::from_values(HashMap::new());
        assert!(config.broker_uri.is_none());
        assert_eq!(config.library, DEFAULT_LIBRARY);
        assert_eq!(config.queue_username, "*CURRENT");
        assert_eq!(config.queue_hostname, "localhost");
    }

    #[test]
    fn test_library_folds_to_uppercase() {
        let mut values = HashMap::new();
        values.insert("REGISTRY_LIBRARY".to_string(), "streams".to_string());
        let config = TapConfig::from_values(values);
        assert_eq!(config.library, "STREAMS");
    }

    #[test]
    fn test_require_broker() {
        let mut values = HashMap::new();
        assert!(matches!(
            TapConfig::from_values(values.clone()).require_broker(),
            Err(TapError::ConfigMissing("BROKER_URI"))
        ));

        values.insert("BROKER_URI".to_string(), "broker:9092".to_string());
        assert_eq!(
            TapConfig::from_values(values).require_broker().unwrap(),
            "broker:9092"
        );
    }
}
