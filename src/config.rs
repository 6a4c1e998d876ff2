/// Settings
///
/// Loaded with the `config` crate from an optional TOML file plus
/// `SCRIPTSCAN__<SECTION>__<KEY>` environment overrides, e.g.
/// `SCRIPTSCAN__NODE__PORT=18332`.

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::SettingsError;
use crate::telemetry::TelemetryConfig;

pub const DEFAULT_CONFIG_FILE: &str = "scriptscan.toml";
pub const ENV_PREFIX: &str = "SCRIPTSCAN";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Only "Bitcoin Core" is supported
    pub node_type: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            node_type: crate::node::BITCOIN_CORE.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8332,
            username: String::new(),
            password: String::new(),
            timeout_secs: 30,
        }
    }
}

impl NodeSettings {
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub block_capacity: usize,
    pub tx_capacity: usize,
    /// Entries older than this are fetched again
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            block_capacity: 100,
            tx_capacity: 10_000,
            ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExplorerSettings {
    /// Upper bound on previous-output fetches in flight for one transaction
    pub max_concurrent_fetches: usize,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        ExplorerSettings {
            max_concurrent_fetches: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
    pub file: Option<String>,
    /// "daily", "hourly" or "never"
    pub rotation: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        let telemetry = TelemetryConfig::default();
        LoggingSettings {
            level: telemetry.log_level,
            format: telemetry.log_format,
            file: telemetry.log_file,
            rotation: telemetry.rotation,
        }
    }
}

impl LoggingSettings {
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.level.clone(),
            log_format: self.format.clone(),
            log_file: self.file.clone(),
            rotation: self.rotation.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub node: NodeSettings,
    pub cache: CacheSettings,
    pub explorer: ExplorerSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load from `path` (missing file is fine) and the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |key: &str, reason: &str| {
            Err(SettingsError::Invalid {
                key: key.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.node.host.is_empty() {
            return invalid("node.host", "must not be empty");
        }
        if self.node.port == 0 {
            return invalid("node.port", "must not be 0");
        }
        if self.node.timeout_secs == 0 {
            return invalid("node.timeout_secs", "must be at least 1");
        }
        if self.cache.block_capacity == 0 {
            return invalid("cache.block_capacity", "must be at least 1");
        }
        if self.cache.tx_capacity == 0 {
            return invalid("cache.tx_capacity", "must be at least 1");
        }
        if self.explorer.max_concurrent_fetches == 0 {
            return invalid("explorer.max_concurrent_fetches", "must be at least 1");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return invalid("logging.format", "expected json or pretty");
        }
        if !matches!(self.logging.rotation.as_str(), "daily" | "hourly" | "never") {
            return invalid("logging.rotation", "expected daily, hourly or never");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.node.node_type, "Bitcoin Core");
        assert_eq!(settings.node.url(), "http://127.0.0.1:8332/");
        assert_eq!(settings.cache, CacheSettings::default());
        assert_eq!(settings.explorer.max_concurrent_fetches, 16);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
            [node]
            host = "10.0.0.5"
            port = 18332
            username = "rpcuser"

            [cache]
            tx_capacity = 50
            "#,
        );
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.node.url(), "http://10.0.0.5:18332/");
        assert_eq!(settings.node.username, "rpcuser");
        assert_eq!(settings.node.timeout_secs, 30);
        assert_eq!(settings.cache.tx_capacity, 50);
        assert_eq!(settings.cache.block_capacity, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("[explorer]\nmax_concurrent_fetches = 0\n");
        match Settings::load(file.path()) {
            Err(SettingsError::Invalid { key, .. }) => {
                assert_eq!(key, "explorer.max_concurrent_fetches")
            }
            other => panic!("expected invalid setting, got {:?}", other),
        }

        let file = write_config("[logging]\nformat = \"xml\"\n");
        assert!(matches!(
            Settings::load(file.path()),
            Err(SettingsError::Invalid { .. })
        ));
    }

    #[test]
    fn test_telemetry_config_from_logging() {
        let logging = LoggingSettings {
            level: "debug".to_string(),
            format: "json".to_string(),
            file: Some("/tmp/scriptscan.log".to_string()),
            rotation: "never".to_string(),
        };
        let telemetry = logging.telemetry_config();
        assert_eq!(telemetry.log_level, "debug");
        assert_eq!(telemetry.log_file.as_deref(), Some("/tmp/scriptscan.log"));
    }
}
