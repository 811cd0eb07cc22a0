use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

fn default_address() -> String {
    "127.0.0.1:5001".into()
}
fn default_log_filter() -> String {
    "info".into()
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Server configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address (default: `127.0.0.1:5001`).
    #[serde(default = "default_address")]
    pub address: String,

    /// Root seed for per-connection action sampling. Entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Serve `configure` and `wrap` instead of refusing them.
    #[serde(default)]
    pub extensions_enabled: bool,

    /// Destination root for `upload`. Uploads are refused when absent.
    #[serde(default)]
    pub publish_dir: Option<PathBuf>,

    /// Default tracing filter when `RUST_LOG` is unset (default: `info`).
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            seed: None,
            extensions_enabled: false,
            publish_dir: None,
            log_filter: default_log_filter(),
        }
    }
}

impl ServerConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log_filter".into(),
                message: "must not be empty".into(),
            });
        }
        if let Some(dir) = &self.publish_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "publish_dir".into(),
                    message: "must not be empty".into(),
                });
            }
        }
        Ok(())
    }

    /// The listen address, parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                field: "address".into(),
                message: format!("{:?}: {e}", self.address),
            })
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.address, "127.0.0.1:5001");
        assert_eq!(config.log_filter, "info");
        assert!(!config.extensions_enabled);
    }

    #[test]
    fn full_file_parses() {
        let config = ServerConfig::from_toml(
            r#"
            address = "0.0.0.0:6000"
            seed = 42
            extensions_enabled = true
            publish_dir = "/srv/gym"
            log_filter = "gymsock=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 6000);
        assert_eq!(config.seed, Some(42));
        assert!(config.extensions_enabled);
        assert_eq!(config.publish_dir, Some(PathBuf::from("/srv/gym")));
        assert_eq!(config.log_filter, "gymsock=debug");
    }

    #[test]
    fn bad_address_is_rejected() {
        let err = ServerConfig::from_toml(r#"address = "localhost""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "address"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = ServerConfig::from_toml("port = 5001").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn empty_log_filter_is_rejected() {
        let err = ServerConfig::from_toml(r#"log_filter = " ""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ServerConfig::from_file("/nonexistent/gymsock.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
