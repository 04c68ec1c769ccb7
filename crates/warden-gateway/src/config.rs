//! Daemon configuration: TOML file plus environment overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3434";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Durable state settings.
    pub storage: StorageConfig,
    /// Consent broker settings.
    pub consent: ConsentConfig,
    /// Token store settings.
    pub tokens: TokensConfig,
    /// Fan-out settings.
    pub events: EventsConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Loopback address to bind.
    pub listen: String,
    /// Accepted API keys. Empty means unauthenticated dev mode.
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            api_keys: Vec::new(),
        }
    }
}

/// Durable state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory: KV store, journal day files, templates.
    pub data_dir: PathBuf,
    /// Run fully in memory. Must be selected explicitly; nothing survives
    /// a restart.
    pub ephemeral: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./warden-data"),
            ephemeral: false,
        }
    }
}

impl StorageConfig {
    /// The watched template directory.
    #[must_use]
    pub fn template_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }

    /// The journal directory.
    #[must_use]
    pub fn journal_dir(&self) -> PathBuf {
        self.data_dir.join("journal")
    }

    /// The embedded KV directory.
    #[must_use]
    pub fn kv_dir(&self) -> PathBuf {
        self.data_dir.join("kv")
    }
}

/// Consent broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// Ticket timeout ceiling in seconds.
    pub default_timeout_secs: u64,
    /// Bound on outstanding tickets per agent.
    pub max_pending_per_agent: usize,
    /// Expiry sweep interval in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 120,
            max_pending_per_agent: 32,
            sweep_interval_secs: 5,
        }
    }
}

/// Token store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    /// Ceiling on requested token lifetimes, in seconds.
    pub max_duration_secs: u64,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: warden_tokens::store::DEFAULT_MAX_DURATION_SECS,
        }
    }
}

/// Fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Per-subscription queue bound.
    pub subscription_capacity: usize,
    /// Webhook delivery queue bound.
    pub webhook_queue_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscription_capacity: warden_events::DEFAULT_SUBSCRIPTION_CAPACITY,
            webhook_queue_capacity: 256,
        }
    }
}

/// Severity of a configuration finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    /// Boot continues.
    Warning,
    /// Boot must not continue.
    Error,
}

/// One configuration finding.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    /// How bad it is.
    pub severity: ConfigSeverity,
    /// What is wrong.
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl WardenConfig {
    /// Load configuration: the TOML file (when present) with environment
    /// overrides applied on top.
    ///
    /// Overrides: `WARDEN_LISTEN`, `WARDEN_DATA_DIR`, `WARDEN_API_KEY`
    /// (appended to the key list).
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let default_path = PathBuf::from("warden.toml");
        let path = path.map_or(default_path, Path::to_path_buf);

        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            toml::from_str(&text).map_err(|e| format!("cannot parse {}: {e}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(listen) = std::env::var("WARDEN_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(dir) = std::env::var("WARDEN_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(key) = std::env::var("WARDEN_API_KEY") {
            if !key.is_empty() {
                config.server.api_keys.push(key);
            }
        }

        Ok(config)
    }

    /// Validate the configuration, collecting findings.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: format!("server.listen is not a socket address: {}", self.server.listen),
            });
        }
        if self.server.api_keys.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "no API keys configured; all requests are accepted (dev mode)"
                    .to_string(),
            });
        }
        if self.server.api_keys.iter().any(String::is_empty) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "empty API key configured".to_string(),
            });
        }
        if self.consent.default_timeout_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "consent.default_timeout_secs must be positive".to_string(),
            });
        }
        if self.consent.max_pending_per_agent == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "consent.max_pending_per_agent must be positive".to_string(),
            });
        }
        if self.tokens.max_duration_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "tokens.max_duration_secs must be positive".to_string(),
            });
        }
        if self.storage.ephemeral {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "storage.ephemeral is set; nothing will survive a restart".to_string(),
            });
        }

        issues
    }

    /// Whether any finding is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WardenConfig::default();
        assert!(!config.has_errors());
        assert_eq!(config.server.listen, DEFAULT_LISTEN);
        assert_eq!(config.consent.default_timeout_secs, 120);
    }

    #[test]
    fn test_parse_toml() {
        let config: WardenConfig = toml::from_str(
            r#"
[server]
listen = "127.0.0.1:9999"
api_keys = ["k1", "k2"]

[storage]
data_dir = "/var/lib/warden"

[consent]
default_timeout_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9999");
        assert_eq!(config.server.api_keys.len(), 2);
        assert_eq!(config.consent.default_timeout_secs, 30);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.consent.max_pending_per_agent, 32);
        assert_eq!(
            config.storage.template_dir(),
            PathBuf::from("/var/lib/warden/templates")
        );
    }

    #[test]
    fn test_bad_listen_is_error() {
        let mut config = WardenConfig::default();
        config.server.listen = "not-an-address".to_string();
        assert!(config.has_errors());
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = WardenConfig::default();
        config.consent.default_timeout_secs = 0;
        assert!(config.has_errors());
    }

    #[test]
    fn test_no_keys_is_warning_only() {
        let config = WardenConfig::default();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Warning && i.message.contains("dev mode")));
        assert!(!config.has_errors());
    }
}
