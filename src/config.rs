use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::ethereum::connection::Connection;
use crate::ethereum::contract::{DEFAULT_RECEIPT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub tls: TlsConfig,
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsConfig {
    pub enabled: bool,
    pub ca_cert_path: Option<PathBuf>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    pub liveness_timeout_secs: u64,
    pub liveness_interval_ms: u64,
    pub receipt_timeout_secs: u64,
    pub receipt_interval_ms: u64,
}

fn default_request_timeout_secs() -> u64 {
    5
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            liveness_timeout_secs: 30,
            liveness_interval_ms: 1000,
            receipt_timeout_secs: DEFAULT_RECEIPT_TIMEOUT.as_secs(),
            receipt_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl PollingConfig {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                url: "http://127.0.0.1:8545".to_string(),
                request_timeout_secs: default_request_timeout_secs(),
                tls: TlsConfig::default(),
                auth: None,
            },
            polling: PollingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    /// Apply `LEDGER_*` environment variable overrides
    pub fn apply_env_vars(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("LEDGER_NODE_URL") {
            tracing::debug!("Using LEDGER_NODE_URL for the node endpoint");
            self.node.url = url;
        }

        if let Some(ca_cert) = var("LEDGER_CA_CERT") {
            tracing::debug!("Using LEDGER_CA_CERT, TLS verification enabled");
            self.node.tls.enabled = true;
            self.node.tls.ca_cert_path = Some(PathBuf::from(ca_cert));
        }

        match (var("LEDGER_USERNAME"), var("LEDGER_PASSWORD")) {
            (Some(username), Some(password)) => {
                self.node.auth = Some(AuthConfig { username, password });
            }
            (Some(username), None) => match self.node.auth.as_mut() {
                Some(auth) => auth.username = username,
                None => tracing::warn!("LEDGER_USERNAME is set without LEDGER_PASSWORD, ignoring"),
            },
            (None, Some(password)) => match self.node.auth.as_mut() {
                Some(auth) => auth.password = password,
                None => tracing::warn!("LEDGER_PASSWORD is set without LEDGER_USERNAME, ignoring"),
            },
            (None, None) => {}
        }
    }

    /// Builds a connection as configured: TLS, then login, then a liveness wait.
    pub async fn connect(&self) -> Result<Connection> {
        let mut connection = Connection::with_timeout(
            &self.node.url,
            Duration::from_secs(self.node.request_timeout_secs),
        )?;

        if self.node.tls.enabled {
            connection = connection.with_tls(self.node.tls.ca_cert_path.as_deref())?;
        }

        if let Some(auth) = &self.node.auth {
            connection = connection
                .with_authentication(&auth.username, &auth.password)
                .await?;
        }

        connection
            .wait_for_liveness(
                self.polling.liveness_timeout(),
                self.polling.liveness_interval(),
            )
            .await?;

        Ok(connection)
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("ledger-adapter").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Ledger adapter configuration file

[node]
url = "https://ledger-node.example:8545"
request_timeout_secs = 5

# Certificate verification is off unless enabled here.
[node.tls]
enabled = true
# ca_cert_path = "/etc/ledger/ca.pem"  # pin to this CA bundle instead of the system store

[node.auth]
username = "ledger-user"
password = "change-me"

[polling]
liveness_timeout_secs = 30
liveness_interval_ms = 1000
receipt_timeout_secs = 120
receipt_interval_ms = 100

# Environment variables that can be used:
# LEDGER_NODE_URL - overrides node.url
# LEDGER_USERNAME / LEDGER_PASSWORD - node credentials
# LEDGER_CA_CERT - CA bundle path, enables TLS verification
"#;
        sample_config.to_string()
    }
}
