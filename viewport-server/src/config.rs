use std::path::PathBuf;
use std::time::Duration;

use common::{DispatchError, Result};
use serde::{Deserialize, Serialize};

use crate::relay::IdlePolicy;
use crate::session::ErrorRecoveryPolicy;

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Subscriber-facing relay settings
    pub relay: RelayConfig,

    /// Upstream NVR connection settings
    pub upstream: UpstreamConfig,

    /// Live feed reconnect policy
    pub recovery: ErrorRecoveryPolicy,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the WebSocket relay binds to
    pub host: String,

    /// WebSocket relay port
    pub port: u16,

    /// Endpoint advertised to viewers in stream reports
    pub public_url: String,

    /// What happens to the upstream feed when a topic loses its last subscriber
    pub idle_policy: IdlePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Bound on the login round trip
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub login_timeout: Duration,

    /// Bound on the camera inventory fetch
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub bootstrap_timeout: Duration,

    /// Bound on opening a camera's live feed
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub feed_open_timeout: Duration,

    /// Verify NVR TLS certificates (controllers usually ship self-signed ones)
    pub verify_tls: bool,

    /// Camera channel requested for live feeds (0 = highest quality)
    pub livestream_channel: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8087,
            public_url: "ws://127.0.0.1:8087".to_string(),
            idle_policy: IdlePolicy::KeepOpen,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(10),
            bootstrap_timeout: Duration::from_secs(15),
            feed_open_timeout: Duration::from_secs(10),
            verify_tls: false,
            livestream_channel: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration manager for loading, saving, and validating configurations
pub struct ConfigManager {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: AppConfig::default(),
        }
    }

    /// Load configuration from file
    pub async fn load(&mut self) -> Result<()> {
        if !self.config_path.exists() {
            // Create default configuration file
            self.save().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| DispatchError::Config(format!("Failed to read config file: {}", e)))?;

        self.config = toml::from_str(&content)
            .map_err(|e| DispatchError::Config(format!("Failed to parse config file: {}", e)))?;

        self.validate()?;
        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| DispatchError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    DispatchError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        tokio::fs::write(&self.config_path, content)
            .await
            .map_err(|e| DispatchError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Get a mutable reference to the configuration
    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let relay = &self.config.relay;
        if relay.host.is_empty() {
            return Err(DispatchError::Config("Relay host cannot be empty".to_string()));
        }

        if relay.port == 0 {
            return Err(DispatchError::Config(
                "Relay port must be greater than 0".to_string(),
            ));
        }

        if !(relay.public_url.starts_with("ws://") || relay.public_url.starts_with("wss://")) {
            return Err(DispatchError::Config(format!(
                "Relay public url must use ws:// or wss://, got '{}'",
                relay.public_url
            )));
        }

        let upstream = &self.config.upstream;
        if upstream.login_timeout.is_zero()
            || upstream.bootstrap_timeout.is_zero()
            || upstream.feed_open_timeout.is_zero()
        {
            return Err(DispatchError::Config(
                "Upstream timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Consume the manager and keep the loaded configuration
    pub fn into_config(self) -> AppConfig {
        self.config
    }
}

/// Environment-based configuration override
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    /// Apply environment variable overrides to configuration
    pub fn apply_overrides(config: &mut AppConfig) {
        use std::env;

        if let Ok(host) = env::var("VIEWPORT_RELAY_HOST") {
            config.relay.host = host;
        }
        if let Ok(port) = env::var("VIEWPORT_RELAY_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.relay.port = port;
            }
        }
        if let Ok(url) = env::var("VIEWPORT_PUBLIC_URL") {
            config.relay.public_url = url;
        }
        if let Ok(verify) = env::var("VIEWPORT_VERIFY_TLS") {
            config.upstream.verify_tls = verify.to_lowercase() == "true";
        }
        if let Ok(level) = env::var("VIEWPORT_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RetryStrategy;

    #[tokio::test]
    async fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewport.toml");

        let mut manager = ConfigManager::new(path.clone());
        manager.load().await.unwrap();

        assert!(path.exists());
        assert_eq!(manager.get_config().relay.port, 8087);
        assert_eq!(manager.get_config().relay.idle_policy, IdlePolicy::KeepOpen);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewport.toml");
        tokio::fs::write(
            &path,
            r#"
[relay]
port = 9000
idle_policy = "close_upstream"

[upstream]
login_timeout = 2500

[recovery]
max_retries = 1
retry_strategy = "immediate"
"#,
        )
        .await
        .unwrap();

        let mut manager = ConfigManager::new(path);
        manager.load().await.unwrap();
        let config = manager.get_config();

        assert_eq!(config.relay.port, 9000);
        assert_eq!(config.relay.host, "0.0.0.0");
        assert_eq!(config.relay.idle_policy, IdlePolicy::CloseUpstream);
        assert_eq!(config.upstream.login_timeout, Duration::from_millis(2500));
        assert_eq!(config.upstream.bootstrap_timeout, Duration::from_secs(15));
        assert_eq!(config.recovery.max_retries, 1);
        assert_eq!(config.recovery.retry_strategy, RetryStrategy::Immediate);
    }

    #[test]
    fn test_validate_rejects_bad_public_url() {
        let mut manager = ConfigManager::new(PathBuf::from("unused.toml"));
        manager.get_config_mut().relay.public_url = "http://viewer".to_string();
        assert!(matches!(manager.validate(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut manager = ConfigManager::new(PathBuf::from("unused.toml"));
        manager.get_config_mut().upstream.login_timeout = Duration::ZERO;
        assert!(manager.validate().is_err());
    }
}
