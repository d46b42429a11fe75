use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Session state machine settings
    pub session: SessionConfig,

    /// Frame queue limits and backpressure watermarks
    pub queue: QueueConfig,

    /// Local producer settings
    pub producer: ProducerConfig,

    /// Recording sink settings
    pub sink: SinkConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a session may wait in `Connecting` for its init segment, 0 disables
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout.is_zero() {
            None
        } else {
            Some(self.connect_timeout)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Hard limit of pending segments
    pub capacity: usize,

    /// Queue depth at which the producer is asked to pause
    pub high_watermark: usize,

    /// Queue depth at which a paused producer is resumed
    pub low_watermark: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Delay between replayed frames, 0 replays as fast as the consumer allows
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub frame_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Directory receiving recorded streams
    pub output_dir: PathBuf,

    /// Codec families the sink accepts (prefix of the codec string)
    pub supported_codecs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            high_watermark: 256,
            low_watermark: 64,
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::ZERO,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            supported_codecs: ["avc1", "avc3", "hvc1", "hev1", "mp4a", "vp09", "av01"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
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

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "Queue capacity must be greater than 0".to_string(),
            });
        }

        if self.queue.high_watermark > self.queue.capacity {
            return Err(ConfigError::Invalid {
                message: "Queue high watermark cannot exceed capacity".to_string(),
            });
        }

        if self.queue.low_watermark >= self.queue.high_watermark {
            return Err(ConfigError::Invalid {
                message: "Queue low watermark must be below the high watermark".to_string(),
            });
        }

        if self.sink.supported_codecs.is_empty() {
            return Err(ConfigError::Invalid {
                message: "At least one codec family must be supported".to_string(),
            });
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Invalid {
                    message: format!("Unknown log level: {}", other),
                });
            }
        }

        Ok(())
    }
}

/// Configuration manager for loading, saving, and validating configurations
pub struct ConfigManager {
    config_path: PathBuf,
    config: ClientConfig,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: ClientConfig::default(),
        }
    }

    /// Load configuration from file, writing the defaults when it does not exist yet
    pub async fn load(&mut self) -> Result<(), ConfigError> {
        if !self.config_path.exists() {
            self.save().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(ConfigError::Read)?;

        self.config = toml::from_str(&content)?;
        self.config.validate()?;
        Ok(())
    }

    pub async fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&self.config)?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(ConfigError::Write)?;
            }
        }

        tokio::fs::write(&self.config_path, content)
            .await
            .map_err(ConfigError::Write)?;

        Ok(())
    }

    pub fn get_config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Environment-based configuration override
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    /// Apply environment variable overrides to configuration
    pub fn apply_overrides(config: &mut ClientConfig) {
        use std::env;

        if let Ok(dir) = env::var("PLAYGO_OUTPUT_DIR") {
            config.sink.output_dir = PathBuf::from(dir);
        }
        if let Ok(capacity) = env::var("PLAYGO_QUEUE_CAPACITY") {
            if let Ok(capacity) = capacity.parse::<usize>() {
                config.queue.capacity = capacity;
            }
        }
        if let Ok(timeout) = env::var("PLAYGO_CONNECT_TIMEOUT_MS") {
            if let Ok(millis) = timeout.parse::<u64>() {
                config.session.connect_timeout = Duration::from_millis(millis);
            }
        }
        if let Ok(interval) = env::var("PLAYGO_FRAME_INTERVAL_MS") {
            if let Ok(millis) = interval.parse::<u64>() {
                config.producer.frame_interval = Duration::from_millis(millis);
            }
        }
        if let Ok(level) = env::var("PLAYGO_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.session.connect_timeout(),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_zero_timeout_disables_connect_timer() {
        let mut config = ClientConfig::default();
        config.session.connect_timeout = Duration::ZERO;
        assert_eq!(config.session.connect_timeout(), None);
    }

    #[test]
    fn test_watermark_validation() {
        let mut config = ClientConfig::default();
        config.queue.low_watermark = config.queue.high_watermark;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.queue.high_watermark = config.queue.capacity + 1;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [queue]
            capacity = 32
            high_watermark = 16
            low_watermark = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.capacity, 32);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("playgo.toml");

        let mut manager = ConfigManager::new(path.clone());
        manager.load().await.unwrap();
        assert!(path.exists());

        let mut reloaded = ConfigManager::new(path);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get_config().queue.capacity, 512);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playgo.toml");
        tokio::fs::write(&path, "[queue]\ncapacity = 0\n").await.unwrap();

        let mut manager = ConfigManager::new(path);
        assert!(matches!(
            manager.load().await,
            Err(ConfigError::Invalid { .. })
        ));
    }
}
