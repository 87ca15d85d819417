use config::{Config, ConfigError, File};
use nocodo_stream::StreamSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub questions: QuestionsConfig,
    pub streams: StreamsConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct QuestionsConfig {
    /// How long a collector waits for a question it cannot see yet
    pub lookup_grace_ms: u64,
    /// How long settled questions stay around to reject late resolutions
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    /// Cap on any blocking HTTP wait
    pub max_wait_secs: u64,
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            lookup_grace_ms: 250,
            retention_secs: 300,
            sweep_interval_secs: 15,
            max_wait_secs: 600,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StreamsConfig {
    pub close_grace_ms: u64,
    pub write_timeout_ms: u64,
    pub orphan_threshold_secs: u64,
    pub channel_capacity: usize,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            close_grace_ms: 5000,
            write_timeout_ms: 10000,
            orphan_threshold_secs: 1800,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the daily rolling log file, next to the data dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl QuestionsConfig {
    pub fn lookup_grace(&self) -> Duration {
        Duration::from_millis(self.lookup_grace_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl StreamsConfig {
    pub fn settings(&self) -> StreamSettings {
        StreamSettings {
            close_grace: Duration::from_millis(self.close_grace_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            orphan_threshold: Duration::from_secs(self.orphan_threshold_secs),
        }
    }
}

impl LoggingConfig {
    pub fn log_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.clone(),
            None => get_default_log_dir(),
        }
    }
}

impl ApiConfig {
    /// Load from `path`, or from the default location when `None`. A missing
    /// file is created with the defaults first.
    pub fn load(path: Option<PathBuf>) -> Result<(Self, PathBuf), ConfigError> {
        let config_path = path.unwrap_or_else(get_config_path);

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::Message(format!("Failed to create config directory: {e}"))
                })?;
            }
        }

        if !config_path.exists() {
            write_default_config(&config_path)?;
        }

        let builder = Config::builder()
            .add_source(File::from(config_path.clone()))
            .build()?;

        let config: ApiConfig = builder.try_deserialize()?;
        Ok((config, config_path))
    }
}

fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(&ApiConfig::default())
        .map_err(|e| ConfigError::Message(format!("Failed to render default config: {e}")))?;
    std::fs::write(path, rendered)
        .map_err(|e| ConfigError::Message(format!("Failed to write default config: {e}")))
}

fn get_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("nocodo/interaction.toml")
    } else {
        PathBuf::from("interaction.toml")
    }
}

fn get_default_log_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        data_dir.join("nocodo/logs")
    } else {
        PathBuf::from("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_writes_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/interaction.toml");

        let (config, loaded_from) = ApiConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded_from, path);
        assert!(path.exists());
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.questions.lookup_grace_ms, 250);
        assert_eq!(config.streams.close_grace_ms, 5000);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("interaction.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9100\n\n[streams]\nclose_grace_ms = 250\n",
        )
        .unwrap();

        let (config, _) = ApiConfig::load(Some(path)).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.streams.settings().close_grace, Duration::from_millis(250));
        assert_eq!(config.streams.write_timeout_ms, 10000);
        assert_eq!(config.questions.max_wait(), Duration::from_secs(600));
    }
}
