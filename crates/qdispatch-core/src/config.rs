//! Settings - 設定値
//!
//! 読み込み順:
//! 1. デフォルト値
//! 2. TOML ファイル（指定されていれば。セクション単位で部分的に上書き）
//! 3. 環境変数（`NATS_URL`, `REDIS_URL`, `QDISPATCH_MAX_CONCURRENT_TASKS`,
//!    `QDISPATCH_LOG_LEVEL`）

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub worker: WorkerSettings,
    pub bus: BusSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Limiter capacity N: tasks processed at the same time.
    pub max_concurrent_tasks: usize,
    /// Threads allowed to run the engine at once.
    pub engine_threads: usize,
    pub reconnect_interval_secs: u64,
    pub drain_timeout_secs: u64,
    /// Give up on the first connection after this many tries (`None` = never).
    pub startup_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub url: String,
    pub subject: String,
    pub subscription_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub url: String,
    pub key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let cpus = available_parallelism();
        Self {
            max_concurrent_tasks: cpus,
            engine_threads: cpus.clamp(2, 8),
            reconnect_interval_secs: 5,
            drain_timeout_secs: 10,
            startup_attempts: None,
        }
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            url: "nats://nats:4222".to_string(),
            subject: "tasks".to_string(),
            subscription_buffer: 1024,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: "redis://redis:6379".to_string(),
            key_prefix: "task".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl WorkerSettings {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Settings {
    /// Defaults, then `path` (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse TOML; missing sections and keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NATS_URL") {
            self.bus.url = url;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.store.url = url;
        }
        if let Some(raw) = lookup("QDISPATCH_MAX_CONCURRENT_TASKS") {
            self.worker.max_concurrent_tasks =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "QDISPATCH_MAX_CONCURRENT_TASKS",
                    message: format!("{raw:?} is not a positive integer"),
                })?;
        }
        if let Some(level) = lookup("QDISPATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid {
                key: "worker.max_concurrent_tasks",
                message: "must be at least 1".into(),
            });
        }
        if self.worker.engine_threads == 0 {
            return Err(ConfigError::Invalid {
                key: "worker.engine_threads",
                message: "must be at least 1".into(),
            });
        }
        if self.worker.reconnect_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "worker.reconnect_interval_secs",
                message: "must be at least 1".into(),
            });
        }
        if self.worker.startup_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                key: "worker.startup_attempts",
                message: "must be at least 1 when set".into(),
            });
        }
        if self.bus.subject.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "bus.subject",
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert!(settings.worker.max_concurrent_tasks >= 1);
        assert!((2..=8).contains(&settings.worker.engine_threads));
        assert_eq!(settings.worker.reconnect_interval(), Duration::from_secs(5));
        assert_eq!(settings.worker.drain_timeout(), Duration::from_secs(10));
        assert_eq!(settings.bus.subject, "tasks");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            [worker]
            max_concurrent_tasks = 3

            [bus]
            url = "nats://localhost:4222"
            "#,
        )
        .unwrap();

        assert_eq!(settings.worker.max_concurrent_tasks, 3);
        assert_eq!(settings.worker.drain_timeout_secs, 10);
        assert_eq!(settings.bus.url, "nats://localhost:4222");
        assert_eq!(settings.bus.subject, "tasks");
        assert_eq!(settings.store, StoreSettings::default());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("REDIS_URL", "redis://localhost:6380"),
            ("QDISPATCH_MAX_CONCURRENT_TASKS", "7"),
        ]);
        let mut settings = Settings::default();
        settings
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.store.url, "redis://localhost:6380");
        assert_eq!(settings.worker.max_concurrent_tasks, 7);
    }

    #[test]
    fn bad_env_number_is_reported() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(|key| (key == "QDISPATCH_MAX_CONCURRENT_TASKS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("QDISPATCH_MAX_CONCURRENT_TASKS"));
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let settings = Settings::from_toml("[worker]\nmax_concurrent_tasks = 0").unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { key: "worker.max_concurrent_tasks", .. })
        ));
    }

    #[test]
    fn zero_startup_attempts_is_invalid() {
        let settings = Settings::from_toml("[worker]\nstartup_attempts = 0").unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { key: "worker.startup_attempts", .. })
        ));

        let settings = Settings::from_toml("[worker]\nstartup_attempts = 1").unwrap();
        settings.validate().unwrap();
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            Settings::from_toml("[worker"),
            Err(ConfigError::Parse(_))
        ));
    }
}
