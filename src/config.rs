//! Service configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults (every field has one),
//! 2. `config/default.toml`, or the file named by `QUIRE_CONFIG`,
//! 3. environment variables prefixed `QUIRE_`, with `__` between nested
//!    keys: `QUIRE_BROKER__SLOTS=2`, `QUIRE_STORAGE__RETENTION=acknowledge`.

use crate::storage::RetentionPolicy;
use quire_broker::{BrokerConfig, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "QUIRE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config/default";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workers: WorkersConfig,
    pub jobs: JobsConfig,
    pub broker: BrokerSettings,
    pub storage: StorageConfig,
    pub assets: AssetsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Concurrent jobs. Rendering itself runs on the blocking pool.
    pub count: usize,
    /// Jobs accepted but not yet picked up; submissions beyond it are rejected.
    pub queue_capacity: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { count: num_cpus::get().clamp(1, 8), queue_capacity: 64 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Budget from submission to a stored artifact.
    pub deadline_ms: u64,
    /// How long terminal job records stay queryable.
    pub retention_secs: u64,
    pub sweep_interval_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { deadline_ms: 120_000, retention_secs: 3_600, sweep_interval_ms: 1_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub slots: usize,
    pub attempt_timeout_ms: u64,
    pub restart_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Parent directory for conversion output; system temp when unset.
    pub work_dir: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        let broker = BrokerConfig::default();
        Self {
            slots: broker.slots,
            attempt_timeout_ms: broker.attempt_timeout.as_millis() as u64,
            restart_timeout_ms: broker.restart_timeout.as_millis() as u64,
            max_attempts: broker.retry.max_attempts,
            backoff_base_ms: broker.retry.base_backoff.as_millis() as u64,
            backoff_max_ms: broker.retry.max_backoff.as_millis() as u64,
            work_dir: None,
            engine: EngineConfig::default(),
        }
    }
}

impl BrokerSettings {
    pub fn to_broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            slots: self.slots,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            restart_timeout: Duration::from_millis(self.restart_timeout_ms),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_backoff: Duration::from_millis(self.backoff_base_ms),
                max_backoff: Duration::from_millis(self.backoff_max_ms),
            },
            work_dir: self.work_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: PathBuf,
    /// Parent directory for per-slot engine profiles; system temp when unset.
    pub profile_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { program: PathBuf::from("soffice"), profile_root: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub artifact_ttl_secs: u64,
    pub retention: RetentionPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { artifact_ttl_secs: 900, retention: RetentionPolicy::Ttl }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub template_dir: PathBuf,
    /// TrueType/OpenType files; only the built-in Helvetica faces when unset.
    pub font_dir: Option<PathBuf>,
    /// Images referenced by templates; none available when unset.
    pub resource_dir: Option<PathBuf>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { template_dir: PathBuf::from("templates"), font_dir: None, resource_dir: None }
    }
}

impl Config {
    /// Loads defaults, the config file and `QUIRE_*` environment overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let file = std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty()).map(PathBuf::from);
        Self::load_from(file.as_deref(), environment())
    }

    /// Like [`load`](Self::load), reading `path` instead of the default file.
    pub fn load_file(path: &Path) -> Result<Self, config::ConfigError> {
        Self::load_from(Some(path), environment())
    }

    /// Like [`load`](Self::load) with an explicit config file (required to
    /// exist) and environment source.
    pub fn load_from(file: Option<&Path>, env: config::Environment) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        builder = match file {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };
        builder = builder.add_source(env);
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that leave the service unable to accept or run work.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let positive = [
            ("workers.count", self.workers.count as u64),
            ("workers.queue_capacity", self.workers.queue_capacity as u64),
            ("broker.slots", self.broker.slots as u64),
            ("broker.max_attempts", u64::from(self.broker.max_attempts)),
        ];
        match positive.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(config::ConfigError::Message(format!("{} must be at least 1", key))),
            None => Ok(()),
        }
    }

    pub fn job_deadline(&self) -> Duration {
        Duration::from_millis(self.jobs.deadline_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.jobs.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.jobs.sweep_interval_ms.max(1))
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.artifact_ttl_secs)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("QUIRE").prefix_separator("_").separator("__").try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        environment().source(Some(map))
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load_from(Some(&path), env(&[])).unwrap();
        assert_eq!(config.broker.slots, 1);
        assert_eq!(config.broker.max_attempts, 3);
        assert_eq!(config.broker.backoff_base_ms, 1_000);
        assert_eq!(config.broker.backoff_max_ms, 8_000);
        assert_eq!(config.workers.queue_capacity, 64);
        assert_eq!(config.storage.retention, RetentionPolicy::Ttl);
        assert_eq!(config.broker.engine.program, PathBuf::from("soffice"));
    }

    #[test]
    fn file_then_environment_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quire.toml");
        std::fs::write(
            &path,
            "[workers]\ncount = 2\nqueue_capacity = 5\n\n[broker]\nslots = 3\n\n[storage]\nretention = \"acknowledge\"\n",
        )
        .unwrap();

        let config = Config::load_from(
            Some(&path),
            env(&[("QUIRE_BROKER__SLOTS", "2"), ("QUIRE_BROKER__ENGINE__PROGRAM", "/opt/lo/soffice")]),
        )
        .unwrap();
        assert_eq!(config.workers.count, 2);
        assert_eq!(config.workers.queue_capacity, 5);
        assert_eq!(config.broker.slots, 2);
        assert_eq!(config.broker.engine.program, PathBuf::from("/opt/lo/soffice"));
        assert_eq!(config.storage.retention, RetentionPolicy::Acknowledge);
    }

    #[test]
    fn broker_settings_map_to_durations() {
        let settings = BrokerSettings { attempt_timeout_ms: 2_500, max_attempts: 0, ..Default::default() };
        let broker = settings.to_broker_config();
        assert_eq!(broker.attempt_timeout, Duration::from_millis(2_500));
        assert_eq!(broker.retry.max_attempts, 1);
        assert_eq!(broker.retry.backoff(2), Duration::from_secs(2));
    }

    #[test]
    fn zero_capacity_is_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quire.toml");
        std::fs::write(&path, "[workers]\nqueue_capacity = 0\n").unwrap();

        let err = Config::load_from(Some(&path), env(&[])).unwrap_err();
        assert!(err.to_string().contains("workers.queue_capacity"), "{}", err);

        let err = Config::load_from(None, env(&[("QUIRE_BROKER__SLOTS", "0")])).unwrap_err();
        assert!(err.to_string().contains("broker.slots"), "{}", err);
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Config::load_from(Some(Path::new("/nonexistent/quire.toml")), env(&[])).is_err());
    }
}
