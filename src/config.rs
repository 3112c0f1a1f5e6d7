//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::contest::AnswerMatching;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "KNOCKOUT_BACK_CONFIG_PATH";
/// Environment variable that overrides the configured storage backend.
const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";

/// Which [`ContestStore`](crate::dao::contest_store::ContestStore) the server connects to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local store, lost on restart.
    #[default]
    Memory,
    /// MongoDB via `MONGO_URI` / `MONGO_DB`.
    Mongo,
    /// CouchDB via `COUCH_BASE_URL` / `COUCH_DB`.
    Couch,
}

impl StorageBackend {
    /// Name used in logs and the health payload.
    pub fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Mongo => "mongo",
            Self::Couch => "couch",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "mongo" | "mongodb" => Some(Self::Mongo),
            "couch" | "couchdb" => Some(Self::Couch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Storage backend to connect to.
    pub storage: StorageBackend,
    /// Comparison used when judging answers.
    pub answer_matching: AnswerMatching,
    /// Interval between reinstatement checks while a participant is eliminated.
    pub reinstatement_poll_interval: Duration,
    /// Number of reinstatement checks before polling stops.
    pub reinstatement_poll_attempts: u32,
    /// First delay before a lifecycle retries after the store was unavailable.
    pub subscription_retry_initial: Duration,
    /// Upper bound for the lifecycle retry delay.
    pub subscription_retry_max: Duration,
    /// Buffer size of each change feed.
    pub feed_capacity: usize,
    /// Buffer size of each SSE hub.
    pub sse_capacity: usize,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults, then apply the
    /// environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        storage = ?app_config.storage,
                        answer_matching = ?app_config.answer_matching,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(value) = env::var(STORAGE_BACKEND_ENV)
            .ok()
            .filter(|value| !value.is_empty())
        {
            match StorageBackend::parse(&value) {
                Some(storage) => self.storage = storage,
                None => warn!(
                    value,
                    "unknown {STORAGE_BACKEND_ENV}; keeping configured backend"
                ),
            }
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    storage: StorageBackend,
    answer_matching: AnswerMatching,
    reinstatement_poll_interval_secs: u64,
    reinstatement_poll_attempts: u32,
    subscription_retry_initial_ms: u64,
    subscription_retry_max_ms: u64,
    feed_capacity: usize,
    sse_capacity: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Memory,
            answer_matching: AnswerMatching::Exact,
            reinstatement_poll_interval_secs: 30,
            reinstatement_poll_attempts: 10,
            subscription_retry_initial_ms: 500,
            subscription_retry_max_ms: 30_000,
            feed_capacity: 256,
            sse_capacity: 64,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let retry_initial = Duration::from_millis(value.subscription_retry_initial_ms.max(1));
        Self {
            storage: value.storage,
            answer_matching: value.answer_matching,
            reinstatement_poll_interval: Duration::from_secs(
                value.reinstatement_poll_interval_secs.max(1),
            ),
            reinstatement_poll_attempts: value.reinstatement_poll_attempts,
            subscription_retry_initial: retry_initial,
            subscription_retry_max: Duration::from_millis(value.subscription_retry_max_ms)
                .max(retry_initial),
            feed_capacity: value.feed_capacity.max(1),
            sse_capacity: value.sse_capacity.max(1),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "answer_matching": "trimmed", "storage": "mongo" }"#)
                .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.answer_matching, AnswerMatching::Trimmed);
        assert_eq!(config.storage, StorageBackend::Mongo);
        assert_eq!(config.reinstatement_poll_interval, Duration::from_secs(30));
        assert_eq!(config.reinstatement_poll_attempts, 10);
    }

    #[test]
    fn retry_max_never_drops_below_initial() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "subscription_retry_initial_ms": 2000, "subscription_retry_max_ms": 10 }"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.subscription_retry_max, Duration::from_secs(2));
    }

    #[test]
    fn backend_names_accept_aliases() {
        assert_eq!(
            StorageBackend::parse("MongoDB"),
            Some(StorageBackend::Mongo)
        );
        assert_eq!(StorageBackend::parse("couch"), Some(StorageBackend::Couch));
        assert_eq!(StorageBackend::parse("sqlite"), None);
    }
}
