//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::TaskerError;
use crate::util::memory::safe_memory_limit;

/// Task store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    #[default]
    InMemory,
    /// JSON-lines file shared by every scheduler process.
    File {
        /// Path of the backing file.
        path: PathBuf,
    },
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskerConfig {
    /// Run the periodic in-process trigger.
    pub enable_periodic: bool,
    /// Cadence of the periodic trigger in seconds.
    pub periodic_interval_secs: u64,
    /// Time budget of a periodic increment in seconds.
    pub periodic_timeout_secs: u64,
    /// Accept runs from the external (cron) trigger.
    pub enable_cron: bool,
    /// Time budget of an on-demand increment in seconds.
    pub http_timeout_secs: u64,
    /// Process memory ceiling in bytes.
    pub memory_limit_bytes: Option<u64>,
    /// Margin kept free before a deadline, in milliseconds.
    pub safety_margin_ms: u64,
    /// Fraction of the memory ceiling at which increments yield.
    pub memory_threshold: f64,
    /// Keep debug notices.
    pub debug: bool,
    /// Bound on buffered notices.
    pub max_notices: usize,
    /// Task store backend.
    pub store: StoreBackendConfig,
}

impl Default for TaskerConfig {
    fn default() -> Self {
        Self {
            enable_periodic: true,
            periodic_interval_secs: 30,
            periodic_timeout_secs: 25,
            enable_cron: false,
            http_timeout_secs: 15,
            memory_limit_bytes: None,
            safety_margin_ms: 2000,
            memory_threshold: 0.8,
            debug: false,
            max_notices: 1000,
            store: StoreBackendConfig::InMemory,
        }
    }
}

impl TaskerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.periodic_interval_secs == 0 {
            return Err("periodic_interval_secs must be greater than 0".into());
        }
        if self.periodic_timeout_secs == 0 {
            return Err("periodic_timeout_secs must be greater than 0".into());
        }
        if self.periodic_timeout_secs >= self.periodic_interval_secs {
            return Err("periodic_timeout_secs must be shorter than periodic_interval_secs".into());
        }
        if self.http_timeout_secs == 0 {
            return Err("http_timeout_secs must be greater than 0".into());
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err("memory_threshold must be within (0, 1]".into());
        }
        if self.max_notices == 0 {
            return Err("max_notices must be greater than 0".into());
        }
        if let StoreBackendConfig::File { path } = &self.store {
            if path.as_os_str().is_empty() {
                return Err("store path must not be empty".into());
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `TASKER_*` environment variables (after
    /// loading a `.env` file if present) on top of the defaults.
    pub fn from_env() -> Result<Self, TaskerError> {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars()).map_err(TaskerError::Config)
    }

    /// Apply `TASKER_*` variables from an iterator, then validate.
    pub fn from_vars<I>(vars: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        fn num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
            value
                .trim()
                .parse()
                .map_err(|_| format!("{key}: invalid number '{value}'"))
        }
        fn flag(key: &str, value: &str) -> Result<bool, String> {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(format!("{key}: invalid flag '{value}'")),
            }
        }

        let mut cfg = Self::default();
        for (key, value) in vars {
            match key.as_str() {
                "TASKER_ENABLE_PERIODIC" => cfg.enable_periodic = flag(&key, &value)?,
                "TASKER_PERIODIC_INTERVAL_SECS" => cfg.periodic_interval_secs = num(&key, &value)?,
                "TASKER_PERIODIC_TIMEOUT_SECS" => cfg.periodic_timeout_secs = num(&key, &value)?,
                "TASKER_ENABLE_CRON" => cfg.enable_cron = flag(&key, &value)?,
                "TASKER_HTTP_TIMEOUT_SECS" => cfg.http_timeout_secs = num(&key, &value)?,
                "TASKER_MEMORY_LIMIT_BYTES" => cfg.memory_limit_bytes = Some(num(&key, &value)?),
                "TASKER_SAFETY_MARGIN_MS" => cfg.safety_margin_ms = num(&key, &value)?,
                "TASKER_MEMORY_THRESHOLD" => cfg.memory_threshold = num(&key, &value)?,
                "TASKER_DEBUG" => cfg.debug = flag(&key, &value)?,
                "TASKER_MAX_NOTICES" => cfg.max_notices = num(&key, &value)?,
                "TASKER_STORE_PATH" => {
                    cfg.store = StoreBackendConfig::File {
                        path: PathBuf::from(value),
                    };
                }
                _ => {}
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Memory ceiling handed to increments: the configured limit minus headroom.
    #[must_use]
    pub const fn safe_memory_limit(&self) -> Option<u64> {
        safe_memory_limit(self.memory_limit_bytes)
    }

    /// Guard margin before a deadline.
    #[must_use]
    pub const fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    /// Time budget of a periodic increment.
    #[must_use]
    pub const fn periodic_timeout(&self) -> Duration {
        Duration::from_secs(self.periodic_timeout_secs)
    }

    /// Cadence of the periodic trigger.
    #[must_use]
    pub const fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    /// Time budget of an on-demand increment.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
