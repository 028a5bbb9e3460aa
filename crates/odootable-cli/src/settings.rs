use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use odootable_client::{ClientOptions, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Client tuning, read from `odootable.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bound on each connect, authenticate and page fetch, in seconds.
    pub timeout_secs: u64,
    /// Attempts for transient failures, the first one included.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Records requested per page.
    pub page_size: usize,
    /// Blocks resolved at the same time.
    pub max_parallel: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            base_backoff_ms: 250,
            max_backoff_ms: 5_000,
            page_size: 500,
            max_parallel: 4,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, with environment variable overrides.
    /// Falls back to defaults if the file is not found. ODOOTABLE_CONFIG
    /// overrides the path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut cfg_path = path.as_ref().to_path_buf();
        if let Ok(env_path) = env::var("ODOOTABLE_CONFIG") {
            cfg_path = PathBuf::from(env_path);
        }

        let mut settings = match fs::read_to_string(&cfg_path) {
            Ok(s) => toml::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(e.into()),
        };
        settings.apply_env_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    /// Apply ODOOTABLE_* overrides; unparsable values are ignored.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parsed(&lookup, "ODOOTABLE_TIMEOUT_SECS") {
            self.timeout_secs = v;
        }
        if let Some(v) = parsed(&lookup, "ODOOTABLE_MAX_ATTEMPTS") {
            self.max_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "ODOOTABLE_BASE_BACKOFF_MS") {
            self.base_backoff_ms = v;
        }
        if let Some(v) = parsed(&lookup, "ODOOTABLE_MAX_BACKOFF_MS") {
            self.max_backoff_ms = v;
        }
        if let Some(v) = parsed(&lookup, "ODOOTABLE_PAGE_SIZE") {
            self.page_size = v;
        }
        if let Some(v) = parsed(&lookup, "ODOOTABLE_MAX_PARALLEL") {
            self.max_parallel = v;
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            page_size: self.page_size.max(1),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_delay: Duration::from_millis(self.base_backoff_ms),
                max_delay: Duration::from_millis(self.max_backoff_ms.max(self.base_backoff_ms)),
            },
        }
    }
}
