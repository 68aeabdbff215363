use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::SyncError;

pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Client-side sync settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub save_debounce_ms: u64,
    pub request_timeout_ms: u64,
    /// Snapshot cache file. `None` keeps the cache in memory only.
    pub cache_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".into(),
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            cache_path: None,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `PROGRESS_API_URL`, `PROGRESS_SAVE_DEBOUNCE_MS`,
    /// `PROGRESS_REQUEST_TIMEOUT_MS` and `PROGRESS_CACHE_PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: u64| {
            env::var(key)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(fallback)
        };
        Self {
            api_base_url: env::var("PROGRESS_API_URL").unwrap_or(defaults.api_base_url),
            save_debounce_ms: millis("PROGRESS_SAVE_DEBOUNCE_MS", defaults.save_debounce_ms),
            request_timeout_ms: millis("PROGRESS_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            cache_path: env::var_os("PROGRESS_CACHE_PATH").map(PathBuf::from),
        }
    }

    /// Parsed base URL, after checking the rest of the settings.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` for an unparseable or non-http(s) URL, a
    /// zero debounce or a zero request timeout.
    pub fn validate(&self) -> Result<Url, SyncError> {
        let url = Url::parse(&self.api_base_url)
            .map_err(|e| SyncError::Config(format!("api_base_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "api_base_url: unsupported scheme {}",
                url.scheme()
            )));
        }
        if self.save_debounce_ms == 0 {
            return Err(SyncError::Config("save_debounce_ms must be non-zero".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(SyncError::Config("request_timeout_ms must be non-zero".into()));
        }
        Ok(url)
    }

    #[must_use]
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.save_debounce(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_zero_debounce_and_bad_urls() {
        let mut config = SyncConfig::new("http://localhost:9000");
        config.save_debounce_ms = 0;
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        assert!(SyncConfig::new("not a url").validate().is_err());
        assert!(SyncConfig::new("ftp://example.com").validate().is_err());
    }
}
