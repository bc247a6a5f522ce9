use std::time::Duration;

use evochain_core::PageSize;

const BASE_URL_ENV: &str = "EVOCHAIN_BASE_URL";
const TIMEOUT_MS_ENV: &str = "EVOCHAIN_TIMEOUT_MS";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4020";
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Consumer-side limit per page fetch. A page that exceeds it is marked errored.
    pub timeout: Duration,
    pub page_size: PageSize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            page_size: PageSize::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `EVOCHAIN_BASE_URL` and `EVOCHAIN_TIMEOUT_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(
            std::env::var(BASE_URL_ENV).ok().as_deref(),
            std::env::var(TIMEOUT_MS_ENV).ok().as_deref(),
        )
    }

    /// Apply raw override values. Blank URLs are ignored, trailing slashes trimmed, and
    /// timeouts clamped to 100..=30000 ms.
    #[must_use]
    pub fn with_overrides(mut self, base_url: Option<&str>, timeout_ms: Option<&str>) -> Self {
        if let Some(base_url) = base_url
            .map(|value| value.trim().trim_end_matches('/'))
            .filter(|value| !value.is_empty())
        {
            self.base_url = base_url.to_string();
        }
        if let Some(timeout_ms) = timeout_ms.and_then(|value| value.trim().parse::<u64>().ok()) {
            self.timeout = Duration::from_millis(timeout_ms.clamp(100, 30_000));
        }
        self
    }
}
