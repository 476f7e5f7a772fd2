//! Linking configuration.
//!
//! Configuration values are provided by the application, not hardcoded.

use chrono::Duration;

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Base URL of the API (e.g. `"https://api.example.com"`).
    ///
    /// Provider callbacks are formatted as `{base_url}/auth/{site}/callback`.
    pub base_url: String,

    /// How long a pending claim stays confirmable.
    ///
    /// Default: 12 hours
    pub claim_ttl: Duration,

    /// Upper bound on each provider network call.
    ///
    /// Default: 10 seconds
    pub provider_timeout: std::time::Duration,
}

impl LinkConfig {
    /// Create a new configuration.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of your API (e.g. `"https://api.example.com"`)
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            claim_ttl: Duration::hours(12),
            provider_timeout: std::time::Duration::from_secs(10),
        }
    }

    /// Set the pending-claim time-to-live.
    #[must_use]
    pub const fn with_claim_ttl(mut self, ttl: Duration) -> Self {
        self.claim_ttl = ttl;
        self
    }

    /// Set the provider call timeout.
    #[must_use]
    pub const fn with_provider_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Callback URL registered with a provider for the given site.
    #[must_use]
    pub fn callback_url(&self, site: crate::state::Site) -> String {
        format!("{}/auth/{}/callback", self.base_url, site)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Site;

    #[test]
    fn defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.claim_ttl, Duration::hours(12));
        assert_eq!(
            config.callback_url(Site::Weibo),
            "http://localhost:3000/auth/weibo/callback"
        );
    }

    #[test]
    fn builder_setters() {
        let config = LinkConfig::new("https://api.example.com".into())
            .with_claim_ttl(Duration::hours(1))
            .with_provider_timeout(std::time::Duration::from_secs(3));
        assert_eq!(config.claim_ttl, Duration::hours(1));
        assert_eq!(config.provider_timeout.as_secs(), 3);
    }
}
