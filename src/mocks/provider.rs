//! Mock provider adapter for testing.

use crate::error::{LinkError, Result};
use crate::providers::{Handshake, ProviderAdapter};
use crate::state::{AccessCredentials, ExternalProfile, HandshakeState};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Behavior {
    request_token: Option<(String, String)>,
    credentials: AccessCredentials,
    profile: ExternalProfile,
    fail_initiate: bool,
    fail_exchange: bool,
    fail_fetch: bool,
}

/// Scripted provider adapter.
///
/// Returns a fixed profile and credentials; individual steps can be made
/// to fail for error-path tests.
#[derive(Debug, Clone)]
pub struct MockProviderAdapter {
    behavior: Arc<Mutex<Behavior>>,
}

impl MockProviderAdapter {
    /// Create a mock that links the external profile `"mock-user-1"`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            behavior: Arc::new(Mutex::new(Behavior {
                request_token: None,
                credentials: AccessCredentials {
                    access_token: "mock-access-token".to_string(),
                    access_token_secret: None,
                    refresh_token: Some("mock-refresh-token".to_string()),
                },
                profile: ExternalProfile {
                    external_profile_id: "mock-user-1".to_string(),
                    raw: serde_json::json!({
                        "id_str": "mock-user-1",
                        "screen_name": "mock",
                    }),
                },
                fail_initiate: false,
                fail_exchange: false,
                fail_fetch: false,
            })),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Behavior>> {
        self.behavior
            .lock()
            .map_err(|_| LinkError::Storage("Mock provider lock poisoned".to_string()))
    }

    /// Script the external profile returned by `fetch_profile`.
    #[must_use]
    pub fn with_profile(self, external_profile_id: &str, raw: serde_json::Value) -> Self {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.profile = ExternalProfile {
                external_profile_id: external_profile_id.to_string(),
                raw,
            };
        }
        self
    }

    /// Script the credentials returned by the token exchange.
    #[must_use]
    pub fn with_credentials(self, credentials: AccessCredentials) -> Self {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.credentials = credentials;
        }
        self
    }

    /// Behave like an OAuth1 provider issuing a request token.
    #[must_use]
    pub fn with_request_token(self, token: &str, secret: &str) -> Self {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.request_token = Some((token.to_string(), secret.to_string()));
        }
        self
    }

    /// Make handshake initiation fail.
    pub fn fail_initiate(&self, fail: bool) {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.fail_initiate = fail;
        }
    }

    /// Make the token exchange fail.
    pub fn fail_exchange(&self, fail: bool) {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.fail_exchange = fail;
        }
    }

    /// Make the profile fetch fail.
    pub fn fail_fetch(&self, fail: bool) {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.fail_fetch = fail;
        }
    }
}

impl Default for MockProviderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for MockProviderAdapter {
    async fn initiate_handshake(&self, callback_url: &str, state: &str) -> Result<Handshake> {
        let behavior = self.lock()?;
        if behavior.fail_initiate {
            return Err(LinkError::Provider("Mock initiate failure".to_string()));
        }
        Ok(match &behavior.request_token {
            Some((token, secret)) => Handshake {
                authorize_url: format!("https://provider.test/authorize?oauth_token={token}"),
                request_token: Some(token.clone()),
                request_token_secret: Some(secret.clone()),
            },
            None => Handshake {
                authorize_url: format!(
                    "https://provider.test/authorize?redirect_uri={}&state={state}",
                    urlencoding::encode(callback_url),
                ),
                request_token: None,
                request_token_secret: None,
            },
        })
    }

    async fn exchange_for_access_token(
        &self,
        _handshake: &HandshakeState,
        _verifier_or_code: &str,
    ) -> Result<AccessCredentials> {
        let behavior = self.lock()?;
        if behavior.fail_exchange {
            return Err(LinkError::Provider("Mock exchange failure".to_string()));
        }
        Ok(behavior.credentials.clone())
    }

    async fn fetch_profile(&self, _credentials: &AccessCredentials) -> Result<ExternalProfile> {
        let behavior = self.lock()?;
        if behavior.fail_fetch {
            return Err(LinkError::Provider("Mock fetch failure".to_string()));
        }
        Ok(behavior.profile.clone())
    }
}
