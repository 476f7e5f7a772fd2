//! Weibo OAuth 2.0 provider adapter.

use crate::error::{LinkError, Result};
use crate::providers::{Handshake, ProviderAdapter};
use crate::state::{AccessCredentials, ExternalProfile, HandshakeState};
use reqwest::Client;
use serde::Deserialize;

const DEFAULT_API_BASE: &str = "https://api.weibo.com";

/// Weibo OAuth 2.0 adapter.
///
/// Implements [`ProviderAdapter`] against the Weibo open platform:
/// authorization-code exchange via `/oauth2/access_token`, profile
/// resolution via `/oauth2/get_token_info` (for the stable uid) followed by
/// `/2/users/show.json` (for the profile snapshot).
///
/// # Configuration
///
/// 1. Register an application at the Weibo open platform
/// 2. Configure the authorized callback URL
/// 3. Supply the app key/secret:
///
/// ```no_run
/// use thirdparty_link::providers::WeiboAdapter;
///
/// let weibo = WeiboAdapter::new(
///     "your-app-key".to_string(),
///     "your-app-secret".to_string(),
/// );
/// ```
#[derive(Clone, Debug)]
pub struct WeiboAdapter {
    /// Application key from the Weibo open platform.
    app_key: String,

    /// Application secret (keep confidential).
    app_secret: String,

    /// HTTP client for making requests.
    http_client: Client,

    /// API base URL, overridable for tests.
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    uid: serde_json::Value,
}

impl WeiboAdapter {
    /// Create a new Weibo adapter.
    #[must_use]
    pub fn new(app_key: String, app_secret: String) -> Self {
        Self {
            app_key,
            app_secret,
            http_client: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (for tests against a local mock server).
    #[must_use]
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }
}

impl ProviderAdapter for WeiboAdapter {
    async fn initiate_handshake(&self, callback_url: &str, state: &str) -> Result<Handshake> {
        // Pure URL construction; Weibo has no request-token step.
        let authorize_url = format!(
            "{}/oauth2/authorize?client_id={}&response_type=code&redirect_uri={}&state={}",
            self.api_base,
            urlencoding::encode(&self.app_key),
            urlencoding::encode(callback_url),
            urlencoding::encode(state),
        );

        Ok(Handshake {
            authorize_url,
            request_token: None,
            request_token_secret: None,
        })
    }

    async fn exchange_for_access_token(
        &self,
        _handshake: &HandshakeState,
        verifier_or_code: &str,
    ) -> Result<AccessCredentials> {
        let response = self
            .http_client
            .post(format!("{}/oauth2/access_token", self.api_base))
            .form(&[
                ("client_id", self.app_key.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", verifier_or_code),
            ])
            .send()
            .await
            .map_err(|e| LinkError::Provider(format!("Weibo token exchange failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LinkError::Provider(format!(
                "Weibo token exchange returned {}",
                response.status()
            )));
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| LinkError::Provider(format!("Malformed Weibo token response: {e}")))?;

        Ok(AccessCredentials {
            access_token: token.access_token,
            access_token_secret: None,
            refresh_token: token.refresh_token,
        })
    }

    async fn fetch_profile(&self, credentials: &AccessCredentials) -> Result<ExternalProfile> {
        // Step 1: resolve the stable uid for the token.
        let info: TokenInfoResponse = self
            .http_client
            .post(format!("{}/oauth2/get_token_info", self.api_base))
            .form(&[("access_token", credentials.access_token.as_str())])
            .send()
            .await
            .map_err(|e| LinkError::Provider(format!("Weibo token info failed: {e}")))?
            .json()
            .await
            .map_err(|e| LinkError::Provider(format!("Malformed Weibo token info: {e}")))?;

        // The uid comes back as a number or a string depending on endpoint
        // version; normalize to a string.
        let uid = match &info.uid {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(LinkError::Provider(format!(
                    "Weibo token info carried no usable uid: {other}"
                )));
            }
        };

        // Step 2: fetch the profile snapshot.
        let raw: serde_json::Value = self
            .http_client
            .get(format!("{}/2/users/show.json", self.api_base))
            .query(&[
                ("uid", uid.as_str()),
                ("access_token", credentials.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LinkError::Provider(format!("Weibo profile fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| LinkError::Provider(format!("Malformed Weibo profile: {e}")))?;

        Ok(ExternalProfile {
            external_profile_id: uid,
            raw,
        })
    }
}
