//! Google sign-in.
//!
//! - **Auth URL**: `https://accounts.google.com/o/oauth2/v2/auth`
//! - **Token URL**: `https://oauth2.googleapis.com/token`
//! - **Userinfo URL**: `https://www.googleapis.com/oauth2/v2/userinfo`
//! - **Token Request Format**: Form-encoded (standard OAuth)
//! - **Client Secret**: sent only when configured; public clients use PKCE alone

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{IdentityProvider, TokenErrorResponse, TokenGrant, TokenResponse};
use crate::oauth::auth::OAuthConfig;
use crate::oauth::error::{Error, Result};
use crate::oauth::session::UserProfile;

/// Google OAuth provider.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    config: OAuthConfig,
    http_client: reqwest::Client,
}

impl GoogleProvider {
    /// Create a provider with a default HTTP client.
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Create a provider sharing an existing HTTP client.
    #[must_use]
    pub fn with_http_client(config: OAuthConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }
}

/// Userinfo v2 payload.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    verified_email: bool,
}

impl From<GoogleUserInfo> for UserProfile {
    fn from(info: GoogleUserInfo) -> Self {
        let display_name = info
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| info.email.clone());
        Self {
            id: info.id,
            email: info.email,
            display_name,
            avatar_url: info.picture,
            email_verified: info.verified_email,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn provider_id(&self) -> &str {
        "google"
    }

    fn name(&self) -> &str {
        "Google"
    }

    fn oauth_config(&self) -> &OAuthConfig {
        &self.config
    }

    #[instrument(skip(self, code, verifier))]
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant> {
        debug!("Exchanging authorization code for Google tokens");

        let mut form_data = vec![
            ("client_id", self.config.client_id.clone()),
            ("code", code.to_string()),
            ("code_verifier", verifier.to_string()),
            ("grant_type", "authorization_code".to_string()),
            ("redirect_uri", self.config.redirect_uri.clone()),
        ];

        if let Some(ref secret) = self.config.client_secret {
            form_data.push(("client_secret", secret.clone()));
        }

        let response = self
            .http_client
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form_data)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) {
                warn!(
                    error = %error.error,
                    description = ?error.error_description,
                    "Google token exchange failed"
                );
                return Err(Error::api(status.as_u16(), error.message()));
            }

            warn!(status = status.as_u16(), "Google token exchange failed");
            return Err(Error::api(status.as_u16(), body));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)?;
        debug!(
            expires_in = token_response.expires_in,
            "Google token exchange succeeded"
        );
        Ok(token_response.into())
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile> {
        let response = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Google userinfo request failed");
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.message())
                .unwrap_or(body);
            return Err(Error::api(status.as_u16(), message));
        }

        let info: GoogleUserInfo = serde_json::from_str(&body)?;
        Ok(info.into())
    }
}
