//! Identity provider implementations.
//!
//! The [`IdentityProvider`] trait is the seam between
//! [`AuthSession`](crate::oauth::auth::AuthSession) and whoever issues tokens
//! and profiles. Each provider can customize:
//!
//! - Authorization URL construction
//! - The token exchange request
//! - Mapping its userinfo payload onto [`UserProfile`]
//!
//! # Providers
//!
//! - [`GoogleProvider`] - Google sign-in, form-encoded token requests (PKCE)
//! - [`DemoProvider`] - predefined local users, no network access
//!
//! # Example
//!
//! ```rust
//! use bloggate::oauth::auth::{OAuthConfig, Pkce};
//! use bloggate::oauth::providers::{GoogleProvider, IdentityProvider};
//!
//! let provider = GoogleProvider::new(OAuthConfig::google(
//!     "client-id",
//!     "http://localhost:1313/auth/callback/",
//! ));
//! let pkce = Pkce::generate();
//! let url = provider.build_auth_url(&pkce, "state-nonce");
//! assert!(url.contains("code_challenge_method=S256"));
//! ```

pub mod demo;
pub mod google;

use async_trait::async_trait;
use serde::Deserialize;

use crate::oauth::auth::{OAuthConfig, Pkce};
use crate::oauth::error::Result;
use crate::oauth::session::UserProfile;

pub use demo::{DemoProvider, DemoUser, DEMO_USERS};
pub use google::GoogleProvider;

/// An OAuth 2.0 identity provider supporting the authorization code flow
/// with PKCE.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Unique provider identifier.
    ///
    /// Used for storage namespacing and logging. Examples: "google", "demo"
    fn provider_id(&self) -> &str;

    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Client registration and endpoints.
    fn oauth_config(&self) -> &OAuthConfig;

    /// Build the authorization URL the user agent is sent to.
    ///
    /// The default implementation adds the standard parameters:
    /// - `client_id`
    /// - `redirect_uri`
    /// - `response_type=code`
    /// - `scope`
    /// - `state`
    /// - `code_challenge` (from PKCE)
    /// - `code_challenge_method=S256`
    fn build_auth_url(&self, pkce: &Pkce, state: &str) -> String {
        let config = self.oauth_config();
        let separator = if config.auth_url.contains('?') { '&' } else { '?' };

        format!(
            "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method={}",
            config.auth_url,
            separator,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_uri),
            urlencoding::encode(&config.scope_param()),
            urlencoding::encode(state),
            urlencoding::encode(&pkce.challenge),
            pkce.method,
        )
    }

    /// Exchange an authorization code and PKCE verifier for an access token.
    ///
    /// Makes one request to the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The token endpoint answers with a non-success status
    /// - The response body cannot be parsed
    /// - A network error occurs
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant>;

    /// Fetch the profile of the user the access token was issued to.
    ///
    /// # Errors
    ///
    /// Returns an error on non-success status, unparseable body, or network
    /// failure.
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile>;
}

/// Blanket implementation for `Box<T>` where T: IdentityProvider
#[async_trait]
impl<T: IdentityProvider + ?Sized> IdentityProvider for Box<T> {
    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn oauth_config(&self) -> &OAuthConfig {
        (**self).oauth_config()
    }

    fn build_auth_url(&self, pkce: &Pkce, state: &str) -> String {
        (**self).build_auth_url(pkce, state)
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant> {
        (**self).exchange_code(code, verifier).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile> {
        (**self).fetch_profile(access_token).await
    }
}

/// Access token issued by a successful code exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds from the moment of issue.
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenGrant {
    /// A bearer grant with the given lifetime.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>, expires_in: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[redacted]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Token response from an OAuth token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            expires_in: response.expires_in,
            token_type: response.token_type,
            scope: response.scope,
        }
    }
}

/// Standard OAuth error body.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    /// `error: description`, or just the error code.
    pub(crate) fn message(&self) -> String {
        match self.error_description.as_deref() {
            Some(description) if !description.is_empty() => {
                format!("{}: {}", self.error, description)
            }
            _ => self.error.clone(),
        }
    }
}
