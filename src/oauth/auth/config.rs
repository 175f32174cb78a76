//! Identity provider endpoints and client registration.
//!
//! ```rust
//! use bloggate::oauth::auth::OAuthConfig;
//!
//! let google = OAuthConfig::google("client-id", "http://localhost:1313/auth/callback/");
//! assert_eq!(google.scopes, vec!["openid", "email", "profile"]);
//!
//! let custom = OAuthConfig::builder()
//!     .client_id("my-client")
//!     .auth_url("https://id.example.com/authorize")
//!     .token_url("https://id.example.com/token")
//!     .userinfo_url("https://id.example.com/userinfo")
//!     .redirect_uri("https://blog.example.com/auth/callback/")
//!     .scopes(["openid", "email"])
//!     .build()
//!     .unwrap();
//! assert!(custom.client_secret.is_none());
//! ```

use crate::oauth::error::{Error, Result};

/// Google's authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google's token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Google's userinfo endpoint.
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// OAuth 2.0 client configuration for one identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    /// Public client identifier.
    pub client_id: String,
    /// Client secret. Browser-style public clients rely on PKCE alone and
    /// leave this unset.
    pub client_secret: Option<String>,
    /// Authorization endpoint the user agent is sent to.
    pub auth_url: String,
    /// Token endpoint for the code exchange.
    pub token_url: String,
    /// Endpoint returning the signed-in user's profile.
    pub userinfo_url: String,
    /// Where the provider redirects after consent. Must match the registration.
    pub redirect_uri: String,
    /// Requested scopes, joined by spaces in the authorization URL.
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Start a builder.
    #[must_use]
    pub fn builder() -> OAuthConfigBuilder {
        OAuthConfigBuilder::default()
    }

    /// Google sign-in with the `openid email profile` scopes.
    #[must_use]
    pub fn google(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
        }
    }

    /// Scopes as sent on the wire.
    #[must_use]
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// Loopback port of the redirect URI, if it points at this machine.
    ///
    /// Used to decide whether a local listener can receive the callback.
    #[must_use]
    pub fn loopback_port(&self) -> Option<u16> {
        let url = self.redirect_uri.parse::<url::Url>().ok()?;
        if !super::redirect::is_loopback_host(url.host_str()?) {
            return None;
        }
        url.port_or_known_default()
    }
}

/// Builder for [`OAuthConfig`].
#[derive(Debug, Default)]
pub struct OAuthConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_url: Option<String>,
    token_url: Option<String>,
    userinfo_url: Option<String>,
    redirect_uri: Option<String>,
    scopes: Vec<String>,
}

impl OAuthConfigBuilder {
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    #[must_use]
    pub fn auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = Some(auth_url.into());
        self
    }

    #[must_use]
    pub fn token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    #[must_use]
    pub fn userinfo_url(mut self, userinfo_url: impl Into<String>) -> Self {
        self.userinfo_url = Some(userinfo_url.into());
        self
    }

    #[must_use]
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Replace the scope list.
    #[must_use]
    pub fn scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Append one scope.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Build the config.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first missing required field.
    pub fn build(self) -> Result<OAuthConfig> {
        fn required(value: Option<String>, field: &str) -> Result<String> {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::config(format!("{field} is required")))
        }

        Ok(OAuthConfig {
            client_id: required(self.client_id, "client_id")?,
            client_secret: self.client_secret,
            auth_url: required(self.auth_url, "auth_url")?,
            token_url: required(self.token_url, "token_url")?,
            userinfo_url: required(self.userinfo_url, "userinfo_url")?,
            redirect_uri: required(self.redirect_uri, "redirect_uri")?,
            scopes: self.scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> OAuthConfigBuilder {
        OAuthConfig::builder()
            .client_id("client")
            .auth_url("https://id.example.com/authorize")
            .token_url("https://id.example.com/token")
            .userinfo_url("https://id.example.com/userinfo")
            .redirect_uri("https://blog.example.com/auth/callback/")
    }

    #[test]
    fn test_google_preset() {
        let config = OAuthConfig::google("abc.apps.googleusercontent.com", "http://localhost/cb");

        assert_eq!(config.auth_url, GOOGLE_AUTH_URL);
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
        assert_eq!(config.userinfo_url, GOOGLE_USERINFO_URL);
        assert!(config.client_secret.is_none());
        assert_eq!(config.scope_param(), "openid email profile");
    }

    #[test]
    fn test_builder_complete() {
        let config = builder().scope("openid").scope("email").build().unwrap();
        assert_eq!(config.client_id, "client");
        assert_eq!(config.scopes, vec!["openid", "email"]);
    }

    #[test]
    fn test_builder_reports_missing_field() {
        let err = OAuthConfig::builder()
            .client_id("client")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("auth_url"));

        let err = builder().client_id("").build().unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_loopback_port() {
        let mut config = builder().build().unwrap();
        assert_eq!(config.loopback_port(), None);

        config.redirect_uri = "http://127.0.0.1:51121/auth/callback/".to_string();
        assert_eq!(config.loopback_port(), Some(51121));

        config.redirect_uri = "http://localhost/auth/callback/".to_string();
        assert_eq!(config.loopback_port(), Some(80));
    }
}
