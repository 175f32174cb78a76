//! Offline provider with predefined users.
//!
//! Used for local previews and tests. The authorization URL points straight
//! back at the redirect URI with `code=<demo user id>`, so the regular
//! callback handling runs unchanged. Issued tokens have the form
//! `demo.<user id>.<nonce>` and never leave the process.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tracing::debug;

use super::{IdentityProvider, TokenGrant};
use crate::oauth::auth::{OAuthConfig, Pkce};
use crate::oauth::error::{Error, Result};
use crate::oauth::session::UserProfile;

/// Lifetime of demo tokens.
pub const DEMO_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

const TOKEN_PREFIX: &str = "demo";

/// A predefined demo account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoUser {
    pub id: &'static str,
    pub name: &'static str,
    pub email: &'static str,
    pub picture: &'static str,
}

impl DemoUser {
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.to_string(),
            email: self.email.to_string(),
            display_name: self.name.to_string(),
            avatar_url: Some(self.picture.to_string()),
            email_verified: true,
        }
    }
}

/// Accounts accepted by [`DemoProvider`].
pub const DEMO_USERS: [DemoUser; 3] = [
    DemoUser {
        id: "demo1",
        name: "Demo User",
        email: "demo@example.com",
        picture: "https://ui-avatars.com/api/?name=Demo+User&background=4285f4&color=fff",
    },
    DemoUser {
        id: "demo2",
        name: "Jane Developer",
        email: "jane@example.com",
        picture: "https://ui-avatars.com/api/?name=Jane+Developer&background=34a853&color=fff",
    },
    DemoUser {
        id: "demo3",
        name: "Tech Blogger",
        email: "tech@example.com",
        picture: "https://ui-avatars.com/api/?name=Tech+Blogger&background=ea4335&color=fff",
    },
];

fn find_user(id: &str) -> Option<&'static DemoUser> {
    DEMO_USERS.iter().find(|u| u.id == id)
}

/// Provider that signs in one of [`DEMO_USERS`] without network access.
#[derive(Debug, Clone)]
pub struct DemoProvider {
    config: OAuthConfig,
    user: &'static DemoUser,
}

impl DemoProvider {
    /// Create a provider that signs in `user_id` and redirects to
    /// `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `user_id` is not a known demo user.
    pub fn new(redirect_uri: impl Into<String>, user_id: &str) -> Result<Self> {
        let user = find_user(user_id).ok_or_else(|| {
            let known: Vec<_> = DEMO_USERS.iter().map(|u| u.id).collect();
            Error::config(format!(
                "unknown demo user '{user_id}' (expected one of {})",
                known.join(", ")
            ))
        })?;
        let redirect_uri = redirect_uri.into();
        let config = OAuthConfig {
            client_id: "bloggate-demo".to_string(),
            client_secret: None,
            auth_url: redirect_uri.clone(),
            token_url: String::new(),
            userinfo_url: String::new(),
            redirect_uri,
            scopes: vec!["profile".to_string()],
        };
        Ok(Self { config, user })
    }

    /// The account this provider signs in.
    #[must_use]
    pub fn user(&self) -> &DemoUser {
        self.user
    }
}

#[async_trait]
impl IdentityProvider for DemoProvider {
    fn provider_id(&self) -> &str {
        "demo"
    }

    fn name(&self) -> &str {
        "Demo"
    }

    fn oauth_config(&self) -> &OAuthConfig {
        &self.config
    }

    fn build_auth_url(&self, _pkce: &Pkce, state: &str) -> String {
        let separator = if self.config.redirect_uri.contains('?') { '&' } else { '?' };
        format!(
            "{}{}code={}&state={}",
            self.config.redirect_uri,
            separator,
            urlencoding::encode(self.user.id),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant> {
        if !(43..=128).contains(&verifier.len()) {
            return Err(Error::api(400, "invalid_grant: malformed code_verifier"));
        }
        let user = find_user(code)
            .ok_or_else(|| Error::api(400, format!("invalid_grant: unknown demo user '{code}'")))?;

        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let token = format!("{TOKEN_PREFIX}.{}.{}", user.id, URL_SAFE_NO_PAD.encode(nonce));

        debug!(user = user.id, "Issued demo token");
        Ok(TokenGrant::bearer(token, DEMO_TOKEN_LIFETIME_SECS))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile> {
        let mut parts = access_token.splitn(3, '.');
        let user = match (parts.next(), parts.next(), parts.next()) {
            (Some(TOKEN_PREFIX), Some(id), Some(nonce)) if !nonce.is_empty() => find_user(id),
            _ => None,
        };
        user.map(DemoUser::profile)
            .ok_or_else(|| Error::api(401, "invalid demo token"))
    }
}
