use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::oauth::auth::config::{GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GOOGLE_USERINFO_URL};
use crate::oauth::auth::{callback_uri, OAuthConfig, DEFAULT_ATTEMPT_TTL_SECS};
use crate::oauth::error::{Error, Result};
use crate::oauth::storage::FileStore;

/// Prefix of environment overrides, e.g. `BLOGGATE_PROVIDER__CLIENT_ID`.
pub const ENV_PREFIX: &str = "BLOGGATE_";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub site: SiteConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
}

/// Which identity provider signs users in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Google,
    Demo,
}

/// Identity provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// OAuth client id. Required for Google.
    pub client_id: Option<String>,
    /// Only for confidential clients; public clients rely on PKCE.
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    /// Account signed in by the demo provider.
    pub demo_user: String,
}

/// Where the blog is served from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Scheme, host and port of the site.
    pub origin: String,
    /// Deployment subdirectory on static hosts, e.g. `/my-blog`.
    pub base_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Override the session file location.
    pub store_path: Option<PathBuf>,
    /// Lifetime of an unfinished login attempt.
    pub attempt_ttl_secs: i64,
    /// How long `login` waits for the browser to come back.
    pub callback_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines on stderr instead of human-readable output.
    pub json: bool,
    /// Also write daily-rolling JSON logs into this directory.
    pub file_dir: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Google,
            client_id: None,
            client_secret: None,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            demo_user: "demo1".to_string(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:1313".to_string(),
            base_path: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            attempt_ttl_secs: DEFAULT_ATTEMPT_TTL_SECS,
            callback_timeout_secs: 300,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from, in increasing priority: built-in defaults,
    /// `~/.config/bloggate/config.toml`, `explicit`, and `BLOGGATE_*`
    /// environment variables (`__` separates nested keys).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `explicit` does not exist or any layer
    /// fails to parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::from_layers(Self::config_path(), explicit)
    }

    fn from_layers(user_file: Option<PathBuf>, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = user_file {
            tracing::debug!(path = %path.display(), "Reading user config");
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::config(format!(
                    "config file '{}' not found",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// `~/.config/bloggate/config.toml` on Linux.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("bloggate").join("config.toml"))
    }

    /// Redirect URI derived from the site settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `site.origin` is not an absolute URL.
    pub fn redirect_uri(&self) -> Result<String> {
        callback_uri(&self.site.origin, self.site.base_path.as_deref())
    }

    /// OAuth client configuration for the Google provider.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `provider.client_id` is unset or a URL is
    /// empty.
    pub fn oauth_config(&self) -> Result<OAuthConfig> {
        let client_id = self
            .provider
            .client_id
            .clone()
            .ok_or_else(|| Error::config("provider.client_id is required for Google sign-in"))?;

        let mut builder = OAuthConfig::builder()
            .client_id(client_id)
            .auth_url(&self.provider.auth_url)
            .token_url(&self.provider.token_url)
            .userinfo_url(&self.provider.userinfo_url)
            .redirect_uri(self.redirect_uri()?)
            .scopes(&self.provider.scopes);
        if let Some(secret) = &self.provider.client_secret {
            builder = builder.client_secret(secret);
        }
        builder.build()
    }

    /// The session store at the configured or default location.
    ///
    /// # Errors
    ///
    /// Returns an error if no location can be determined.
    pub fn session_store(&self) -> Result<FileStore> {
        match &self.session.store_path {
            Some(path) => FileStore::new(path),
            None => FileStore::default_path(),
        }
    }

    pub fn attempt_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session.attempt_ttl_secs)
    }

    pub fn callback_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session.callback_timeout_secs)
    }

    /// Effective configuration as TOML, with the client secret masked.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.provider.client_secret.is_some() {
            shown.provider.client_secret = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).map_err(|e| Error::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider.kind, ProviderKind::Google);
        assert_eq!(config.provider.auth_url, GOOGLE_AUTH_URL);
        assert_eq!(config.site.origin, "http://localhost:1313");
        assert_eq!(config.session.attempt_ttl_secs, 600);
        assert_eq!(config.log.level, "info");
        assert!(!config.log.json);
    }

    #[test]
    fn test_defaults_only() {
        Jail::expect_with(|_jail| {
            let config = AppConfig::from_layers(None, None).map_err(|e| e.to_string())?;
            assert_eq!(config, AppConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bloggate.toml",
                r#"
                [provider]
                client_id = "file-client"

                [site]
                origin = "https://someone.github.io"
                base_path = "/parada-site"

                [session]
                attempt_ttl_secs = 120
                "#,
            )?;
            jail.set_env("BLOGGATE_PROVIDER__CLIENT_ID", "env-client");
            jail.set_env("BLOGGATE_LOG__JSON", "true");

            let config = AppConfig::from_layers(None, Some(Path::new("bloggate.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.provider.client_id.as_deref(), Some("env-client"));
            assert_eq!(config.session.attempt_ttl_secs, 120);
            assert_eq!(config.session.callback_timeout_secs, 300);
            assert!(config.log.json);
            assert_eq!(
                config.redirect_uri().map_err(|e| e.to_string())?,
                "https://someone.github.io/parada-site/auth/callback/"
            );
            Ok(())
        });
    }

    #[test]
    fn test_provider_kind_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("BLOGGATE_PROVIDER__KIND", "demo");
            jail.set_env("BLOGGATE_PROVIDER__DEMO_USER", "demo3");

            let config = AppConfig::from_layers(None, None).map_err(|e| e.to_string())?;
            assert_eq!(config.provider.kind, ProviderKind::Demo);
            assert_eq!(config.provider.demo_user, "demo3");
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = AppConfig::from_layers(None, Some(Path::new("/nonexistent/bloggate.toml")))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_oauth_config_requires_client_id() {
        let mut config = AppConfig::default();
        assert!(config.oauth_config().is_err());

        config.provider.client_id = Some("abc.apps.googleusercontent.com".into());
        let oauth = config.oauth_config().unwrap();
        assert_eq!(oauth.redirect_uri, "http://localhost:1313/auth/callback/");
        assert_eq!(oauth.scope_param(), "openid email profile");
        assert!(oauth.client_secret.is_none());
    }

    #[test]
    fn test_to_toml_masks_secret() {
        let mut config = AppConfig::default();
        config.provider.client_secret = Some("GOCSPX-secret".into());

        let shown = config.to_toml().unwrap();
        assert!(!shown.contains("GOCSPX-secret"));
        assert!(shown.contains("[provider]"));

        let parsed: AppConfig = toml::from_str(&shown).unwrap();
        assert_eq!(parsed.site, config.site);
    }
}
