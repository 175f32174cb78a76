//! Query parameters of the provider's redirect back to the site.

use serde::Deserialize;
use url::Url;

use crate::oauth::error::Result;

/// What the identity provider appended to the redirect URI.
///
/// All fields are optional on the wire; interpretation happens in
/// `AuthSession::complete_login`.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse the parameters out of a full callback URL.
    ///
    /// ```rust
    /// use bloggate::oauth::auth::CallbackParams;
    ///
    /// let params = CallbackParams::from_url(
    ///     "https://blog.example.com/auth/callback/?state=abc&error=access_denied",
    /// ).unwrap();
    /// assert_eq!(params.error.as_deref(), Some("access_denied"));
    /// assert!(params.code.is_none());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Error::Url` if `url` is not an absolute URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            // First occurrence wins, like URLSearchParams.get
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        Ok(params)
    }

    /// The provider error, with its description when one was sent.
    #[must_use]
    pub fn provider_error(&self) -> Option<String> {
        let error = self.error.as_deref()?;
        Some(match self.error_description.as_deref() {
            Some(description) if !description.is_empty() => format!("{error}: {description}"),
            _ => error.to_string(),
        })
    }
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &self.code.as_ref().map(|_| "[redacted]"))
            .field("state", &self.state)
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}
