//! Error types for login sessions.
//!
//! Two levels, mirroring how callers react to them:
//!
//! 1. [`Error`] - every failure mode of the crate (storage, transport, config)
//! 2. [`AuthError`] - failures of a login attempt, nested under `Error::Auth`
//!
//! Every [`AuthError`] is terminal for the attempt it belongs to. Nothing is
//! retried internally; a caller that wants another try starts a new login.
//!
//! # Example
//!
//! ```rust
//! use bloggate::oauth::error::{AuthError, Error};
//!
//! fn describe(err: &Error) -> &'static str {
//!     match err {
//!         Error::Auth(auth) if auth.is_security_anomaly() => "rejected callback",
//!         Error::Auth(_) => "login failed",
//!         e if e.is_recoverable() => "try again later",
//!         _ => "unexpected failure",
//!     }
//! }
//!
//! assert_eq!(describe(&Error::Auth(AuthError::StateMismatch)), "rejected callback");
//! ```

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A login attempt failed or no session is available.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Non-success HTTP status from the identity provider.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code from the response.
        status: u16,
        /// Error message, preferably the provider's `error_description`.
        message: String,
    },

    /// Network or HTTP transport error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reading or writing the session store.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an API error.
    ///
    /// ```rust
    /// use bloggate::oauth::error::Error;
    ///
    /// let err = Error::api(400, "invalid_grant");
    /// assert_eq!(err.status(), Some(400));
    /// assert!(!err.is_recoverable());
    /// ```
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// The login-attempt error, if this is one.
    #[must_use]
    pub fn auth(&self) -> Option<&AuthError> {
        match self {
            Self::Auth(err) => Some(err),
            _ => None,
        }
    }

    /// HTTP status code for API errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if retrying the same operation may succeed.
    ///
    /// Returns `true` for transport failures, 5xx and 429 responses, and
    /// transient I/O errors. Every [`Error::Auth`] is `false`: the login
    /// attempt is consumed when it fails, so only a new `begin_login` can
    /// get further.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Auth(_) => false,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Failures of a single login attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// The identity provider redirected back with `error=<code>`.
    #[error("Identity provider denied the login: {0}")]
    ProviderDenied(String),

    /// A callback arrived with no login attempt in flight.
    ///
    /// Raised for direct navigation to the callback, replays of a consumed
    /// callback, and attempts older than the configured time-to-live.
    #[error("No login attempt is in progress")]
    NoPendingAttempt,

    /// The callback's `state` differs from the one issued for the attempt.
    #[error("OAuth state mismatch - possible CSRF attack")]
    StateMismatch,

    /// The callback carried neither an error nor an authorization code.
    #[error("Callback is missing the authorization code")]
    MissingAuthorizationCode,

    /// The token endpoint rejected the code or answered with garbage.
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The userinfo endpoint failed after a token was issued.
    #[error("Failed to fetch user profile: {0}")]
    ProfileFetchFailed(String),

    /// No valid session is stored.
    #[error("Not authenticated - please log in")]
    NotAuthenticated,
}

impl AuthError {
    /// `true` for errors that point at a forged or replayed callback rather
    /// than an outage.
    #[must_use]
    pub fn is_security_anomaly(&self) -> bool {
        matches!(self, Self::StateMismatch | Self::NoPendingAttempt)
    }

    /// Create a provider-denied error.
    #[must_use]
    pub fn provider_denied(reason: impl Into<String>) -> Self {
        Self::ProviderDenied(reason.into())
    }

    /// Create a token-exchange error.
    #[must_use]
    pub fn token_exchange(details: impl Into<String>) -> Self {
        Self::TokenExchangeFailed(details.into())
    }

    /// Create a profile-fetch error.
    #[must_use]
    pub fn profile_fetch(details: impl Into<String>) -> Self {
        Self::ProfileFetchFailed(details.into())
    }
}
