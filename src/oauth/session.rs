//! Session and user data persisted after a successful login.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Role given to every account registered through login.
pub const DEFAULT_ROLE: &str = "blogger";

/// Profile snapshot taken from the identity provider at login time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

/// An authenticated session.
///
/// Stored as a single blob so it is either fully present or fully absent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer credential issued by the provider. Never logged.
    pub access_token: String,
    pub user: UserProfile,
    /// Absolute expiry; the session is treated as absent from this instant on.
    pub expires_at: DateTime<Utc>,
    /// Id of the provider that issued the token.
    pub provider: String,
}

impl Session {
    /// Create a session expiring `expires_in_secs` after `now`.
    ///
    /// Returns `None` if the expiry is not representable.
    #[must_use]
    pub fn issued_at(
        now: DateTime<Utc>,
        access_token: impl Into<String>,
        expires_in_secs: i64,
        user: UserProfile,
        provider: impl Into<String>,
    ) -> Option<Self> {
        Some(Self {
            access_token: access_token.into(),
            user,
            expires_at: expiry_after(now, expires_in_secs)?,
            provider: provider.into(),
        })
    }

    /// `true` while `now` is strictly before `expires_at`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Time left until expiry, or `None` once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.is_valid_at(now).then(|| self.expires_at - now)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[redacted]")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .field("provider", &self.provider)
            .finish()
    }
}

/// Local account record kept for the blogging side of the site.
///
/// Written on each successful login and kept across logouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub verified_email: bool,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    /// Blog namespace derived from the email's local part.
    pub blog_tenant: String,
}

impl UserRecord {
    /// Record a login of `user` at `now`, keeping `created_at` and `role`
    /// from `previous` when it describes the same account.
    #[must_use]
    pub fn register(user: &UserProfile, previous: Option<&UserRecord>, now: DateTime<Utc>) -> Self {
        let previous = previous.filter(|p| p.id == user.id);
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            picture: user.avatar_url.clone(),
            verified_email: user.email_verified,
            role: previous
                .map(|p| p.role.clone())
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            created_at: previous.map_or(now, |p| p.created_at),
            last_login: now,
            blog_tenant: blog_tenant(&user.email),
        }
    }
}

/// `now + secs`, or `None` when that overflows the calendar.
#[must_use]
pub fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
}

/// Lower-cased local part of `email` restricted to `[a-z0-9]`.
#[must_use]
pub fn blog_tenant(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Snapshot of the authentication state for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub provider: String,
    pub authenticated: bool,
    pub user: Option<UserProfile>,
    /// Expiry of the stored session, also reported once it has passed.
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_secs: Option<i64>,
    pub pending_attempt: bool,
}
