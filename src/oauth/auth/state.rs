//! The in-flight login attempt.
//!
//! [`PendingAttempt`] binds one state nonce to one PKCE pair. It is written
//! by `begin_login`, read exactly once by `complete_login`, and deleted on
//! every outcome of that read.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::pkce::Pkce;

/// Random bytes behind a state nonce (22 base64url characters).
const STATE_BYTES: usize = 16;

/// Generate a random state nonce for CSRF protection.
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// PKCE data and state nonce of a login attempt awaiting its callback.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttempt {
    /// PKCE code verifier. Secret.
    pub code_verifier: String,
    /// PKCE code challenge sent in the authorization URL.
    pub code_challenge: String,
    /// State nonce echoed back by the provider.
    pub state: String,
    /// When `begin_login` created the attempt.
    pub created_at: DateTime<Utc>,
}

impl PendingAttempt {
    /// Create an attempt with a fresh PKCE pair and nonce.
    #[must_use]
    pub fn new() -> Self {
        Self::from_pkce(Pkce::generate(), generate_state())
    }

    /// Create an attempt from existing values.
    #[must_use]
    pub fn from_pkce(pkce: Pkce, state: String) -> Self {
        Self {
            code_verifier: pkce.verifier,
            code_challenge: pkce.challenge,
            state,
            created_at: Utc::now(),
        }
    }

    /// The PKCE pair of this attempt.
    #[must_use]
    pub fn pkce(&self) -> Pkce {
        Pkce {
            verifier: self.code_verifier.clone(),
            challenge: self.code_challenge.clone(),
            method: super::pkce::CHALLENGE_METHOD,
        }
    }

    /// Exact comparison against the state received in the callback.
    #[must_use]
    pub fn matches_state(&self, received_state: &str) -> bool {
        self.state == received_state
    }

    /// `true` once the attempt is older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= ttl
    }
}

impl Default for PendingAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PendingAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAttempt")
            .field("code_verifier", &"[redacted]")
            .field("code_challenge", &self.code_challenge)
            .field("state", &self.state)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::auth::pkce::is_url_safe;

    #[test]
    fn test_new_attempt_shape() {
        let attempt = PendingAttempt::new();

        assert_eq!(attempt.code_verifier.len(), 43);
        assert_eq!(attempt.state.len(), 22);
        assert!(is_url_safe(&attempt.state));
        assert!(Pkce::verify(&attempt.code_verifier, &attempt.code_challenge));
    }

    #[test]
    fn test_attempts_are_unique() {
        let a = PendingAttempt::new();
        let b = PendingAttempt::new();

        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn test_matches_state_is_exact() {
        let attempt = PendingAttempt::new();
        let received = attempt.state.clone();

        assert!(attempt.matches_state(&received));
        assert!(!attempt.matches_state(""));
        assert!(!attempt.matches_state(&received.to_uppercase()));
        assert!(!attempt.matches_state(&format!("{received} ")));
    }

    #[test]
    fn test_expiry() {
        let attempt = PendingAttempt::new();
        let ttl = Duration::minutes(10);

        assert!(!attempt.is_expired_at(ttl, attempt.created_at));
        assert!(!attempt.is_expired_at(ttl, attempt.created_at + Duration::minutes(9)));
        assert!(attempt.is_expired_at(ttl, attempt.created_at + Duration::minutes(10)));
    }

    #[test]
    fn test_serde_keeps_all_fields() {
        let attempt = PendingAttempt::new();
        let json = serde_json::to_string(&attempt).unwrap();
        let restored: PendingAttempt = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, attempt);
    }

    #[test]
    fn test_debug_redacts_verifier() {
        let attempt = PendingAttempt::new();
        assert!(!format!("{attempt:?}").contains(&attempt.code_verifier));
    }
}
