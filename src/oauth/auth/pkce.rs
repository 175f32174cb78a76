//! PKCE (RFC 7636) verifier and S256 challenge.
//!
//! The verifier is 32 random bytes, base64url without padding, which yields
//! exactly 43 characters from the unreserved set. The challenge is
//! `base64url(SHA-256(verifier))`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes behind a verifier.
const VERIFIER_BYTES: usize = 32;

/// The only challenge method this crate sends.
pub const CHALLENGE_METHOD: &str = "S256";

/// A verifier/challenge pair for one login attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Pkce {
    /// Secret, sent only to the token endpoint.
    pub verifier: String,
    /// Sent in the authorization URL.
    pub challenge: String,
    /// Always [`CHALLENGE_METHOD`].
    pub method: &'static str,
}

impl Pkce {
    /// Generate a fresh pair from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Rebuild the pair around a verifier kept from an earlier attempt.
    #[must_use]
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            method: CHALLENGE_METHOD,
        }
    }

    /// Check that `challenge` was derived from `verifier`.
    #[must_use]
    pub fn verify(verifier: &str, challenge: &str) -> bool {
        compute_challenge(verifier) == challenge
    }
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .field("method", &self.method)
            .finish()
    }
}

fn compute_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// `true` if every character is in the base64url alphabet.
pub(crate) fn is_url_safe(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
