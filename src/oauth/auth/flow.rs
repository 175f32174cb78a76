//! Login session orchestrator.
//!
//! [`AuthSession`] drives the authorization code flow with PKCE and owns the
//! cached view of the persisted session:
//!
//! - Starting a login (PKCE pair, state nonce, authorization URL)
//! - Completing it from the provider's callback
//! - Answering "who is signed in" from the cache, without I/O
//! - Logout
//!
//! # State machine
//!
//! ```text
//! Idle --begin_login--> AttemptStarted --complete_login ok--> Authenticated
//!                            |                                    |
//!                            +--complete_login err--> Idle <------+ logout / expiry
//! ```
//!
//! At most one attempt is in flight; `begin_login` overwrites the previous
//! one, and `complete_login` consumes it on every exit path.
//!
//! # Example
//!
//! ```rust
//! use bloggate::oauth::auth::{AuthSession, CallbackParams};
//! use bloggate::oauth::providers::DemoProvider;
//! use bloggate::oauth::storage::MemoryStore;
//!
//! # async fn example() -> bloggate::oauth::Result<()> {
//! let provider = DemoProvider::new("http://localhost:1313/auth/callback/", "demo1")?;
//! let auth = AuthSession::open(provider, MemoryStore::new()).await?;
//!
//! let redirect = auth.begin_login().await?;
//! // The user agent visits `redirect.url` and comes back to the callback page.
//! let params = CallbackParams::from_url(&redirect.url)?;
//! let session = auth.complete_from_callback(&params).await?;
//!
//! assert!(auth.is_authenticated().await);
//! assert_eq!(auth.current_user().await, Some(session.user));
//! # Ok(())
//! # }
//! ```

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::callback::CallbackParams;
use super::state::PendingAttempt;
use crate::oauth::error::{AuthError, Error, Result};
use crate::oauth::providers::IdentityProvider;
use crate::oauth::session::{expiry_after, Session, SessionStatus, UserProfile, UserRecord};
use crate::oauth::storage::{load_json, save_json, KeyValueStore};

/// How long an unfinished login attempt stays valid.
pub const DEFAULT_ATTEMPT_TTL_SECS: i64 = 10 * 60;

/// Where to send the user agent to start a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    /// Provider authorization URL.
    pub url: String,
    /// State nonce embedded in `url`.
    pub state: String,
}

/// Authentication state for one provider.
///
/// `S` is the durable store holding the session and the user record; `A`
/// holds the in-flight attempt. Both default to the same backend.
///
/// # Thread Safety
///
/// `AuthSession` is `Send + Sync` when the provider and stores are. Concurrent
/// logins are not supported: the last `begin_login` wins.
pub struct AuthSession<P, S, A = S>
where
    P: IdentityProvider,
    S: KeyValueStore,
    A: KeyValueStore,
{
    provider: P,
    store: S,
    attempts: A,
    attempt_ttl: Duration,
    /// Session as last read from or written to `store`, expired or not.
    cached: RwLock<Option<Session>>,
    /// Held while the in-flight attempt is written or consumed.
    attempt_lock: Mutex<()>,
}

impl<P, S> AuthSession<P, S, S>
where
    P: IdentityProvider,
    S: KeyValueStore + Clone,
{
    /// Open a session using one store for both the session and the attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn open(provider: P, store: S) -> Result<Self> {
        Self::with_stores(provider, store.clone(), store).await
    }
}

impl<P, S, A> AuthSession<P, S, A>
where
    P: IdentityProvider,
    S: KeyValueStore,
    A: KeyValueStore,
{
    /// Open a session with separate durable and attempt stores.
    ///
    /// The cached view is derived from `store` immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store cannot be read.
    pub async fn with_stores(provider: P, store: S, attempts: A) -> Result<Self> {
        let session = Self {
            provider,
            store,
            attempts,
            attempt_ttl: Duration::seconds(DEFAULT_ATTEMPT_TTL_SECS),
            cached: RwLock::new(None),
            attempt_lock: Mutex::new(()),
        };
        session.reload().await?;
        Ok(session)
    }

    /// Override how long an in-flight attempt stays valid.
    #[must_use]
    pub fn with_attempt_ttl(mut self, ttl: Duration) -> Self {
        self.attempt_ttl = ttl;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn session_key(&self) -> String {
        format!("{}:session", self.provider.provider_id())
    }

    fn attempt_key(&self) -> String {
        format!("{}:oauth_attempt", self.provider.provider_id())
    }

    fn user_record_key(&self) -> String {
        format!("{}:user_record", self.provider.provider_id())
    }

    /// Re-derive the cached session from the durable store.
    ///
    /// A stored value that does not parse, or that was issued by another
    /// provider, is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    #[instrument(skip(self), fields(provider = %self.provider.provider_id()))]
    pub async fn reload(&self) -> Result<()> {
        let raw = self.store.get(&self.session_key()).await?;
        let loaded = match raw.map(|raw| serde_json::from_str::<Session>(&raw)) {
            Some(Ok(session)) if session.provider != self.provider.provider_id() => {
                debug!(stored = %session.provider, "Ignoring session from another provider");
                None
            }
            Some(Ok(session)) => Some(session),
            Some(Err(e)) => {
                warn!(error = %e, "Ignoring unreadable stored session");
                None
            }
            None => None,
        };
        *self.cached.write().await = loaded;
        Ok(())
    }

    /// Start a login attempt.
    ///
    /// Generates a fresh PKCE pair and state nonce, stores them as the single
    /// in-flight attempt (replacing any previous one), and returns the
    /// authorization URL. No network request is made.
    ///
    /// A stored session that has already expired is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot be stored.
    #[instrument(skip(self), fields(provider = %self.provider.provider_id()))]
    pub async fn begin_login(&self) -> Result<LoginRedirect> {
        {
            let mut cached = self.cached.write().await;
            if cached.as_ref().is_some_and(|s| !s.is_valid()) {
                debug!("Removing expired session");
                self.store.delete(&self.session_key()).await?;
                *cached = None;
            }
        }

        let attempt = PendingAttempt::new();
        {
            let _guard = self.attempt_lock.lock().await;
            save_json(&self.attempts, &self.attempt_key(), &attempt).await?;
        }

        let url = self.provider.build_auth_url(&attempt.pkce(), &attempt.state);
        info!(provider = %self.provider.name(), "Login attempt started");

        Ok(LoginRedirect {
            url,
            state: attempt.state,
        })
    }

    /// Finish a login from the values of the provider's callback.
    ///
    /// Checks run in this order, each failing the attempt:
    ///
    /// 1. `provider_error` present: [`AuthError::ProviderDenied`]
    /// 2. no attempt in flight, or it outlived its TTL: [`AuthError::NoPendingAttempt`]
    /// 3. `state` differs from the issued nonce: [`AuthError::StateMismatch`]
    /// 4. `code` absent or empty: [`AuthError::MissingAuthorizationCode`]
    /// 5. code exchange fails: [`AuthError::TokenExchangeFailed`]
    /// 6. profile fetch fails: [`AuthError::ProfileFetchFailed`]
    ///
    /// Nothing reaches the token endpoint before step 3 has passed. The
    /// in-flight attempt is deleted on every outcome, and concurrent calls
    /// consume it one at a time, so at most one of them gets past step 2. The session is
    /// persisted only on full success; a token obtained before a failed
    /// profile fetch is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Auth` for the failures above and `Error::Storage` if
    /// the attempt or the session cannot be read or written.
    #[instrument(skip(self, code, state), fields(provider = %self.provider.provider_id()))]
    pub async fn complete_login(
        &self,
        code: Option<&str>,
        state: &str,
        provider_error: Option<&str>,
    ) -> Result<Session> {
        let attempt = self.take_attempt().await;

        if let Some(error) = provider_error {
            warn!(%error, "Identity provider denied the login");
            return Err(AuthError::provider_denied(error).into());
        }

        let attempt = attempt?.ok_or_else(|| {
            warn!("Callback received with no login attempt in flight");
            AuthError::NoPendingAttempt
        })?;

        if attempt.is_expired_at(self.attempt_ttl, Utc::now()) {
            warn!(created_at = %attempt.created_at, "Login attempt expired");
            return Err(AuthError::NoPendingAttempt.into());
        }

        if !attempt.matches_state(state) {
            warn!("OAuth state mismatch, rejecting callback");
            return Err(AuthError::StateMismatch.into());
        }

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingAuthorizationCode)?;

        let grant = self
            .provider
            .exchange_code(code, &attempt.code_verifier)
            .await
            .map_err(|e| {
                warn!(error = %e, "Token exchange failed");
                AuthError::token_exchange(failure_details(&e))
            })?;

        let expires_at = Some(grant.expires_in)
            .filter(|secs| *secs > 0)
            .and_then(|secs| expiry_after(Utc::now(), secs))
            .ok_or_else(|| {
                warn!(expires_in = grant.expires_in, "Token lifetime out of range");
                AuthError::token_exchange(format!(
                    "expires_in out of range: {}",
                    grant.expires_in
                ))
            })?;

        let user = self
            .provider
            .fetch_profile(&grant.access_token)
            .await
            .map_err(|e| {
                warn!(error = %e, "Profile fetch failed, discarding token");
                AuthError::profile_fetch(failure_details(&e))
            })?;

        let session = Session {
            access_token: grant.access_token,
            user,
            expires_at,
            provider: self.provider.provider_id().to_string(),
        };

        {
            let mut cached = self.cached.write().await;
            save_json(&self.store, &self.session_key(), &session).await?;
            *cached = Some(session.clone());
        }

        self.register_user(&session.user).await;

        info!(
            user_id = %session.user.id,
            expires_at = %session.expires_at,
            "Login completed"
        );
        Ok(session)
    }

    /// [`complete_login`](Self::complete_login) from parsed callback parameters.
    ///
    /// A missing `state` compares as the empty string. Only the provider's
    /// error code is carried into [`AuthError::ProviderDenied`]; its
    /// description is logged.
    ///
    /// # Errors
    ///
    /// Same as `complete_login`.
    pub async fn complete_from_callback(&self, params: &CallbackParams) -> Result<Session> {
        if let Some(description) = params.error_description.as_deref() {
            debug!(%description, "Provider error description");
        }
        self.complete_login(
            params.code.as_deref(),
            params.state.as_deref().unwrap_or_default(),
            params.error.as_deref(),
        )
        .await
    }

    /// Load and delete the in-flight attempt.
    ///
    /// The delete is issued even when the read fails.
    async fn take_attempt(&self) -> Result<Option<PendingAttempt>> {
        let _guard = self.attempt_lock.lock().await;
        let key = self.attempt_key();
        let raw = self.attempts.get(&key).await;
        let cleared = self.attempts.delete(&key).await;

        let raw = raw?;
        cleared?;

        Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(attempt) => Some(attempt),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable login attempt");
                None
            }
        }))
    }

    /// Write or refresh the local user record. Failures are logged only.
    async fn register_user(&self, user: &UserProfile) {
        let key = self.user_record_key();
        let previous = match load_json::<UserRecord, _>(&self.store, &key).await {
            Ok(previous) => previous,
            Err(e) => {
                debug!(error = %e, "Replacing unreadable user record");
                None
            }
        };

        let record = UserRecord::register(user, previous.as_ref(), Utc::now());
        match save_json(&self.store, &key, &record).await {
            Ok(()) => debug!(blog_tenant = %record.blog_tenant, "User record saved"),
            Err(e) => warn!(error = %e, "Failed to save user record"),
        }
    }

    /// `true` iff a session is cached and has not expired. No I/O.
    pub async fn is_authenticated(&self) -> bool {
        self.cached.read().await.as_ref().is_some_and(Session::is_valid)
    }

    /// Profile of the signed-in user, if authenticated.
    pub async fn current_user(&self) -> Option<UserProfile> {
        self.valid_session().await.map(|s| s.user)
    }

    /// Bearer token of the current session, if authenticated.
    pub async fn access_token(&self) -> Option<String> {
        self.valid_session().await.map(|s| s.access_token)
    }

    /// The current session, if authenticated.
    pub async fn session(&self) -> Option<Session> {
        self.valid_session().await
    }

    async fn valid_session(&self) -> Option<Session> {
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_valid())
            .cloned()
    }

    /// Clear the session and any in-flight attempt.
    ///
    /// Idempotent. The in-memory view is cleared even if the store fails.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    #[instrument(skip(self), fields(provider = %self.provider.provider_id()))]
    pub async fn logout(&self) -> Result<()> {
        let was_authenticated = {
            let mut cached = self.cached.write().await;
            cached.take().is_some_and(|s| s.is_valid())
        };

        let session = self.store.delete(&self.session_key()).await;
        let attempt = self.attempts.delete(&self.attempt_key()).await;
        session?;
        attempt?;

        if was_authenticated {
            info!("Logged out");
        } else {
            debug!("Logout with no active session");
        }
        Ok(())
    }

    /// Snapshot for status reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt store cannot be read.
    pub async fn status(&self) -> Result<SessionStatus> {
        let now = Utc::now();
        let cached = self.cached.read().await.clone();
        let pending_attempt = self
            .attempts
            .get(&self.attempt_key())
            .await?
            .and_then(|raw| serde_json::from_str::<PendingAttempt>(&raw).ok())
            .is_some_and(|a| !a.is_expired_at(self.attempt_ttl, now));

        let valid = cached.as_ref().filter(|s| s.is_valid_at(now));
        Ok(SessionStatus {
            provider: self.provider.provider_id().to_string(),
            authenticated: valid.is_some(),
            user: valid.map(|s| s.user.clone()),
            expires_at: cached.as_ref().map(|s| s.expires_at),
            remaining_secs: valid
                .and_then(|s| s.remaining_at(now))
                .map(|d| d.num_seconds()),
            pending_attempt,
        })
    }

    /// The local user record written by the last successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the record is corrupt.
    pub async fn registered_user(&self) -> Result<Option<UserRecord>> {
        load_json(&self.store, &self.user_record_key()).await
    }
}

/// Detail string for a provider failure.
fn failure_details(err: &Error) -> String {
    match err {
        Error::Api { status, message } => format!("HTTP {status}: {message}"),
        other => other.to_string(),
    }
}
