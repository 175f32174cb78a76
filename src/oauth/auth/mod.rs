//! OAuth 2.0 authorization code flow with PKCE.
//!
//! - **PKCE**: S256 challenge derived from a 32-byte random verifier
//! - **State Validation**: single-use nonce compared exactly on callback
//! - **Provider Configuration**: Google preset and a builder for other providers
//! - **Redirect URIs**: derived from the site origin and deployment base path
//!
//! # Architecture
//!
//! ```text
//! +----------------+     +------------------+     +----------------+
//! |  AuthSession   | --> | IdentityProvider | --> |  OAuthConfig   |
//! +----------------+     +------------------+     +----------------+
//!        |                        |
//!        v                        v
//! +----------------+     +----------------+
//! | PendingAttempt | --> |      Pkce      |
//! +----------------+     +----------------+
//!        |
//!        v
//! +----------------+
//! | KeyValueStore  |
//! +----------------+
//! ```

pub mod callback;
pub mod config;
pub mod flow;
pub mod pkce;
pub mod redirect;
pub mod state;

pub use callback::CallbackParams;
pub use config::{OAuthConfig, OAuthConfigBuilder};
pub use flow::{AuthSession, LoginRedirect, DEFAULT_ATTEMPT_TTL_SECS};
pub use pkce::Pkce;
pub use redirect::callback_uri;
pub use state::{generate_state, PendingAttempt};
