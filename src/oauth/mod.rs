//! # Sign-in for the blog dashboard
//!
//! OAuth 2.0 authorization code flow with PKCE, session persistence and
//! expiry handling behind a pluggable identity provider and key-value store.
//!
//! ## Core Types
//!
//! - [`AuthSession`] - Drives the login and answers "who is signed in"
//! - [`Session`] / [`UserProfile`] - What a successful login persists
//! - [`Error`] / [`AuthError`] - Error taxonomy
//!
//! ## Storage Backends
//!
//! - [`FileStore`] - JSON file with secure permissions
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Identity Providers
//!
//! - [`GoogleProvider`] - Google sign-in (form-encoded, PKCE)
//! - [`DemoProvider`] - Predefined local users, no network
//!
//! ## Security
//!
//! - File storage uses 0600 permissions on Unix
//! - Tokens, verifiers and codes are never logged
//! - The state nonce is single-use and compared exactly

pub mod auth;
pub mod callback_server;
pub mod error;
pub mod providers;
pub mod session;
pub mod storage;

pub use error::{AuthError, Error, Result};

pub use auth::{AuthSession, CallbackParams, LoginRedirect, OAuthConfig, Pkce};

pub use providers::{DemoProvider, GoogleProvider, IdentityProvider, TokenGrant};

pub use session::{Session, SessionStatus, UserProfile, UserRecord};

pub use storage::{FileStore, KeyValueStore, MemoryStore};

pub use callback_server::{CallbackConfig, CallbackHandle, CallbackServer};
