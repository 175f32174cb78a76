/// Bloggate - sign-in for a static-site blogging platform
///
/// OAuth 2.0 authorization code flow with PKCE, persisted sessions with
/// expiry, and the configuration and logging the `bloggate` CLI runs on.

pub mod config;
pub mod logging;
pub mod oauth;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
