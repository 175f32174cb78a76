//! Redirect URI construction for the site's callback page.
//!
//! The same site may be served from a local dev server, a custom domain, or
//! a project subdirectory on a static host. Loopback origins always use the
//! callback path at the root; other origins prefix it with the deployment's
//! base path.

use url::Url;

use crate::oauth::error::{Error, Result};

/// Path of the callback page relative to the site root.
pub const CALLBACK_PATH: &str = "auth/callback/";

/// `true` for hosts that resolve to this machine.
#[must_use]
pub fn is_loopback_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}

/// Build the redirect URI for a site origin.
///
/// `base_path` is the deployment subdirectory (e.g. `/parada-site`); empty
/// or `/` means the site is served from the root.
///
/// ```rust
/// use bloggate::oauth::auth::redirect::callback_uri;
///
/// assert_eq!(
///     callback_uri("https://user.github.io", Some("/my-blog")).unwrap(),
///     "https://user.github.io/my-blog/auth/callback/"
/// );
/// assert_eq!(
///     callback_uri("http://localhost:1313", Some("/my-blog")).unwrap(),
///     "http://localhost:1313/auth/callback/"
/// );
/// ```
///
/// # Errors
///
/// Returns `Error::Url` if `origin` is not an absolute URL and
/// `Error::Config` if it has no host.
pub fn callback_uri(origin: &str, base_path: Option<&str>) -> Result<String> {
    let origin = Url::parse(origin)?;
    let host = origin
        .host_str()
        .ok_or_else(|| Error::config(format!("site origin '{origin}' has no host")))?;

    let base = if is_loopback_host(host) {
        ""
    } else {
        base_path.map(|p| p.trim_matches('/')).unwrap_or_default()
    };

    let mut path = String::from("/");
    if !base.is_empty() {
        path.push_str(base);
        path.push('/');
    }
    path.push_str(CALLBACK_PATH);

    let mut uri = origin;
    uri.set_path(&path);
    uri.set_query(None);
    uri.set_fragment(None);
    Ok(uri.to_string())
}
