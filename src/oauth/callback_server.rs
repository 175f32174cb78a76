//! Loopback listener for the provider's redirect.
//!
//! When the redirect URI points at this machine, the CLI can receive the
//! callback itself instead of asking the user to paste the URL:
//!
//! - Listens on `127.0.0.1` at the redirect URI's port and path
//! - Captures the query of the first callback request
//! - Shows a short page telling the user to return to the terminal
//! - Shuts down after the first callback, on cancel, or on drop
//!
//! The listener hands the raw [`CallbackParams`] back unvalidated; state and
//! code checks belong to `AuthSession::complete_login`.
//!
//! # Example
//!
//! ```rust,no_run
//! use bloggate::oauth::callback_server::{CallbackConfig, CallbackServer};
//! use std::time::Duration;
//!
//! # async fn example() -> bloggate::oauth::Result<()> {
//! let handle = CallbackServer::new(CallbackConfig::new(1313, "Google")).start().await?;
//! // ... send the user agent to the authorization URL ...
//! let params = handle.wait(Duration::from_secs(300)).await?;
//! println!("state: {:?}", params.state);
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use super::auth::redirect::CALLBACK_PATH;
use super::auth::CallbackParams;
use super::error::{Error, Result};

/// Configuration for the callback listener.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Port to listen on. `0` picks a free port.
    pub port: u16,
    /// Provider name for logging and display.
    pub provider_name: String,
    /// Path to listen on (default: `/auth/callback/`).
    pub callback_path: String,
}

impl CallbackConfig {
    /// Create a config listening on the default callback path.
    pub fn new(port: u16, provider_name: impl Into<String>) -> Self {
        Self {
            port,
            provider_name: provider_name.into(),
            callback_path: format!("/{CALLBACK_PATH}"),
        }
    }

    /// Listen on the port and path of a loopback redirect URI.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `redirect_uri` does not point at this machine.
    pub fn for_redirect_uri(redirect_uri: &str, provider_name: impl Into<String>) -> Result<Self> {
        let url = url::Url::parse(redirect_uri)?;
        let host = url.host_str().unwrap_or_default();
        if !super::auth::redirect::is_loopback_host(host) {
            return Err(Error::config(format!(
                "redirect URI '{redirect_uri}' is not a loopback address"
            )));
        }
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::config(format!("redirect URI '{redirect_uri}' has no port")))?;
        Ok(Self::new(port, provider_name).with_path(url.path()))
    }

    /// Set a custom callback path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }
}

struct ServerState {
    result_tx: Mutex<Option<oneshot::Sender<CallbackParams>>>,
    provider_name: String,
}

/// One-shot callback listener.
pub struct CallbackServer {
    config: CallbackConfig,
}

impl CallbackServer {
    pub fn new(config: CallbackConfig) -> Self {
        Self { config }
    }

    /// Bind the listener and start serving in the background.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the port cannot be bound.
    pub async fn start(self) -> Result<CallbackHandle> {
        let (result_tx, result_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ServerState {
            result_tx: Mutex::new(Some(result_tx)),
            provider_name: self.config.provider_name.clone(),
        });

        let app = Router::new()
            .route(&self.config.callback_path, get(handle_callback))
            .with_state(state);

        // Bind to localhost only
        let addr = SocketAddr::from(([127, 0, 0, 1], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!(port = self.config.port, error = %e, "Failed to bind callback listener");
            Error::config(format!(
                "Failed to start callback listener on port {}: {}",
                self.config.port, e
            ))
        })?;
        let port = listener.local_addr()?.port();

        info!(
            port,
            path = %self.config.callback_path,
            provider = %self.config.provider_name,
            "Waiting for OAuth callback"
        );

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                    debug!(port, "Callback listener shutdown requested");
                })
                .await
                .map_err(|e| error!(error = %e, "Callback listener error"))
        });

        Ok(CallbackHandle {
            result_rx: Some(result_rx),
            shutdown_tx: Some(shutdown_tx),
            port,
            callback_path: self.config.callback_path,
        })
    }
}

/// Handle for a running listener. Dropping it stops the listener.
pub struct CallbackHandle {
    result_rx: Option<oneshot::Receiver<CallbackParams>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
    callback_path: String,
}

impl CallbackHandle {
    /// Wait for the first callback, then stop the listener.
    ///
    /// # Errors
    ///
    /// Returns a `TimedOut` I/O error when nothing arrives within `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<CallbackParams> {
        let result_rx = self
            .result_rx
            .take()
            .ok_or_else(|| Error::config("Callback handle already consumed"))?;

        let result = tokio::select! {
            params = result_rx => {
                params.map_err(|_| Error::config("Callback channel closed unexpectedly"))
            }
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "OAuth callback timed out");
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no OAuth callback within {} seconds", timeout.as_secs()),
                )))
            }
        };

        self.shutdown();
        result
    }

    /// Address the listener is reachable at.
    pub fn callback_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.callback_path)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop the listener without waiting.
    pub fn cancel(mut self) {
        self.shutdown();
        debug!(port = self.port, "Callback listener canceled");
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_callback(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    debug!(?params, "Received OAuth callback");

    let page = match params.provider_error() {
        Some(error) => error_html(&state.provider_name, &error),
        None => received_html(&state.provider_name),
    };

    match state.result_tx.lock().await.take() {
        Some(tx) => {
            let _ = tx.send(params);
        }
        None => debug!("Ignoring repeated callback"),
    }

    Html(page)
}

const PAGE_STYLE: &str = r#"
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
            background: #f7f7f5;
            color: #222;
        }
        .container { text-align: center; padding: 2rem; max-width: 480px; }
        .hint { font-size: 0.875rem; color: #666; }
        code { color: #b42318; }
"#;

fn received_html(provider: &str) -> String {
    let provider = escape_html(provider);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{provider} sign-in</title>
    <style>{PAGE_STYLE}</style>
</head>
<body>
    <div class="container">
        <h1>Sign-in received</h1>
        <p>Return to the terminal to finish signing in with {provider}.</p>
        <p class="hint">You can close this window.</p>
    </div>
</body>
</html>"#
    )
}

fn error_html(provider: &str, error: &str) -> String {
    let provider = escape_html(provider);
    let error = escape_html(error);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{provider} sign-in failed</title>
    <style>{PAGE_STYLE}</style>
</head>
<body>
    <div class="container">
        <h1>Sign-in failed</h1>
        <p>{provider} reported: <code>{error}</code></p>
        <p class="hint">Close this window and try again from the terminal.</p>
    </div>
</body>
</html>"#
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
