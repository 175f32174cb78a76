use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use bloggate::config::{AppConfig, ProviderKind};
use bloggate::oauth::{
    AuthError, AuthSession, CallbackConfig, CallbackParams, CallbackServer, DemoProvider, Error,
    FileStore, GoogleProvider, IdentityProvider, SessionStatus,
};

type Auth = AuthSession<Box<dyn IdentityProvider>, FileStore>;

#[derive(Parser)]
#[command(name = "bloggate", version, about = "Sign in to the blog dashboard")]
struct Cli {
    /// Extra config file layered over the user config.
    #[arg(long, global = true, env = "BLOGGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `bloggate=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in through the configured identity provider.
    Login {
        /// Print the authorization URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },
    /// Finish a login from the URL the browser was redirected to.
    Complete {
        /// Full callback URL, including `code` and `state`.
        callback_url: String,
    },
    /// Show the session state.
    Status,
    /// Print the signed-in user.
    Whoami,
    /// Clear the session.
    Logout,
    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigAction),
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the user config file location.
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    if cli.json_logs {
        config.log.json = true;
    }
    let _log_guard = bloggate::logging::init(&config.log);
    tracing::debug!(version = bloggate::VERSION, "bloggate starting");

    match cli.command {
        Command::Login { no_browser } => login(&config, no_browser).await,
        Command::Complete { callback_url } => complete(&config, &callback_url).await,
        Command::Status => status(&config).await,
        Command::Whoami => whoami(&config).await,
        Command::Logout => logout(&config).await,
        Command::Config(ConfigAction::Show) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Config(ConfigAction::Path) => {
            match AppConfig::config_path() {
                Some(path) => println!("{}", path.display()),
                None => bail!("no config directory on this platform"),
            }
            Ok(())
        }
    }
}

async fn open_session(config: &AppConfig) -> Result<Auth> {
    let provider: Box<dyn IdentityProvider> = match config.provider.kind {
        ProviderKind::Google => Box::new(GoogleProvider::new(config.oauth_config()?)),
        ProviderKind::Demo => Box::new(DemoProvider::new(
            config.redirect_uri()?,
            &config.provider.demo_user,
        )?),
    };
    let store = config.session_store()?;
    tracing::debug!(path = %store.path().display(), "Opening session store");

    let auth = AuthSession::open(provider, store)
        .await
        .context("failed to read session store")?;
    Ok(auth.with_attempt_ttl(config.attempt_ttl()))
}

async fn login(config: &AppConfig, no_browser: bool) -> Result<()> {
    let auth = open_session(config).await?;
    if let Some(user) = auth.current_user().await {
        println!("Already signed in as {} <{}>", user.display_name, user.email);
        return Ok(());
    }

    let redirect_uri = auth.provider().oauth_config().redirect_uri.clone();
    let listener = if auth.provider().oauth_config().loopback_port().is_some() {
        let callback = CallbackConfig::for_redirect_uri(&redirect_uri, auth.provider().name())?;
        Some(CallbackServer::new(callback).start().await?)
    } else {
        None
    };

    let redirect = auth.begin_login().await?;
    if no_browser {
        println!("Open this URL to sign in:\n{}", redirect.url);
    } else {
        println!("Opening browser for {} sign-in...", auth.provider().name());
        if open::that(&redirect.url).is_err() {
            println!("Could not open browser. Please visit:\n{}", redirect.url);
        }
    }

    let Some(listener) = listener else {
        println!("After signing in, run:\n  bloggate complete '<the URL you were redirected to>'");
        return Ok(());
    };

    println!("Waiting for callback on {} ...", listener.callback_url());
    let params = listener.wait(config.callback_timeout()).await?;
    finish(&auth, &params).await
}

async fn complete(config: &AppConfig, callback_url: &str) -> Result<()> {
    let auth = open_session(config).await?;
    let params = CallbackParams::from_url(callback_url).context("invalid callback URL")?;
    finish(&auth, &params).await
}

async fn finish(auth: &Auth, params: &CallbackParams) -> Result<()> {
    match auth.complete_from_callback(params).await {
        Ok(session) => {
            println!(
                "Signed in as {} <{}>",
                session.user.display_name, session.user.email
            );
            if let Ok(Some(record)) = auth.registered_user().await {
                println!("Blog: {} ({})", record.blog_tenant, record.role);
            }
            Ok(())
        }
        Err(Error::Auth(err)) if err.is_security_anomaly() => {
            bail!("{err}. The callback does not belong to the current login; run `bloggate login` again.")
        }
        Err(err) => Err(err).context("sign-in failed"),
    }
}

async fn status(config: &AppConfig) -> Result<()> {
    let auth = open_session(config).await?;
    let status = auth.status().await?;
    println!("{}", describe_status(&status));
    Ok(())
}

async fn whoami(config: &AppConfig) -> Result<()> {
    let auth = open_session(config).await?;
    match auth.current_user().await {
        Some(user) => {
            println!("{} <{}>", user.display_name, user.email);
            Ok(())
        }
        None => Err(AuthError::NotAuthenticated.into()),
    }
}

async fn logout(config: &AppConfig) -> Result<()> {
    let auth = open_session(config).await?;
    let was_signed_in = auth.is_authenticated().await;
    auth.logout().await?;
    if was_signed_in {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

fn describe_status(status: &SessionStatus) -> String {
    let mut lines = Vec::new();
    match (&status.user, status.remaining_secs) {
        (Some(user), Some(remaining)) => {
            let hours = remaining / 3600;
            let mins = (remaining % 3600) / 60;
            lines.push(format!(
                "{} [valid ({hours}h {mins}m remaining)]",
                status.provider
            ));
            lines.push(format!("  {} <{}>", user.display_name, user.email));
        }
        _ if status.expires_at.is_some() => {
            lines.push(format!("{} [expired]", status.provider));
        }
        _ => lines.push(format!("{} [not signed in]", status.provider)),
    }
    if status.pending_attempt {
        lines.push("  login in progress".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloggate::oauth::UserProfile;
    use chrono::Utc;

    fn status() -> SessionStatus {
        SessionStatus {
            provider: "google".into(),
            authenticated: false,
            user: None,
            expires_at: None,
            remaining_secs: None,
            pending_attempt: false,
        }
    }

    #[test]
    fn test_describe_signed_in() {
        let mut s = status();
        s.authenticated = true;
        s.user = Some(UserProfile {
            id: "1".into(),
            email: "jane@example.com".into(),
            display_name: "Jane".into(),
            avatar_url: None,
            email_verified: true,
        });
        s.expires_at = Some(Utc::now());
        s.remaining_secs = Some(2 * 3600 + 5 * 60 + 7);

        let text = describe_status(&s);
        assert!(text.starts_with("google [valid (2h 5m remaining)]"));
        assert!(text.contains("Jane <jane@example.com>"));
    }

    #[test]
    fn test_describe_expired_and_pending() {
        let mut s = status();
        s.expires_at = Some(Utc::now());
        s.pending_attempt = true;

        assert_eq!(describe_status(&s), "google [expired]\n  login in progress");
        assert_eq!(describe_status(&status()), "google [not signed in]");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["bloggate", "login", "--no-browser"]).unwrap();
        assert!(matches!(cli.command, Command::Login { no_browser: true }));

        let cli = Cli::try_parse_from(["bloggate", "config", "show", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::Config(ConfigAction::Show)));
    }
}
