use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use portal::{
    AlertService, AuthContext, AuthError, Config, FileSessionStore, GuardConfig, GuardStatus, HttpAuthApi,
    LogNavigator, RefreshOutcome, Registration, Role, RouteGuard, SessionStore, decode_claims,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] portal::ApiError),
    #[error("access denied for role {0}")]
    Denied(Role),
    #[error("refresh failed; session cleared")]
    RefreshFailed,
    #[error("registration failed: {0}")]
    Registration(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "portal", about = "Session and role checks against the portal API")]
struct Cli {
    #[arg(long, env = "PORTAL_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "PORTAL_SESSION_PATH")]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the stored session.
    Logout,
    /// Show the stored session and its locally decoded claims.
    Whoami,
    /// Run a route guard for a role against the server.
    Check {
        #[arg(long)]
        role: Role,
        /// Stay until the denial alert expires and its redirect fires.
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
    /// Exchange the stored token for a fresh one.
    Refresh,
    /// Fetch the logged-in user's profile.
    Profile,
    /// Create an account.
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

struct CliContext {
    config: Config,
    store: Arc<FileSessionStore>,
    auth: Arc<AuthContext>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url.trim_end_matches('/').to_owned();
    }
    if let Some(session) = cli.session {
        config.session_path = session;
    }

    let store = Arc::new(FileSessionStore::new(config.session_path.clone()));
    let api = Arc::new(HttpAuthApi::new(&config.api_url, config.http_timeout)?);
    let auth = Arc::new(AuthContext::new(store.clone(), api));
    let ctx = CliContext { config, store, auth };

    match cli.command {
        Command::Login { email, password } => run_login(&ctx, &email, &password).await,
        Command::Logout => run_logout(&ctx),
        Command::Whoami => run_whoami(&ctx),
        Command::Check { role, wait } => run_check(&ctx, role, wait).await,
        Command::Refresh => run_refresh(&ctx).await,
        Command::Profile => run_profile(&ctx).await,
        Command::Register { first_name, last_name, email, password } => {
            let registration = Registration { first_name, last_name, email, password };
            run_register(&ctx, &registration).await
        }
    }
}

async fn run_login(ctx: &CliContext, email: &str, password: &str) -> Result<(), CliError> {
    let session = ctx.auth.sign_in(email, password).await?;
    let role = session.role().map_or("unknown", Role::as_str);
    println!("logged in as {role}");
    Ok(())
}

fn run_logout(ctx: &CliContext) -> Result<(), CliError> {
    ctx.auth.logout()?;
    println!("logged out");
    Ok(())
}

fn run_whoami(ctx: &CliContext) -> Result<(), CliError> {
    let session = ctx.store.get();
    if !session.is_authenticated() {
        println!("not logged in");
        return Ok(());
    }
    let claims = decode_claims(&session.token).ok();
    let json = serde_json::json!({
        "user_id": session.user_id(),
        "role": session.role(),
        "token": redact(&session.token),
        "claims": claims.map(|c| serde_json::json!({
            "user_id": c.user_id,
            "role": c.role_name,
            "exp": c.exp,
        })),
    });
    print_json(&json)
}

async fn run_check(ctx: &CliContext, role: Role, wait: bool) -> Result<(), CliError> {
    let alerts = AlertService::new(Arc::new(LogNavigator));
    let config = GuardConfig::new(role)
        .with_timeout(ctx.config.alert_timeout)
        .with_redirect(Some(ctx.config.login_path.as_str()));
    let guard = RouteGuard::mount(ctx.auth.clone(), alerts.clone(), config);

    if guard.resolved().await == GuardStatus::Authorized {
        println!("authorized as {role}");
        return Ok(());
    }
    if let Some(alert) = alerts.current() {
        println!("[{}] {}: {}", alert.severity, alert.title, alert.message);
        if let Some(target) = &alert.redirect {
            println!("redirecting to {target} in {}ms", alert.timeout.as_millis());
        }
        if wait && !alert.timeout.is_zero() {
            let mut rx = alerts.subscribe();
            let _ = rx.wait_for(Option::is_none).await;
        }
    }
    Err(CliError::Denied(role))
}

async fn run_refresh(ctx: &CliContext) -> Result<(), CliError> {
    match ctx.auth.refresh_on_mount().await {
        RefreshOutcome::Refreshed => {
            println!("session refreshed");
            Ok(())
        }
        RefreshOutcome::Skipped => {
            println!("nothing to refresh");
            Ok(())
        }
        RefreshOutcome::Superseded => {
            println!("session changed during refresh; left as is");
            Ok(())
        }
        RefreshOutcome::LoggedOut => Err(CliError::RefreshFailed),
    }
}

async fn run_profile(ctx: &CliContext) -> Result<(), CliError> {
    let user = ctx.auth.fetch_profile().await?;
    print_json(&serde_json::to_value(user)?)
}

async fn run_register(ctx: &CliContext, registration: &Registration) -> Result<(), CliError> {
    let outcome = ctx.auth.register(registration).await?;
    if outcome.is_success() {
        println!("{}", outcome.message());
        Ok(())
    } else {
        Err(CliError::Registration(outcome.message()))
    }
}

fn redact(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    format!("{head}…")
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
