use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use storefront_auth::config::normalize_base_url;
use storefront_auth::manager::LOGIN_FAILED_MESSAGE;
use storefront_auth::stub::StubBackend;
use storefront_auth::{AuthConfig, AuthError, AuthSessionManager, FileStore, GuardDecision, RouteGuard, StoreError, User};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}", LOGIN_FAILED_MESSAGE)]
    LoginFailed,
    #[error("not signed in")]
    NotSignedIn,
    #[error("{0}")]
    Rejected(String),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "storefront-auth", about = "Storefront back-office session CLI")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(long, env = "AUTH_API_BASE_URL")]
    api_base_url: Option<String>,

    #[arg(long, env = "IDENTITY_BASE_URL")]
    identity_base_url: Option<String>,

    #[arg(long, env = "AUTH_STORE_PATH", help = "Session file shared across invocations")]
    store: Option<PathBuf>,

    #[arg(
        long,
        env = "AUTH_DEMO_MODE",
        value_parser = clap::builder::BoolishValueParser::new(),
        help = "Accept the demo credentials when login fails"
    )]
    demo: Option<bool>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Session(SessionCommand),
    /// Serve the in-process stub backend and identity provider.
    ServeStub {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
}

/// Commands that operate on the persisted session.
#[derive(Subcommand, Debug)]
enum SessionCommand {
    Login(LoginArgs),
    Logout,
    /// Run startup recovery and print the resulting state.
    Status,
    Refresh,
    Profile,
    Verify,
    /// Evaluate the route guard for a requested path.
    Guard(GuardArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long, short)]
    username: String,

    #[arg(long, short, env = "AUTH_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, help = "Location preserved by the route guard")]
    return_to: Option<String>,
}

#[derive(Args, Debug)]
struct GuardArgs {
    path: String,

    #[arg(long, default_value_t = false)]
    allow_non_admin: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,storefront_auth_cli=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match cli.command {
        Command::ServeStub { addr } => run_serve_stub(addr).await,
        Command::Session(command) => run_session(&cli.config, command).await,
    }
}

async fn run_session(args: &ConfigArgs, command: SessionCommand) -> Result<(), CliError> {
    let config = resolve_config(args)?;
    let store = FileStore::open(&config.store_path)?;
    let manager = AuthSessionManager::from_config(&config, Arc::new(store))?;
    let guard = RouteGuard::new().login_path(config.login_path.clone());

    match command {
        SessionCommand::Login(args) => run_login(&manager, &guard, args).await,
        SessionCommand::Logout => {
            manager.logout().await;
            print_json(&json!({ "success": true }))
        }
        SessionCommand::Status => {
            let state = manager.init().await;
            print_json(&json!({
                "authenticated": state.is_authenticated(),
                "user": state.user(),
            }))
        }
        SessionCommand::Refresh => {
            if !manager.refresh_token().await {
                return Err(CliError::Rejected("token refresh failed".to_owned()));
            }
            print_json(&json!({ "success": true }))
        }
        SessionCommand::Profile => {
            let user = manager.get_profile().await.ok_or(CliError::NotSignedIn)?;
            print_user(&user)
        }
        SessionCommand::Verify => {
            let outcome = manager.verify().await;
            print_json(&serde_json::to_value(&outcome)?)?;
            match outcome.message {
                Some(message) if !outcome.success => Err(CliError::Rejected(message)),
                _ => Ok(()),
            }
        }
        SessionCommand::Guard(args) => {
            let state = manager.init().await;
            let guard = guard.require_admin(!args.allow_non_admin);
            print_json(&decision_json(&guard.evaluate(&state, &args.path)))
        }
    }
}

/// Environment config with command-line overrides applied on top.
fn resolve_config(cli: &ConfigArgs) -> Result<AuthConfig, CliError> {
    let mut config = AuthConfig::from_env()?;
    if let Some(url) = &cli.api_base_url {
        config.api_base_url = normalize_base_url(url)?;
    }
    if let Some(url) = &cli.identity_base_url {
        config.identity_base_url = normalize_base_url(url)?;
    }
    if let Some(path) = &cli.store {
        config.store_path.clone_from(path);
    }
    if let Some(demo) = cli.demo {
        config.demo_mode = demo;
    }
    Ok(config)
}

async fn run_login(manager: &AuthSessionManager, guard: &RouteGuard, args: LoginArgs) -> Result<(), CliError> {
    if !manager.login(&args.username, &args.password).await {
        return Err(CliError::LoginFailed);
    }
    let user = manager.current_user().ok_or(CliError::NotSignedIn)?;
    print_json(&json!({
        "success": true,
        "user": user,
        "redirect": guard.post_login_redirect(args.return_to.as_deref()),
    }))
}

async fn run_serve_stub(addr: SocketAddr) -> Result<(), CliError> {
    let stub = StubBackend::with_default_accounts();
    let local = stub.spawn(addr).await?;
    tracing::info!(%local, identity = %format!("http://{local}/identity"), "stub backend listening; ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    Ok(())
}

fn decision_json(decision: &GuardDecision) -> Value {
    match decision {
        GuardDecision::Loading => json!({ "decision": "loading" }),
        GuardDecision::Redirect { to, return_to } => {
            json!({ "decision": "redirect", "to": to, "return_to": return_to })
        }
        GuardDecision::AccessDenied { back_to } => json!({ "decision": "access_denied", "back_to": back_to }),
        GuardDecision::Render => json!({ "decision": "render" }),
    }
}

fn print_user(user: &User) -> Result<(), CliError> {
    print_json(&serde_json::to_value(user)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
