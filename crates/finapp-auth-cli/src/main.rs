//! finapp-auth - command-line host for the finapp session manager.
//!
//! Signs up, logs in, refreshes and logs out against the finapp service,
//! keeping tokens in the OS keychain or a passphrase-sealed vault file.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use finapp_auth_core::{
    AuthConfig, AuthResult, Credentials, EncryptedFileStore, KeyringStore, LoginCredentials,
    SecureStore, SessionManager, SignupCredentials,
};

/// Password source for non-interactive use
const ENV_PASSWORD: &str = "FINAPP_PASSWORD";

/// Vault passphrase source for non-interactive use
const ENV_VAULT_PASSPHRASE: &str = "FINAPP_VAULT_PASSPHRASE";

/// Directory for the rolling log file; file logging is off when unset
const ENV_LOG_DIR: &str = "FINAPP_LOG_DIR";

const LOG_FILE_PREFIX: &str = "finapp-auth.log";

/// Shown instead of token values in command output
const REDACTED: &str = "<stored>";

#[derive(Debug, Parser)]
#[command(name = "finapp-auth", version, about = "Manage the finapp login session")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the service base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Where tokens are kept
    #[arg(long, value_enum, default_value_t = StoreKind::Keyring, global = true)]
    store: StoreKind,

    /// Vault file for `--store file`
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// OS keychain
    Keyring,
    /// Passphrase-sealed vault file
    File,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account and store its session
    Signup {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
    },
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,
    },
    /// Show whether a session is stored
    Status,
    /// Exchange the refresh token for new tokens
    Refresh,
    /// Remove the stored session
    Logout,
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(ENV_LOG_DIR) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let config = load_config(&cli)?;
    let store = open_store(&cli, &config).await?;
    let manager = SessionManager::new(config, store).context("Invalid configuration")?;
    debug!(store = manager.store_name(), "Session manager initialized");

    run(cli.command, &manager).await
}

fn load_config(cli: &Cli) -> Result<AuthConfig> {
    let mut config = match cli.config {
        Some(ref path) => AuthConfig::load_from(path)?,
        None => AuthConfig::load()?,
    };
    config.apply_env()?;
    if let Some(ref url) = cli.base_url {
        config.base_url = url.clone();
    }
    Ok(config)
}

async fn open_store(cli: &Cli, config: &AuthConfig) -> Result<Arc<dyn SecureStore>> {
    match cli.store {
        StoreKind::Keyring => Ok(Arc::new(KeyringStore::new(config.keyring_service.clone()))),
        StoreKind::File => {
            let path = match cli.vault {
                Some(ref path) => path.clone(),
                None => EncryptedFileStore::default_path()?,
            };
            let passphrase = secret_from_env_or_prompt(ENV_VAULT_PASSPHRASE, "Vault passphrase: ")?;
            let store = EncryptedFileStore::open(&path, &passphrase)
                .await
                .with_context(|| format!("Failed to open vault {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

async fn run(command: Command, manager: &SessionManager) -> Result<()> {
    match command {
        Command::Signup {
            first_name,
            last_name,
            email,
        } => {
            let password = secret_from_env_or_prompt(ENV_PASSWORD, "Password: ")?;
            let credentials = SignupCredentials::new(first_name, last_name, email, password);
            authenticate(manager, credentials.into()).await?;
        }
        Command::Login { email } => {
            let password = secret_from_env_or_prompt(ENV_PASSWORD, "Password: ")?;
            authenticate(manager, LoginCredentials::new(email, password).into()).await?;
        }
        Command::Status => {
            let session = manager.get_session().await;
            let status = serde_json::json!({
                "state": manager.state().await,
                "has_access_token": session.access_token.is_some(),
                "has_refresh_token": session.refresh_token.is_some(),
                "store": manager.store_name(),
                "base_url": manager.config().base_url,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Refresh => {
            let result = manager
                .refresh_session()
                .await
                .context("Refresh failed")?;
            print_result(result)?;
        }
        Command::Logout => {
            manager.clear_session().await.context("Logout failed")?;
            info!("Logged out");
            eprintln!("Logged out.");
        }
    }
    Ok(())
}

async fn authenticate(manager: &SessionManager, credentials: Credentials) -> Result<()> {
    let action = match credentials {
        Credentials::Signup(_) => "Sign-up",
        Credentials::Login(_) => "Log-in",
    };
    let result = manager
        .authenticate(credentials)
        .await
        .with_context(|| format!("{} failed", action))?;
    print_result(result)
}

fn secret_from_env_or_prompt(var: &str, prompt: &str) -> Result<String> {
    if let Ok(value) = std::env::var(var) {
        return Ok(value);
    }
    rpassword::prompt_password(prompt).context("Failed to read secret from terminal")
}

fn print_result(result: AuthResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&redact_tokens(result))?);
    Ok(())
}

/// Replace token values so they never reach the terminal.
fn redact_tokens(result: AuthResult) -> Value {
    let mut map = result.into_inner();
    for field in ["access_token", "refresh_token"] {
        if let Some(value) = map.get_mut(field) {
            if value.as_str().is_some_and(|t| !t.is_empty()) {
                *value = Value::from(REDACTED);
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_login() {
        let cli = Cli::try_parse_from(["finapp-auth", "login", "--email", "a@b.com"]).unwrap();
        assert_eq!(cli.store, StoreKind::Keyring);
        assert!(matches!(cli.command, Command::Login { ref email } if email == "a@b.com"));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "finapp-auth",
            "status",
            "--store",
            "file",
            "--vault",
            "/tmp/vault.json",
            "--base-url",
            "http://localhost:8000",
        ])
        .unwrap();
        assert_eq!(cli.store, StoreKind::File);
        assert_eq!(cli.vault, Some(PathBuf::from("/tmp/vault.json")));
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:8000"));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn test_signup_requires_names() {
        assert!(Cli::try_parse_from(["finapp-auth", "signup", "--email", "a@b.com"]).is_err());
    }

    #[test]
    fn test_redact_tokens_keeps_profile() {
        let result = AuthResult::from_value(json!({
            "access_token": "AT1",
            "refresh_token": "",
            "first_name": "Ada"
        }))
        .unwrap();

        let redacted = redact_tokens(result);
        assert_eq!(
            redacted,
            json!({"access_token": REDACTED, "refresh_token": "", "first_name": "Ada"})
        );
    }
}
