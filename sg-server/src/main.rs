//! sg-server - ScopeGuard classification service
//!
//! Subcommands:
//! - `serve` (default): run the HTTP API
//! - `create-user`: register a user and print their bearer token once
//! - `connect-mailbox`: store a user's Gmail OAuth token pair

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sg_common::auth::{generate_api_token, hash_api_token};
use sg_common::config::{resolve_config_path, resolve_model_api_key, TomlConfig};
use sg_common::db::init_database;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sg_server::db::{mailbox_accounts, users};
use sg_server::services::{build_language_model, GmailClient};
use sg_server::AppState;

/// Command-line arguments for sg-server
#[derive(Parser, Debug)]
#[command(name = "sg-server")]
#[command(about = "ScopeGuard email scope classification service")]
#[command(version)]
struct Cli {
    /// TOML config file (default: $SCOPEGUARD_CONFIG, then ~/.config/scopeguard/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true, env = "SCOPEGUARD_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Listen address (overrides config)
        #[arg(long, env = "SCOPEGUARD_BIND")]
        bind: Option<String>,
    },

    /// Create a user and print a new API token
    CreateUser {
        #[arg(long)]
        email: String,
    },

    /// Store Gmail OAuth tokens for an existing user
    ConnectMailbox {
        #[arg(long)]
        email: String,

        #[arg(long, env = "SCOPEGUARD_GMAIL_ACCESS_TOKEN")]
        access_token: String,

        #[arg(long, env = "SCOPEGUARD_GMAIL_REFRESH_TOKEN")]
        refresh_token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = TomlConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    // RUST_LOG wins over [logging] level
    let default_filter = format!(
        "sg_server={level},sg_common={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            serve(config).await
        }
        Command::CreateUser { email } => create_user(&config, &email).await,
        Command::ConnectMailbox {
            email,
            access_token,
            refresh_token,
        } => connect_mailbox(&config, &email, &access_token, &refresh_token).await,
    }
}

async fn serve(config: TomlConfig) -> Result<()> {
    info!("Starting sg-server (ScopeGuard)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let db_pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let api_key = resolve_model_api_key(&config.model)?;
    let model = build_language_model(&config.model, api_key)
        .context("Failed to build language model client")?;
    info!(
        provider = ?config.model.provider,
        model = model.model_name(),
        "Language model client ready"
    );

    let gmail = Arc::new(GmailClient::new(&config.mailbox).context("Failed to build mailbox client")?);
    if !gmail.can_refresh() {
        info!("Mailbox OAuth client not configured; expired access tokens will not be refreshed");
    }

    let state = AppState::new(db_pool, gmail, model, &config);
    let monitors = state.monitors.clone();
    let app = sg_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    monitors.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn create_user(config: &TomlConfig, email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        bail!("--email must not be empty");
    }

    let db_pool = init_database(&config.database_path).await?;
    if users::find_user_by_email(&db_pool, email).await?.is_some() {
        bail!("User {} already exists", email);
    }

    let token = generate_api_token();
    let user = users::create_user(&db_pool, email, &hash_api_token(&token)).await?;
    info!(user_id = %user.id, email = %user.email, "User created");

    // Shown once; only the hash is stored
    println!("{}", token);
    Ok(())
}

async fn connect_mailbox(
    config: &TomlConfig,
    email: &str,
    access_token: &str,
    refresh_token: &str,
) -> Result<()> {
    let db_pool = init_database(&config.database_path).await?;
    let user = users::find_user_by_email(&db_pool, email.trim())
        .await?
        .with_context(|| format!("No user with email {}", email))?;

    mailbox_accounts::upsert_mailbox_account(
        &db_pool,
        user.id,
        mailbox_accounts::GOOGLE_PROVIDER,
        access_token,
        refresh_token,
    )
    .await?;

    info!(user_id = %user.id, "Mailbox connected");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
