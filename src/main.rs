//! Educatia - a small blogging and learning community

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use data_encoding::HEXLOWER;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use educatia::{
    api::{self, AppState},
    config::Config,
    db::{self, migrations, repositories::SqlxRoleRepository, DynDatabasePool},
    services::{mailer_from_config, RoleService},
};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Parser)]
#[command(name = "educatia", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create every table
    CreateDb,
    /// Drop every table
    DropDb,
    /// Insert the Admin, Tutor and Student roles
    CreateRoles,
    /// Create the administrator account from the `admin` config section
    CreateAdmin,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG set there reaches the filter
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "educatia=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded {}", path.display());
    }

    let cli = Cli::parse();
    let mut config = Config::load_with_env(&cli.config)?;
    tracing::info!("Configuration loaded from {}", cli.config.display());

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, &mut config).await,
        Command::CreateDb => {
            let applied = migrations::run_migrations(&pool).await?;
            tracing::info!("Database ready ({} step(s) applied)", applied);
            Ok(())
        }
        Command::DropDb => migrations::drop_all(&pool).await,
        Command::CreateRoles => {
            let created = create_roles(&pool).await?;
            tracing::info!("Created {} role(s)", created);
            Ok(())
        }
        Command::CreateAdmin => create_admin(pool, &mut config).await,
    }
}

async fn serve(pool: DynDatabasePool, config: &mut Config) -> Result<()> {
    tracing::info!("Educatia startup");

    migrations::run_migrations(&pool).await?;
    create_roles(&pool).await?;
    ensure_secret_key(config)?;

    let mailer = mailer_from_config(&config.mail)?;
    let state = AppState::new(pool, config, mailer);

    // Sweep expired sessions now and then every hour
    {
        let users = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                match users.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!("Removed {} expired session(s)", removed),
                    Err(e) => tracing::warn!("Failed to remove expired sessions: {}", e),
                }
            }
        });
    }

    let app = api::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn create_roles(pool: &DynDatabasePool) -> Result<usize> {
    let roles = RoleService::new(SqlxRoleRepository::boxed(pool.clone()));
    Ok(roles.ensure_default_roles().await?)
}

async fn create_admin(pool: DynDatabasePool, config: &mut Config) -> Result<()> {
    let email = config
        .admin
        .email
        .clone()
        .ok_or_else(|| anyhow!("admin.email is not configured"))?;
    let password = config
        .admin
        .password
        .clone()
        .ok_or_else(|| anyhow!("admin.password is not configured"))?;

    migrations::run_migrations(&pool).await?;
    create_roles(&pool).await?;
    ensure_secret_key(config)?;

    let mailer = mailer_from_config(&config.mail)?;
    let state = AppState::new(pool, config, mailer);
    let admin = state
        .user_service
        .create_admin(&config.admin.username, &email, &password)
        .await
        .map_err(|e| anyhow!("Failed to create admin: {}", e))?;
    tracing::info!("Administrator {} ({}) is ready", admin.username, admin.email);
    Ok(())
}

/// Tokens signed with a generated key do not survive a restart.
fn ensure_secret_key(config: &mut Config) -> Result<()> {
    if !config.security.secret_key.is_empty() {
        return Ok(());
    }
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| anyhow!("Failed to generate secret key: {}", e))?;
    config.security.secret_key = HEXLOWER.encode(&bytes);
    tracing::warn!("No secret key configured; generated a random one for this run");
    Ok(())
}
