use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guided_diagnosis::{
    config::{Config, LogFormat},
    oracle::{Oracle, OracleClient},
    server::{AppState, RpcServer},
    storage::SqliteStorage,
};

/// Session server for staged diagnostic conversations.
#[derive(Debug, Parser)]
#[command(name = "guided-diagnosis", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve JSON-RPC over stdio (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Fetch the oracle's stage limits and print them as JSON
    StageLimits,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(config).await,
        Command::StageLimits => stage_limits(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Guided diagnosis server starting..."
    );

    let storage = open_storage(&config).await?;
    let oracle = open_oracle(&config)?;

    let state = Arc::new(AppState::new(config, Arc::new(storage), Arc::new(oracle)));
    let server = RpcServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn migrate(config: Config) -> anyhow::Result<()> {
    open_storage(&config).await?;
    info!("Migrations applied");
    Ok(())
}

async fn stage_limits(config: Config) -> anyhow::Result<()> {
    let oracle = open_oracle(&config)?;
    let limits = oracle.stage_limits().await.map_err(|e| {
        error!(error = %e, "Failed to fetch stage limits");
        e
    })?;
    println!("{}", serde_json::to_string_pretty(&limits)?);
    Ok(())
}

async fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Ok(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            Err(e.into())
        }
    }
}

fn open_oracle(config: &Config) -> anyhow::Result<OracleClient> {
    match OracleClient::new(&config.oracle, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %c.base_url(), "Oracle client initialized");
            Ok(c)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize oracle client");
            Err(e.into())
        }
    }
}

/// Initialize tracing/logging; stdout is reserved for JSON-RPC.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
