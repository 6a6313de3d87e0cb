use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use fr_store::PageRequest;
use tokio::signal;
use tracing::{error, info};

mod cli;
mod service_state;

use crate::cli::{Cli, Commands};
use crate::service_state::ServiceState;

/// Used when `RUST_LOG` is unset or unparsable.
const DEFAULT_LOG_FILTER: &str = "formrelay=info,fr_store=info,fr_crypto=info";

/// Exit status for `show` when the id does not exist.
const EXIT_NOT_FOUND: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                // The bin target is `formrelay`, so that is its log target too.
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let state = ServiceState::bootstrap(&cli).await?;
    let outcome = match &cli.command {
        Commands::Serve => serve_command(&state).await,
        Commands::Migrate => migrate_command(&state).await,
        Commands::List { page, page_len, key } => list_command(&state, *page, *page_len, key).await,
        Commands::Show { id, key } => show_command(&state, *id, key).await,
    };
    // Rollback failures are fatal even when the command itself succeeded.
    let shutdown = state.shutdown().await;
    let code = outcome?;
    shutdown?;
    Ok(code)
}

async fn serve_command(state: &ServiceState) -> Result<ExitCode> {
    info!(
        db = %state.database.redacted_target(),
        transaction = state.database.in_transaction(),
        "service started"
    );
    signal::ctrl_c().await?;
    info!("service stopping");
    Ok(ExitCode::SUCCESS)
}

async fn migrate_command(state: &ServiceState) -> Result<ExitCode> {
    state.database.migrate().await?;
    Ok(ExitCode::SUCCESS)
}

async fn list_command(
    state: &ServiceState,
    page: Option<i64>,
    page_len: Option<i64>,
    key: &str,
) -> Result<ExitCode> {
    state.authorize(key)?;
    let request = PageRequest::from_query(page, page_len);
    let page = state.repository.list(request.offset, request.limit).await?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(ExitCode::SUCCESS)
}

async fn show_command(state: &ServiceState, id: i64, key: &str) -> Result<ExitCode> {
    state.authorize(key)?;
    match state.repository.get_by_id(id).await {
        Ok(mail) => {
            println!("{}", serde_json::to_string_pretty(&mail)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_not_found() => {
            eprintln!("No mail with id {id}");
            Ok(ExitCode::from(EXIT_NOT_FOUND))
        }
        Err(e) => Err(e.into()),
    }
}
