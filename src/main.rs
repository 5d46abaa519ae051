//! tripsync: resumable, single-flight synchronization of Automatic trip and
//! vehicle history into a local entity store.
//!
//! An account update runs as four stateless steps (create, trips, vehicles,
//! finalize) chained through a JSON event. Each step can be invoked on its own
//! by an external orchestrator (`tripsync step`), or the whole workflow can be
//! driven locally with retries (`tripsync run`).

#![warn(clippy::all)]

mod account;
mod cli;
mod config;
mod error;
mod invoker;
mod link;
mod retry;
mod services;
mod shutdown;
mod store;
mod sync;
#[cfg(test)]
mod testing;
mod token;
mod types;
mod update;
mod upstream;
mod workflow;

use std::io::Read as _;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::Config;
use error::UpdateFailure;
use services::Services;
use store::SqliteStore;
use types::Step;
use upstream::UpstreamClient;
use workflow::UpdateAccountEvent;

/// Open the store and build the upstream client.
async fn open_services(config: &Config) -> anyhow::Result<Services> {
    let store = SqliteStore::open(&config.database).await?;
    let upstream = UpstreamClient::new(
        config.endpoints.clone(),
        config.credentials.clone(),
        config.http_timeout,
    )?;
    Ok(Services::new(Arc::new(store), upstream))
}

fn read_event(inline: Option<String>) -> anyhow::Result<UpdateAccountEvent> {
    let raw = match inline {
        Some(raw) => raw,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("Invalid event JSON: {e}"))
}

/// Run one step. The resulting event, or the `{Error, Cause}` failure, is
/// written to stdout as JSON.
async fn run_step(config: &Config, args: cli::StepArgs) -> anyhow::Result<ExitCode> {
    if matches!(args.step, Step::UpdateTrips | Step::UpdateVehicles) {
        config.require_credentials()?;
    }
    let event = read_event(args.event)?;
    let services = open_services(config).await?;

    match workflow::run_step(&services, args.step, event, Utc::now()).await {
        Ok(event) => {
            println!("{}", serde_json::to_string(&event)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(
                step = %args.step,
                status = e.status_code(),
                upstream_status = ?e.upstream_status(),
                retryable = e.is_retryable(),
                error = %e,
                "Step failed"
            );
            println!("{}", serde_json::to_string(&UpdateFailure::from(&e))?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_update(config: &Config, args: cli::RunArgs) -> anyhow::Result<ExitCode> {
    config.require_credentials()?;
    let services = open_services(config).await?;
    let retry = retry::RetryConfig {
        max_retries: args.max_retries,
        base_delay_secs: args.retry_delay,
        ..retry::RetryConfig::default()
    };
    let shutdown = shutdown::install_signal_handler();

    tracing::info!(account_id = %args.account_id, "Starting account update");
    match invoker::run_update(&services, &args.account_id, &retry, &shutdown).await {
        Ok(event) => {
            tracing::info!(
                account_id = %event.account_id,
                update_id = event.update_id.as_deref().unwrap_or("-"),
                "Account update complete"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let failure = UpdateFailure::from(&e);
            eprintln!("Update failed: {failure}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_link(config: &Config, args: cli::LinkArgs) -> anyhow::Result<ExitCode> {
    config.require_credentials()?;
    let services = open_services(config).await?;
    let linked = link::link_account(&services, &args.code, Utc::now()).await?;
    if linked.created {
        tracing::info!(account_id = %linked.account.id, "Created account");
    }
    println!("{}", linked.account.id);
    Ok(ExitCode::SUCCESS)
}

async fn run_status(config: &Config, args: cli::StatusArgs) -> anyhow::Result<ExitCode> {
    if !config.database.exists() {
        println!("No database found at {}", config.database.display());
        println!("Link an account first to create the database.");
        return Ok(ExitCode::FAILURE);
    }
    let store = SqliteStore::open(&config.database).await?;

    let Some(account) = account::find_account(&store, &args.account_id).await? else {
        println!("Account {} not found", args.account_id);
        return Ok(ExitCode::FAILURE);
    };

    println!("Account: {}", account.id);
    println!("  Name:         {} {}", account.first_name, account.last_name);
    println!("  Automatic ID: {}", account.automatic_id);
    if let Some(at) = &account.last_authenticated_at {
        println!("  Last linked:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(at) = &account.account_updated_at {
        println!("  Last updated: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();

    let holder = update::UpdateLock::new(&store, &account.id).holder().await?;
    match holder.as_deref() {
        Some(update_id) => match update::find_update(&store, Some(update_id)).await {
            Ok(running) => println!("Running update: {} ({})", running.id, running.state),
            Err(e) => println!("Running update: {update_id} ({e})"),
        },
        None => println!("No update running"),
    }

    let recent = update::recent_updates(&store, &account.id, 5).await?;
    if !recent.is_empty() {
        println!();
        println!("Recent updates:");
        for u in recent {
            let finished = u
                .completed_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} {:<16} completed {} ({} ms)",
                u.id,
                u.state,
                finished,
                u.duration_ms.unwrap_or_default()
            );
        }
    }

    let vehicles = sync::vehicles_for_account(&store, &account.id).await?;
    println!();
    println!("Vehicles: {}", vehicles.len());
    for v in vehicles {
        println!(
            "  {} {} {} {} ({}, {} m {})",
            v.id, v.year, v.make, v.model, v.automatic_id, v.meters_traveled, v.meters_traveled_type
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str())),
        )
        .init();

    let config = Config::from_cli(&cli)?;
    tracing::debug!(?config, "Loaded configuration");

    match cli.command {
        Command::Step(args) => run_step(&config, args).await,
        Command::Run(args) => run_update(&config, args).await,
        Command::Link(args) => run_link(&config, args).await,
        Command::Status(args) => run_status(&config, args).await,
    }
}
