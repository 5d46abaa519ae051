use clap::{Args, Parser, Subcommand};

use crate::types::{LogLevel, Step};

#[derive(Parser, Debug)]
#[command(
    name = "tripsync",
    version,
    about = "Sync Automatic trips and vehicles into a local store"
)]
pub struct Cli {
    /// Path of the SQLite database
    #[arg(long, global = true, default_value = "~/.tripsync/tripsync.db")]
    pub database: String,

    /// OAuth client ID
    #[arg(long, global = true, env = "TRIPSYNC_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// OAuth client secret.
    /// WARNING: passing via --client-secret is visible in process listings.
    /// Prefer the TRIPSYNC_CLIENT_SECRET environment variable instead.
    #[arg(
        long,
        global = true,
        env = "TRIPSYNC_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    pub client_secret: String,

    /// Base URL of the Automatic API
    #[arg(long, global = true, default_value = crate::upstream::endpoints::DEFAULT_API_URL)]
    pub api_url: String,

    /// Base URL of the Automatic accounts (OAuth) service
    #[arg(long, global = true, default_value = crate::upstream::endpoints::DEFAULT_ACCOUNTS_URL)]
    pub accounts_url: String,

    /// Timeout for each upstream HTTP request, in seconds
    #[arg(long, global = true, default_value_t = crate::upstream::DEFAULT_TIMEOUT_SECS)]
    pub http_timeout: u64,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single workflow step over an event read from --event or stdin
    Step(StepArgs),

    /// Run a complete update for one account
    Run(RunArgs),

    /// Exchange an OAuth authorization code and link the upstream account
    Link(LinkArgs),

    /// Show an account, its update state and its vehicles
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct StepArgs {
    /// Step to run
    #[arg(value_enum)]
    pub step: Step,

    /// Event JSON; read from stdin when omitted
    #[arg(long)]
    pub event: Option<String>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Account to update
    #[arg(long)]
    pub account_id: String,

    /// Retries per step for transient failures
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Base delay between retries, in seconds (doubles each retry)
    #[arg(long, default_value_t = 2)]
    pub retry_delay: u64,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Authorization code from the OAuth callback
    #[arg(long)]
    pub code: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub account_id: String,
}
