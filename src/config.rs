use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::upstream::{ClientCredentials, Endpoints};

/// Application configuration shared by every command.
pub struct Config {
    pub database: PathBuf,
    pub credentials: ClientCredentials,
    pub endpoints: Endpoints,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database", &self.database)
            .field("client_id", &self.credentials.client_id)
            .field("client_secret", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .field("http_timeout", &self.http_timeout)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        if cli.http_timeout == 0 {
            anyhow::bail!("--http-timeout must be at least 1 second");
        }
        let endpoints = Endpoints::new(&cli.accounts_url, &cli.api_url)?;

        Ok(Self {
            database: expand_tilde(&cli.database),
            credentials: ClientCredentials {
                client_id: cli.client_id.trim().to_string(),
                client_secret: cli.client_secret.trim().to_string(),
            },
            endpoints,
            http_timeout: Duration::from_secs(cli.http_timeout),
        })
    }

    /// Fail unless OAuth client credentials were configured. Commands that
    /// may exchange or refresh tokens call this before doing any work.
    pub fn require_credentials(&self) -> anyhow::Result<()> {
        if self.credentials.client_id.is_empty() || self.credentials.client_secret.is_empty() {
            anyhow::bail!(
                "OAuth client credentials are required: set TRIPSYNC_CLIENT_ID and \
                 TRIPSYNC_CLIENT_SECRET (or pass --client-id/--client-secret)"
            );
        }
        Ok(())
    }
}
