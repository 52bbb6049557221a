mod app;
mod auth;
mod config;
mod errors;
mod harvest;
mod http;
mod logging;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use auth::{AuthorizationCompleter, Credentials, HeadlessCompleter, ManualCompleter};
use clap::Parser;
use config::ProviderConfig;
use harvest::ArtifactStore;
use http::UreqTransport;
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("HARVEST_GIT_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "techem-harvest")]
#[command(about = "Downloads consumption data (Verbrauchsinfo) from the Techem tenant portal")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// Log in through your own browser and paste the redirect URL
    #[arg(short = 'B', long)]
    browser: bool,

    /// Portal username for the automated login
    #[arg(short, long, env = "TECHEM_USERNAME", required_unless_present = "browser")]
    username: Option<String>,

    /// Portal password for the automated login
    #[arg(
        short,
        long,
        env = "TECHEM_PASSWORD",
        hide_env_values = true,
        required_unless_present = "browser"
    )]
    password: Option<String>,

    /// Directory the JSON files are written to (created if missing)
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Provider configuration overriding the built-in Techem settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug logging, including API response bodies
    #[arg(short, long)]
    verbose: bool,
}

fn completer_for(cli: &Cli, config: &ProviderConfig) -> Result<Box<dyn AuthorizationCompleter>> {
    if cli.browser {
        return Ok(Box::new(ManualCompleter::stdio()));
    }

    let (Some(username), Some(password)) = (&cli.username, &cli.password) else {
        anyhow::bail!("--username and --password are required unless --browser is given");
    };
    let credentials = Credentials::new(username.as_str(), password.as_str());
    Ok(Box::new(HeadlessCompleter::new(
        credentials,
        config.login.clone(),
        config.redirect_url()?,
    )))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = ProviderConfig::load_or_default(cli.config.as_deref())?;
    let store = ArtifactStore::open(&cli.output_dir)
        .context("Failed to prepare the output directory")?;
    let transport = UreqTransport::new(config.request_timeout());
    let mut completer = completer_for(&cli, &config)?;

    let report = app::run_harvest(&config, &transport, completer.as_mut(), &store)
        .context("Harvest failed")?;

    tracing::info!(
        "Wrote {} files for {} periods of unit {} to {}",
        report.artifacts.len(),
        report.periods.len(),
        report.unit_id,
        store.dir().display()
    );
    tracing::debug!("Party {}, periods: {:?}", report.party_id, report.periods);
    if let Some(expiry) = report.token_expires_at {
        tracing::debug!("Access token valid until {}", expiry.format("%H:%M:%S"));
    }
    Ok(())
}
