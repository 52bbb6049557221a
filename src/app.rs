//! One harvest run: log in, resolve the rental unit, pull every period.

use crate::auth::{AuthorizationCompleter, Authenticator};
use crate::config::ProviderConfig;
use crate::errors::HarvestResult;
use crate::harvest::{ArtifactStore, Harvester, Period};
use crate::http::HttpTransport;
use chrono::{DateTime, Local};
use std::path::PathBuf;

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub unit_id: String,
    pub party_id: String,
    pub periods: Vec<Period>,
    pub artifacts: Vec<PathBuf>,
    pub token_expires_at: Option<DateTime<Local>>,
}

pub fn run_harvest(
    config: &ProviderConfig,
    transport: &dyn HttpTransport,
    completer: &mut dyn AuthorizationCompleter,
    store: &ArtifactStore,
) -> HarvestResult<HarvestReport> {
    let mut authenticator = Authenticator::new(config, transport);
    let session = authenticator.login(completer)?;
    tracing::debug!("Login finished in phase {:?}", authenticator.phase());
    // Issued when the token endpoint answered, not when the login started.
    let token_expires_at = session.expires_at(Local::now());

    let agreement = session.rental_agreement()?;
    tracing::info!(
        "Rental unit {} (party {})",
        agreement.unit_id,
        agreement.party_id
    );

    let harvester = Harvester::new(transport, config)?;
    let outcome = harvester.harvest(&agreement.unit_id, &session.access_token, store)?;

    Ok(HarvestReport {
        unit_id: agreement.unit_id,
        party_id: agreement.party_id,
        periods: outcome.periods,
        artifacts: outcome.artifacts,
        token_expires_at,
    })
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
