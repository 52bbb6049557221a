//! Consumption harvesting against the tenant portal API.
//!
//! Strictly sequential: the period listing first, then per period the
//! unit's own consumption followed by the peer average. Each document is
//! persisted as soon as it arrives, so a failure part-way leaves everything
//! fetched before it on disk.

pub mod store;
pub mod types;

pub use store::ArtifactStore;
pub use types::{ArtifactKind, HarvestOutcome, Period, PeriodListing};

use crate::config::ProviderConfig;
use crate::errors::{HarvestError, HarvestResult};
use crate::http::HttpTransport;
use serde_json::Value;
use url::Url;

/// The portal API pages the period listing; only the first page is read.
pub const PERIOD_PAGE_LIMIT: usize = 100;

pub struct Harvester<'a> {
    transport: &'a dyn HttpTransport,
    api_base: Url,
    user_agent: String,
}

impl<'a> Harvester<'a> {
    pub fn new(transport: &'a dyn HttpTransport, config: &ProviderConfig) -> HarvestResult<Self> {
        Ok(Self {
            transport,
            api_base: config.api_base_url()?,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Lists the billing periods available for the unit.
    pub fn list_periods(&self, unit_id: &str, access_token: &str) -> HarvestResult<PeriodListing> {
        let (url, document) = self.fetch_period_listing(unit_id, access_token)?;
        checked_listing(&url, document)
    }

    /// The raw first page of the period listing, before any shape checks.
    fn fetch_period_listing(
        &self,
        unit_id: &str,
        access_token: &str,
    ) -> HarvestResult<(Url, Value)> {
        let mut url = self.endpoint(&[
            "consumptions",
            "residential-units",
            unit_id,
            "consumptions",
            "periods",
        ])?;
        url.query_pairs_mut()
            .append_pair("limit", &PERIOD_PAGE_LIMIT.to_string());

        let document = self.get_json(&url, access_token)?;
        Ok((url, document))
    }

    pub fn fetch_period_consumption(
        &self,
        unit_id: &str,
        period: &Period,
        access_token: &str,
    ) -> HarvestResult<Value> {
        let url = self.endpoint(&[
            "consumptions",
            "residential-units",
            unit_id,
            "consumptions",
            period.as_str(),
        ])?;
        self.get_json(&url, access_token)
    }

    /// Average consumption of comparable units for the same period.
    pub fn fetch_period_average(
        &self,
        unit_id: &str,
        period: &Period,
        access_token: &str,
    ) -> HarvestResult<Value> {
        let url = self.endpoint(&[
            "consumptions",
            "statistics",
            "residential-units",
            unit_id,
            "consumptions",
            period.as_str(),
            "average",
        ])?;
        self.get_json(&url, access_token)
    }

    /// Lists, fetches and persists everything for one unit.
    pub fn harvest(
        &self,
        unit_id: &str,
        access_token: &str,
        store: &ArtifactStore,
    ) -> HarvestResult<HarvestOutcome> {
        // periods.json is written even when the listing fails the shape check.
        let (url, document) = self.fetch_period_listing(unit_id, access_token)?;
        let mut outcome = HarvestOutcome::default();
        outcome
            .artifacts
            .push(store.persist(&ArtifactKind::PeriodListing, &document)?);
        let listing = checked_listing(&url, document)?;

        tracing::info!("Fetching consumption data for {} periods", listing.periods.len());
        for period in listing.periods {
            tracing::info!("Fetching consumption data for {}", period);

            let consumption = self.fetch_period_consumption(unit_id, &period, access_token)?;
            outcome.artifacts.push(
                store.persist(&ArtifactKind::Consumption(period.clone()), &consumption)?,
            );

            let average = self.fetch_period_average(unit_id, &period, access_token)?;
            outcome
                .artifacts
                .push(store.persist(&ArtifactKind::Average(period.clone()), &average)?);

            outcome.periods.push(period);
        }
        Ok(outcome)
    }

    /// `api_base` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> HarvestResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                HarvestError::configuration(format!(
                    "api_base cannot carry path segments: {}",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get_json(&self, url: &Url, access_token: &str) -> HarvestResult<Value> {
        let authorization = format!("Bearer {}", access_token);
        let headers = [
            ("Authorization", authorization.as_str()),
            ("Accept", "application/json"),
            ("User-Agent", self.user_agent.as_str()),
        ];
        let response = self.transport.get(url, &headers)?;
        tracing::debug!("Response from {}: {}", url, response.body);
        response.success_json()
    }
}

/// Extracts the periods and warns when the portal has more than one page.
fn checked_listing(url: &Url, document: Value) -> HarvestResult<PeriodListing> {
    let listing = PeriodListing::from_document(url.as_str(), document)?;

    if listing.periods.len() > PERIOD_PAGE_LIMIT {
        tracing::warn!(
            "Listing returned {} periods, more than the requested {}",
            listing.periods.len(),
            PERIOD_PAGE_LIMIT
        );
    }
    if let Some(hint) = listing.pagination_hint() {
        tracing::warn!(
            "Listing has further pages ({}); only the first {} periods are harvested",
            hint,
            PERIOD_PAGE_LIMIT
        );
    }
    Ok(listing)
}

#[cfg(test)]
#[path = "tests/harvester_tests.rs"]
mod tests;
