use crate::errors::{HarvestError, HarvestResult};
use serde_json::Value;
use std::fmt::{Display, Formatter};

pub const PERIODS_FILE: &str = "periods.json";

/// Provider-defined billing period identifier (observed as `YYYY-MM`).
///
/// Only rejects values that would escape the output directory when used as
/// a file name; the format itself is left to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Period(String);

impl Period {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("period is empty".to_string());
        }
        if raw.contains('/') || raw.contains('\\') || raw.contains("..") {
            return Err(format!("period '{}' is not usable as a file name", raw));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which document an artifact holds. Determines the file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    PeriodListing,
    Consumption(Period),
    Average(Period),
}

impl ArtifactKind {
    pub fn file_name(&self) -> String {
        match self {
            Self::PeriodListing => PERIODS_FILE.to_string(),
            Self::Consumption(period) => format!("{}.json", period),
            Self::Average(period) => format!("{}-average.json", period),
        }
    }
}

/// The raw listing document together with the periods extracted from it.
#[derive(Debug, Clone)]
pub struct PeriodListing {
    pub document: Value,
    pub periods: Vec<Period>,
}

impl PeriodListing {
    /// Takes the `period` field of every `data` entry, in response order.
    pub fn from_document(url: &str, document: Value) -> HarvestResult<Self> {
        let entries = document["data"].as_array().ok_or_else(|| {
            HarvestError::malformed(url, "period listing has no 'data' array")
        })?;

        let mut periods = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let raw = entry["period"].as_str().ok_or_else(|| {
                HarvestError::malformed(url, format!("listing entry {} has no 'period'", index))
            })?;
            let period =
                Period::parse(raw).map_err(|message| HarvestError::malformed(url, message))?;
            periods.push(period);
        }

        Ok(Self { document, periods })
    }

    /// A non-null `next` link in any of the shapes the portal API family uses.
    pub fn pagination_hint(&self) -> Option<&Value> {
        [
            &self.document["next"],
            &self.document["nextPage"],
            &self.document["links"]["next"],
            &self.document["pagination"]["next"],
        ]
        .into_iter()
        .find(|hint| !hint.is_null())
    }
}

/// Everything one harvest wrote, in write order.
#[derive(Debug, Clone, Default)]
pub struct HarvestOutcome {
    pub periods: Vec<Period>,
    pub artifacts: Vec<std::path::PathBuf>,
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
