//! Account-linking data carried in the identity token.

use crate::errors::{HarvestError, HarvestResult};
use base64::Engine;
use serde_json::Value;

pub const RENTAL_AGREEMENTS_CLAIM: &str = "rentalAgreements";

/// Unit and party identifiers taken from the first rental agreement.
///
/// The claim value looks like `"<unit>;<party>[;...]"`; only the first two
/// fields are used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalAgreementRef {
    pub unit_id: String,
    pub party_id: String,
}

impl RentalAgreementRef {
    pub fn from_claims(claims: &Value) -> HarvestResult<Self> {
        let first = match &claims[RENTAL_AGREEMENTS_CLAIM] {
            Value::Array(entries) => entries.first().and_then(Value::as_str),
            // Single-valued claims may arrive unwrapped.
            Value::String(entry) => Some(entry.as_str()),
            _ => None,
        };
        let first = first.ok_or_else(|| {
            HarvestError::auth_flow(format!(
                "identity token carries no usable {} claim",
                RENTAL_AGREEMENTS_CLAIM
            ))
        })?;
        Self::parse(first)
    }

    pub fn parse(composite: &str) -> HarvestResult<Self> {
        let mut fields = composite.split(';');
        let unit_id = fields.next().filter(|f| !f.is_empty());
        let party_id = fields.next().filter(|f| !f.is_empty());

        match (unit_id, party_id) {
            (Some(unit_id), Some(party_id)) => Ok(Self {
                unit_id: unit_id.to_string(),
                party_id: party_id.to_string(),
            }),
            _ => Err(HarvestError::auth_flow(format!(
                "rental agreement '{}' does not have unit and party fields",
                composite
            ))),
        }
    }
}

/// Decodes the payload of a compact JWS without checking its signature.
///
/// The token comes straight from the token endpoint over TLS within the same
/// flow, so the claims are taken as-is.
pub fn decode_jwt_claims(token: &str) -> Result<Value, String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(format!(
            "identity token has {} segments, expected 3",
            parts.len()
        ));
    }

    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| format!("identity token payload is not base64url: {}", e))?;
    let claims: Value = serde_json::from_slice(&payload)
        .map_err(|e| format!("identity token payload is not JSON: {}", e))?;

    if !claims.is_object() {
        return Err("identity token payload is not a JSON object".to_string());
    }
    Ok(claims)
}

#[cfg(test)]
#[path = "tests/claims_tests.rs"]
mod tests;
