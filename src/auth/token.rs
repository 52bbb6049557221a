//! Authorization code redemption at the token endpoint.

use super::claims::decode_jwt_claims;
use super::request::{provider_error, AuthorizationRequest};
use super::AuthSession;
use crate::errors::{HarvestError, HarvestResult};
use crate::http::HttpTransport;
use serde_json::{Map, Value};
use url::Url;

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl RedirectParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }
}

pub fn exchange_code(
    transport: &dyn HttpTransport,
    request: &AuthorizationRequest,
    redirect: &Url,
) -> HarvestResult<AuthSession> {
    let params = RedirectParams::from_url(redirect);

    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        return Err(HarvestError::auth_flow(format!(
            "identity provider returned {}: {}",
            error,
            description.trim()
        )));
    }
    if params.state.as_deref() != Some(request.state.as_str()) {
        return Err(HarvestError::auth_flow(
            "state in redirect does not match the authorization request",
        ));
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| HarvestError::auth_flow("redirect carries no authorization code"))?;

    let scope = request.scope_param();
    let form = [
        ("client_id", request.client_id.as_str()),
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", request.redirect_uri.as_str()),
        ("code_verifier", request.code_verifier.as_str()),
        ("scope", scope.as_str()),
    ];

    tracing::debug!("Redeeming authorization code at {}", request.token_endpoint);
    let response = transport.post_form(&request.token_endpoint, &form)?;
    let body = match response.json() {
        Ok(body) => body,
        Err(_) if !response.is_success() => {
            return Err(HarvestError::network(
                &response.url,
                format!("token endpoint answered HTTP {}", response.status),
            ));
        }
        Err(e) => return Err(e),
    };

    if let Some(error) = provider_error(&body) {
        return Err(HarvestError::auth_flow(format!(
            "token endpoint rejected the authorization code: {}",
            error
        )));
    }
    if !response.is_success() {
        return Err(HarvestError::network(
            &response.url,
            format!("token endpoint answered HTTP {}", response.status),
        ));
    }

    let access_token = body["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| HarvestError::auth_flow("token response carries no access token"))?
        .to_string();

    let id_token_claims = match body["id_token"].as_str() {
        Some(id_token) => decode_jwt_claims(id_token)
            .map_err(|message| HarvestError::malformed(&response.url, message))?,
        None => {
            tracing::warn!("Token response carries no identity token");
            Value::Object(Map::new())
        }
    };

    if let Some(nonce) = id_token_claims["nonce"].as_str() {
        if nonce != request.nonce {
            tracing::warn!("Identity token nonce does not match the authorization request");
        }
    }

    let expires_in = match &body["expires_in"] {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };

    Ok(AuthSession {
        access_token,
        id_token_claims,
        expires_in,
    })
}

#[cfg(test)]
#[path = "tests/token_tests.rs"]
mod tests;
