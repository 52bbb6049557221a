//! Building the authorization request and checking where it came back to.

use crate::config::ProviderConfig;
use crate::errors::{HarvestError, HarvestResult};
use crate::http::HttpTransport;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

/// Scopes the provider needs for an identity token and refresh token.
const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

const STATE_LENGTH: usize = 32;
const VERIFIER_LENGTH: usize = 64;

/// Endpoints advertised by the authority's discovery document.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
}

/// Everything needed to finish the flow once the redirect is captured.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub auth_uri: Url,
    pub client_id: String,
    pub redirect_uri: Url,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub scopes: Vec<String>,
    pub token_endpoint: Url,
}

impl AuthorizationRequest {
    pub fn build(config: &ProviderConfig, endpoints: ProviderEndpoints) -> HarvestResult<Self> {
        let redirect_uri = config.redirect_url()?;
        let scopes = requested_scopes(&config.scopes);
        let state = random_token(STATE_LENGTH);
        let nonce = random_token(STATE_LENGTH);
        let code_verifier = random_token(VERIFIER_LENGTH);
        let code_challenge = pkce_challenge(&code_verifier);

        let mut auth_uri = endpoints.authorization_endpoint;
        auth_uri
            .query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("response_mode", "query");

        Ok(Self {
            auth_uri,
            client_id: config.client_id.clone(),
            redirect_uri,
            state,
            nonce,
            code_verifier,
            scopes,
            token_endpoint: endpoints.token_endpoint,
        })
    }

    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// Parses the captured URL and checks it is the configured redirect
    /// target carrying a `state` parameter.
    pub fn validate_redirect(&self, raw: &str) -> HarvestResult<Url> {
        let url = Url::parse(raw.trim()).map_err(|e| {
            HarvestError::auth_flow(format!("unexpected redirect target '{}': {}", raw, e))
        })?;
        if !is_expected_redirect(&self.redirect_uri, &url) {
            return Err(HarvestError::auth_flow(format!(
                "unexpected redirect target '{}', expected {}?state=...",
                raw, self.redirect_uri
            )));
        }
        Ok(url)
    }
}

/// Scheme, host, port and path must equal the expected redirect URI, and
/// the query must carry `state`.
pub fn is_expected_redirect(expected: &Url, candidate: &Url) -> bool {
    candidate.scheme() == expected.scheme()
        && candidate.host_str() == expected.host_str()
        && candidate.port_or_known_default() == expected.port_or_known_default()
        && candidate.path() == expected.path()
        && candidate.query_pairs().any(|(key, _)| key == "state")
}

/// Configured scopes followed by the reserved OIDC scopes, without repeats.
pub fn requested_scopes(configured: &[String]) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    let candidates = configured
        .iter()
        .map(|s| s.trim())
        .chain(RESERVED_SCOPES.iter().copied());
    for scope in candidates {
        if !scope.is_empty() && !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_string());
        }
    }
    scopes
}

/// Fetches `authorization_endpoint` and `token_endpoint` for the authority.
///
/// The authority answers invalid tenants or policies with an `error` payload,
/// which is reported as a configuration error.
pub fn discover_endpoints(
    config: &ProviderConfig,
    transport: &dyn HttpTransport,
) -> HarvestResult<ProviderEndpoints> {
    let url = config.discovery_url()?;
    tracing::debug!("Fetching OIDC discovery document from {}", url);
    let response = transport.get(&url, &[("Accept", "application/json")])?;

    let document = match response.json() {
        Ok(document) => document,
        Err(_) if !response.is_success() => {
            return Err(HarvestError::configuration(format!(
                "identity provider rejected authority {} with HTTP {}",
                config.authority, response.status
            )));
        }
        Err(e) => return Err(e),
    };

    if let Some(error) = provider_error(&document) {
        return Err(HarvestError::configuration(format!(
            "identity provider rejected the authorization request: {}",
            error
        )));
    }
    if !response.is_success() {
        return Err(HarvestError::configuration(format!(
            "identity provider rejected authority {} with HTTP {}",
            config.authority, response.status
        )));
    }

    Ok(ProviderEndpoints {
        authorization_endpoint: endpoint_field(&document, "authorization_endpoint")?,
        token_endpoint: endpoint_field(&document, "token_endpoint")?,
    })
}

fn endpoint_field(document: &Value, field: &str) -> HarvestResult<Url> {
    let raw = document[field].as_str().ok_or_else(|| {
        HarvestError::configuration(format!("discovery document has no {}", field))
    })?;
    Url::parse(raw).map_err(|e| {
        HarvestError::configuration(format!("discovery document {} '{}': {}", field, raw, e))
    })
}

/// Renders an OAuth `error`/`error_description` payload, if present.
pub fn provider_error(document: &Value) -> Option<String> {
    let error = match &document["error"] {
        Value::Null => return None,
        Value::String(code) => code.clone(),
        // Some Azure endpoints nest the error as {"code": .., "message": ..}.
        Value::Object(inner) => {
            let code = inner.get("code").and_then(Value::as_str).unwrap_or("error");
            match inner.get("message").and_then(Value::as_str) {
                Some(message) => return Some(format!("{}: {}", code, message)),
                None => code.to_string(),
            }
        }
        other => other.to_string(),
    };

    match document["error_description"].as_str() {
        Some(description) => Some(format!("{}: {}", error, description.trim())),
        None => Some(error),
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// RFC 7636 `S256` challenge for a verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
#[path = "tests/request_tests.rs"]
mod tests;
