//! Blocking HTTP transport shared by the authenticator and the harvester.

use crate::errors::{HarvestError, HarvestResult};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Longest body excerpt quoted in an error message.
const ERROR_BODY_PREVIEW: usize = 200;

/// A fully read response. Non-success statuses are not errors at this level
/// so callers can inspect provider error payloads.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON regardless of the status code.
    pub fn json(&self) -> HarvestResult<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| HarvestError::malformed(&self.url, format!("invalid JSON body: {}", e)))
    }

    /// Parses the body as JSON, treating any non-2xx status as a network error.
    pub fn success_json(&self) -> HarvestResult<Value> {
        if !self.is_success() {
            return Err(HarvestError::network(
                &self.url,
                format!("HTTP {}: {}", self.status, body_preview(&self.body)),
            ));
        }
        self.json()
    }
}

fn body_preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_PREVIEW {
        return trimmed.to_string();
    }
    let mut preview: String = trimmed.chars().take(ERROR_BODY_PREVIEW).collect();
    preview.push_str("...");
    preview
}

/// The two request shapes the flow needs.
pub trait HttpTransport {
    fn get(&self, url: &Url, headers: &[(&str, &str)]) -> HarvestResult<HttpResponse>;

    /// `application/x-www-form-urlencoded` POST.
    fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> HarvestResult<HttpResponse>;
}

/// `ureq`-backed transport. One agent per run, connections are reused.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// `None` leaves requests without a deadline.
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .http_status_as_error(false)
            .build();
        let agent: ureq::Agent = config.into();
        Self { agent }
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &Url, headers: &[(&str, &str)]) -> HarvestResult<HttpResponse> {
        tracing::debug!("GET {}", url);
        let mut request = self.agent.get(url.as_str());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request
            .call()
            .map_err(|e| HarvestError::network(url.as_str(), e.to_string()))?;
        read_response(url, response)
    }

    fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> HarvestResult<HttpResponse> {
        tracing::debug!("POST {}", url);
        let response = self
            .agent
            .post(url.as_str())
            .header("Accept", "application/json")
            .send_form(form.iter().copied())
            .map_err(|e| HarvestError::network(url.as_str(), e.to_string()))?;
        read_response(url, response)
    }
}

fn read_response(
    url: &Url,
    mut response: ureq::http::Response<ureq::Body>,
) -> HarvestResult<HttpResponse> {
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| HarvestError::network(url.as_str(), format!("failed to read body: {}", e)))?;
    tracing::debug!("{} answered {} ({} bytes)", url, status, body.len());
    Ok(HttpResponse {
        url: url.to_string(),
        status,
        body,
    })
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
