//! Scripted collaborators shared by the unit tests.

use crate::auth::AuthorizationCompleter;
use crate::config::ProviderConfig;
use crate::errors::{HarvestError, HarvestResult};
use crate::http::{HttpResponse, HttpTransport};
use base64::Engine;
use serde_json::{json, Value};
use std::cell::RefCell;
use url::Url;

pub const AUTHORIZE_ENDPOINT: &str = "https://login.example.com/tenant/oauth2/v2.0/authorize";
pub const TOKEN_ENDPOINT: &str = "https://login.example.com/tenant/oauth2/v2.0/token";

pub fn tenant_config() -> ProviderConfig {
    ProviderConfig::default_config().unwrap()
}

pub fn discovery_body() -> String {
    json!({
        "issuer": "https://login.example.com/tenant/v2.0/",
        "authorization_endpoint": AUTHORIZE_ENDPOINT,
        "token_endpoint": TOKEN_ENDPOINT,
        "response_types_supported": ["code", "id_token"],
    })
    .to_string()
}

/// Unsigned compact JWS carrying `claims`.
pub fn id_token(claims: &Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.c2lnbmF0dXJl",
        engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        engine.encode(claims.to_string())
    )
}

pub fn token_body(claims: &Value) -> String {
    json!({
        "access_token": "ACCESS-TOKEN",
        "token_type": "Bearer",
        "expires_in": 3600,
        "id_token": id_token(claims),
    })
    .to_string()
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Route {
    fragment: String,
    status: u16,
    body: String,
}

/// Answers requests from a table of URL fragments and records every call.
///
/// The longest fragment contained in the URL wins, so
/// `consumptions/2024-05/average` shadows `consumptions/2024-05`.
/// Unmatched URLs fail like a refused connection.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Vec<Route>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, fragment: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.push(Route {
            fragment: fragment.to_string(),
            status,
            body: body.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.url.clone()).collect()
    }

    fn respond(&self, call: RecordedCall) -> HarvestResult<HttpResponse> {
        let url = call.url.clone();
        self.calls.borrow_mut().push(call);

        let route = self
            .routes
            .iter()
            .filter(|r| url.contains(&r.fragment))
            .max_by_key(|r| r.fragment.len());
        match route {
            Some(route) => Ok(HttpResponse {
                url,
                status: route.status,
                body: route.body.clone(),
            }),
            None => Err(HarvestError::network(url, "connection refused")),
        }
    }
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &Url, headers: &[(&str, &str)]) -> HarvestResult<HttpResponse> {
        self.respond(RecordedCall {
            method: "GET",
            url: url.to_string(),
            headers: owned_pairs(headers),
            form: Vec::new(),
        })
    }

    fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> HarvestResult<HttpResponse> {
        self.respond(RecordedCall {
            method: "POST",
            url: url.to_string(),
            headers: Vec::new(),
            form: owned_pairs(form),
        })
    }
}

pub enum FakeRedirect {
    /// Redirect to the requested `redirect_uri` with the request's own state.
    Echo { code: String },
    Fixed(String),
    Fail(HarvestError),
}

/// Stands in for the operator or the headless browser.
pub struct FakeCompleter {
    pub redirect: FakeRedirect,
    pub invocations: usize,
    pub last_auth_uri: Option<Url>,
}

impl FakeCompleter {
    pub fn echo(code: &str) -> Self {
        Self::with(FakeRedirect::Echo {
            code: code.to_string(),
        })
    }

    pub fn fixed(url: &str) -> Self {
        Self::with(FakeRedirect::Fixed(url.to_string()))
    }

    pub fn with(redirect: FakeRedirect) -> Self {
        Self {
            redirect,
            invocations: 0,
            last_auth_uri: None,
        }
    }
}

fn query_value(url: &Url, name: &str) -> String {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

impl AuthorizationCompleter for FakeCompleter {
    fn name(&self) -> &'static str {
        "scripted completer"
    }

    fn complete(&mut self, auth_uri: &Url) -> HarvestResult<String> {
        self.invocations += 1;
        self.last_auth_uri = Some(auth_uri.clone());
        match &self.redirect {
            FakeRedirect::Echo { code } => Ok(format!(
                "{}?state={}&code={}",
                query_value(auth_uri, "redirect_uri"),
                query_value(auth_uri, "state"),
                code
            )),
            FakeRedirect::Fixed(url) => Ok(url.clone()),
            FakeRedirect::Fail(err) => Err(err.clone()),
        }
    }
}
