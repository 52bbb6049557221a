//! OAuth2 authorization-code login against the tenant portal's identity
//! provider.
//!
//! The flow is driven by [`Authenticator`], a small state machine:
//!
//! ```text
//! Unstarted -> AuthorizationRequested -> RedirectCaptured -> TokenExchanged
//!      \______________________\_________________\__________-> Failed
//! ```
//!
//! Credential entry happens outside this module, behind
//! [`AuthorizationCompleter`]: either the operator pastes the redirect URL
//! ([`ManualCompleter`]) or a headless browser fills the login form
//! ([`HeadlessCompleter`]).

pub mod claims;
pub mod completer;
pub mod headless;
pub mod request;
pub mod token;
mod webdriver;

pub use claims::RentalAgreementRef;
pub use completer::{AuthorizationCompleter, ManualCompleter};
pub use headless::{Credentials, HeadlessCompleter};
use request::AuthorizationRequest;

use crate::config::ProviderConfig;
use crate::errors::{HarvestError, HarvestResult};
use crate::http::HttpTransport;
use chrono::{DateTime, Local, TimeDelta};
use serde_json::Value;
use url::Url;

/// Outcome of a completed login. Lives for one run only.
#[derive(Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub id_token_claims: Value,
    /// Token lifetime in seconds, as reported by the token endpoint.
    pub expires_in: Option<u64>,
}

impl AuthSession {
    pub fn rental_agreement(&self) -> HarvestResult<RentalAgreementRef> {
        RentalAgreementRef::from_claims(&self.id_token_claims)
    }

    pub fn expires_at(&self, issued_at: DateTime<Local>) -> Option<DateTime<Local>> {
        let seconds = i64::try_from(self.expires_in?).ok()?;
        issued_at.checked_add_signed(TimeDelta::try_seconds(seconds)?)
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("id_token_claims", &self.id_token_claims)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unstarted,
    AuthorizationRequested,
    RedirectCaptured,
    TokenExchanged,
    Failed,
}

/// Drives one authorization-code flow. Not reusable: a second login needs a
/// new authenticator, and any error leaves it in [`AuthPhase::Failed`].
pub struct Authenticator<'a> {
    config: &'a ProviderConfig,
    transport: &'a dyn HttpTransport,
    phase: AuthPhase,
}

impl<'a> Authenticator<'a> {
    pub fn new(config: &'a ProviderConfig, transport: &'a dyn HttpTransport) -> Self {
        Self {
            config,
            transport,
            phase: AuthPhase::Unstarted,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Runs the whole flow with the given credential-entry strategy.
    pub fn login(
        &mut self,
        completer: &mut dyn AuthorizationCompleter,
    ) -> HarvestResult<AuthSession> {
        let request = self.initiate()?;
        let redirect = self.obtain_authorization_response(&request, completer)?;
        let session = self.exchange_code_for_token(&request, &redirect)?;
        tracing::info!("Auth successful");
        tracing::debug!("Auth result: {:?}", session);
        Ok(session)
    }

    /// Validates the configuration, resolves the provider endpoints and
    /// builds the authorization URL.
    pub fn initiate(&mut self) -> HarvestResult<AuthorizationRequest> {
        self.expect_phase(AuthPhase::Unstarted, "initiate the flow")?;
        let result = initiate_request(self.config, self.transport);
        self.settle(result, AuthPhase::AuthorizationRequested)
    }

    /// Hands the authorization URL to the completer and checks the URL it
    /// comes back with. No token exchange happens if the check fails.
    pub fn obtain_authorization_response(
        &mut self,
        request: &AuthorizationRequest,
        completer: &mut dyn AuthorizationCompleter,
    ) -> HarvestResult<Url> {
        self.expect_phase(AuthPhase::AuthorizationRequested, "capture the redirect")?;
        tracing::debug!("Completing authorization via {}", completer.name());
        let result = completer
            .complete(&request.auth_uri)
            .and_then(|raw| request.validate_redirect(&raw));
        self.settle(result, AuthPhase::RedirectCaptured)
    }

    pub fn exchange_code_for_token(
        &mut self,
        request: &AuthorizationRequest,
        redirect: &Url,
    ) -> HarvestResult<AuthSession> {
        self.expect_phase(AuthPhase::RedirectCaptured, "exchange the code")?;
        let result = token::exchange_code(self.transport, request, redirect);
        self.settle(result, AuthPhase::TokenExchanged)
    }

    fn expect_phase(&mut self, expected: AuthPhase, operation: &str) -> HarvestResult<()> {
        if self.phase == expected {
            return Ok(());
        }
        let err = HarvestError::auth_flow(format!(
            "cannot {} in phase {:?} (expected {:?})",
            operation, self.phase, expected
        ));
        self.phase = AuthPhase::Failed;
        Err(err)
    }

    fn settle<T>(&mut self, result: HarvestResult<T>, next: AuthPhase) -> HarvestResult<T> {
        match result {
            Ok(value) => {
                tracing::debug!("Auth phase {:?} -> {:?}", self.phase, next);
                self.phase = next;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!("Auth phase {:?} -> Failed", self.phase);
                self.phase = AuthPhase::Failed;
                Err(err)
            }
        }
    }
}

fn initiate_request(
    config: &ProviderConfig,
    transport: &dyn HttpTransport,
) -> HarvestResult<AuthorizationRequest> {
    config.validate()?;
    let endpoints = request::discover_endpoints(config, transport)?;
    AuthorizationRequest::build(config, endpoints)
}

#[cfg(test)]
#[path = "tests/authenticator_tests.rs"]
mod tests;
