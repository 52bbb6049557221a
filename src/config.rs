use crate::errors::{HarvestError, HarvestResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Static description of the identity provider and the portal API.
///
/// Loaded once at startup and only ever passed around by reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Authority URL of the B2C policy, without a trailing slash.
    pub authority: String,
    /// Public client id (no client secret).
    pub client_id: String,
    /// Resource scopes requested in addition to the reserved OIDC scopes.
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub api_base: String,
    /// Sent with every API call; the portal blocks non-browser agents.
    pub user_agent: String,
    /// Global per-request timeout. Absent means calls may block indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub login: LoginConfig,
}

/// Settings for the automated (headless browser) login.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoginConfig {
    /// Explicit WebDriver binary. Falls back to `chromedriver` on `PATH`.
    #[serde(default)]
    pub driver_path: Option<PathBuf>,
    #[serde(default = "default_username_field")]
    pub username_field: String,
    #[serde(default = "default_password_field")]
    pub password_field: String,
    #[serde(default = "default_submit_button")]
    pub submit_button: String,
    /// Implicit wait applied to element lookups.
    #[serde(default = "default_element_wait_secs")]
    pub element_wait_secs: u64,
    /// Upper bound for the client-side redirect after submitting the form.
    #[serde(default = "default_redirect_timeout_secs")]
    pub redirect_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long to wait for the WebDriver server to report ready.
    #[serde(default = "default_driver_startup_secs")]
    pub driver_startup_secs: u64,
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            driver_path: None,
            username_field: default_username_field(),
            password_field: default_password_field(),
            submit_button: default_submit_button(),
            element_wait_secs: default_element_wait_secs(),
            redirect_timeout_secs: default_redirect_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            driver_startup_secs: default_driver_startup_secs(),
            browser_args: default_browser_args(),
        }
    }
}

fn default_username_field() -> String {
    "signInName".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

fn default_submit_button() -> String {
    "next".to_string()
}

fn default_element_wait_secs() -> u64 {
    2
}

fn default_redirect_timeout_secs() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_driver_startup_secs() -> u64 {
    10
}

fn default_browser_args() -> Vec<String> {
    vec![
        "--headless=new".to_string(),
        "--window-size=1920,1080".to_string(),
    ]
}

impl LoginConfig {
    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn redirect_timeout(&self) -> Duration {
        Duration::from_secs(self.redirect_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn driver_startup(&self) -> Duration {
        Duration::from_secs(self.driver_startup_secs)
    }
}

impl ProviderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid provider config: {}", path.display()))?;
        Ok(config)
    }

    /// The built-in Techem tenant portal settings.
    pub fn default_config() -> Result<Self> {
        const DEFAULT_PROVIDER_YAML: &str = include_str!("../provider.yaml");

        let config: Self = serde_yaml::from_str(DEFAULT_PROVIDER_YAML)
            .context("Failed to parse embedded provider.yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::default_config(),
        }
    }

    pub fn validate(&self) -> HarvestResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(HarvestError::configuration("client_id must not be empty"));
        }
        if self.scopes.iter().all(|s| s.trim().is_empty()) {
            return Err(HarvestError::configuration(
                "at least one scope must be configured",
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(HarvestError::configuration("user_agent must not be empty"));
        }

        let authority = parse_url("authority", &self.authority)?;
        if authority.scheme() != "https" {
            return Err(HarvestError::configuration(format!(
                "authority must use https: {}",
                self.authority
            )));
        }

        let redirect = self.redirect_url()?;
        if redirect.scheme() != "https" {
            return Err(HarvestError::configuration(format!(
                "redirect_uri must use https: {}",
                self.redirect_uri
            )));
        }

        let api_base = self.api_base_url()?;
        if api_base.cannot_be_a_base() {
            return Err(HarvestError::configuration(format!(
                "api_base cannot carry path segments: {}",
                self.api_base
            )));
        }

        Ok(())
    }

    pub fn redirect_url(&self) -> HarvestResult<Url> {
        parse_url("redirect_uri", &self.redirect_uri)
    }

    pub fn api_base_url(&self) -> HarvestResult<Url> {
        parse_url("api_base", &self.api_base)
    }

    /// `{authority}/v2.0/.well-known/openid-configuration`
    pub fn discovery_url(&self) -> HarvestResult<Url> {
        let raw = format!(
            "{}/v2.0/.well-known/openid-configuration",
            self.authority.trim_end_matches('/')
        );
        parse_url("authority", &raw)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_url(field: &str, raw: &str) -> HarvestResult<Url> {
    Url::parse(raw)
        .map_err(|e| HarvestError::configuration(format!("invalid {} '{}': {}", field, raw, e)))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
