//! Automated login: a headless browser fills in the provider's login form.

use super::completer::AuthorizationCompleter;
use super::request::is_expected_redirect;
use super::webdriver::{BrowserSession, DriverProcess};
use crate::config::LoginConfig;
use crate::errors::HarvestResult;
use std::time::{Duration, Instant};
use url::Url;

/// Portal username and password for the automated login.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct HeadlessCompleter {
    credentials: Credentials,
    login: LoginConfig,
    expected_redirect: Url,
}

impl HeadlessCompleter {
    pub fn new(credentials: Credentials, login: LoginConfig, expected_redirect: Url) -> Self {
        Self {
            credentials,
            login,
            expected_redirect,
        }
    }

    fn drive(&self, session: &BrowserSession<'_>, auth_uri: &Url) -> HarvestResult<String> {
        session.set_implicit_wait(self.login.element_wait())?;
        session.navigate(auth_uri.as_str())?;

        let username = session.find_by_id(&self.login.username_field)?;
        session.send_keys(&username, &self.credentials.username)?;
        let password = session.find_by_id(&self.login.password_field)?;
        session.send_keys(&password, &self.credentials.password)?;
        let submit = session.find_by_id(&self.login.submit_button)?;
        session.click(&submit)?;
        tracing::debug!("Login form submitted, waiting for redirect");

        wait_for_redirect(
            || session.current_url(),
            &self.expected_redirect,
            self.login.redirect_timeout(),
            self.login.poll_interval(),
        )
    }
}

impl AuthorizationCompleter for HeadlessCompleter {
    fn name(&self) -> &'static str {
        "automated headless login"
    }

    fn complete(&mut self, auth_uri: &Url) -> HarvestResult<String> {
        tracing::info!("Automated login");
        // Session is declared after the driver so it is closed first.
        let driver = DriverProcess::spawn(&self.login)?;
        let session = BrowserSession::start(&driver, &self.login.browser_args)?;
        self.drive(&session, auth_uri)
    }
}

/// Polls the browser location until it reaches the expected redirect target
/// or `timeout` elapses. On timeout the last location is returned as-is and
/// left to the caller's redirect check.
pub fn wait_for_redirect<F>(
    mut current_url: F,
    expected: &Url,
    timeout: Duration,
    interval: Duration,
) -> HarvestResult<String>
where
    F: FnMut() -> HarvestResult<String>,
{
    // An unrepresentable deadline means no deadline.
    let deadline = Instant::now().checked_add(timeout);
    loop {
        let current = current_url()?;
        let arrived = Url::parse(&current)
            .map(|url| is_expected_redirect(expected, &url))
            .unwrap_or(false);
        if arrived {
            return Ok(current);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::warn!(
                "Browser did not reach {} within {:?}, stopped at {}",
                expected,
                timeout,
                current
            );
            return Ok(current);
        }
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
#[path = "tests/headless_tests.rs"]
mod tests;
