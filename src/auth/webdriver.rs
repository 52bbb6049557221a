//! Minimal W3C WebDriver client: just the commands the login form needs.
//!
//! The driver process and the browser session are both drop guards, so the
//! browser is torn down on every exit path of the login, errors included.

use crate::config::LoginConfig;
use crate::errors::{HarvestError, HarvestResult};
use serde_json::{json, Value};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use url::Url;

const DRIVER_BINARY: &str = "chromedriver";

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Upper bound for a single driver command (page loads included).
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

enum Method {
    Get,
    Post(Value),
    Delete,
}

/// A spawned WebDriver server listening on a loopback port.
pub struct DriverProcess {
    child: Child,
    base_url: Url,
    agent: ureq::Agent,
}

impl DriverProcess {
    pub fn spawn(login: &LoginConfig) -> HarvestResult<Self> {
        let binary = driver_binary(login)?;
        let port = free_port()?;
        let base_url = Url::parse(&format!("http://127.0.0.1:{}/", port))
            .map_err(|e| HarvestError::auth_flow(format!("invalid WebDriver address: {}", e)))?;

        tracing::debug!("Starting {} on port {}", binary.display(), port);
        let child = Command::new(&binary)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                HarvestError::auth_flow(format!("failed to start {}: {}", binary.display(), e))
            })?;

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(COMMAND_TIMEOUT))
            .http_status_as_error(false)
            .build();
        let mut driver = Self {
            child,
            base_url,
            agent: config.into(),
        };
        driver.wait_until_ready(login.driver_startup())?;
        Ok(driver)
    }

    fn wait_until_ready(&mut self, timeout: Duration) -> HarvestResult<()> {
        // An unrepresentable deadline means no deadline.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(HarvestError::auth_flow(format!(
                    "WebDriver exited during startup ({})",
                    status
                )));
            }
            if let Ok(status) = self.command(Method::Get, "status") {
                if status["ready"].as_bool() == Some(true) {
                    return Ok(());
                }
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(HarvestError::auth_flow(format!(
                    "WebDriver not ready after {:?}",
                    timeout
                )));
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }
    }

    /// Sends one command and unwraps the W3C `{"value": ...}` envelope.
    fn command(&self, method: Method, path: &str) -> HarvestResult<Value> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| HarvestError::auth_flow(format!("invalid WebDriver path {}: {}", path, e)))?;

        let result = match method {
            Method::Get => self.agent.get(url.as_str()).call(),
            Method::Delete => self.agent.delete(url.as_str()).call(),
            Method::Post(body) => {
                let payload = body.to_string();
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&payload)
            }
        };
        let mut response = result
            .map_err(|e| HarvestError::auth_flow(format!("WebDriver {} failed: {}", path, e)))?;

        let status = response.status();
        let text = response.body_mut().read_to_string().map_err(|e| {
            HarvestError::auth_flow(format!("WebDriver {} unreadable: {}", path, e))
        })?;
        let mut envelope: Value = serde_json::from_str(&text).map_err(|e| {
            HarvestError::auth_flow(format!("WebDriver {} returned non-JSON: {}", path, e))
        })?;
        let value = envelope
            .get_mut("value")
            .map(Value::take)
            .unwrap_or(Value::Null);

        if !status.is_success() {
            let error = value["error"].as_str().unwrap_or("unknown error");
            let message = value["message"].as_str().unwrap_or_default();
            return Err(HarvestError::auth_flow(format!(
                "WebDriver {} rejected ({}): {}",
                path,
                error,
                first_line(message)
            )));
        }
        Ok(value)
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn driver_binary(login: &LoginConfig) -> HarvestResult<PathBuf> {
    match &login.driver_path {
        Some(path) => Ok(path.clone()),
        None => which::which(DRIVER_BINARY).map_err(|e| {
            HarvestError::auth_flow(format!(
                "{} not found on PATH ({}); install it or log in with --browser",
                DRIVER_BINARY, e
            ))
        }),
    }
}

fn free_port() -> HarvestResult<u16> {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .map_err(|e| HarvestError::auth_flow(format!("no free port for WebDriver: {}", e)))
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

/// Opaque element reference returned by `find element`.
pub struct ElementRef(String);

/// One browser session. Deleted (browser closed) when dropped.
pub struct BrowserSession<'d> {
    driver: &'d DriverProcess,
    id: String,
}

impl<'d> BrowserSession<'d> {
    pub fn start(driver: &'d DriverProcess, browser_args: &[String]) -> HarvestResult<Self> {
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": browser_args },
                }
            }
        });
        let created = driver.command(Method::Post(capabilities), "session")?;
        let id = created["sessionId"]
            .as_str()
            .ok_or_else(|| HarvestError::auth_flow("WebDriver returned no session id"))?
            .to_string();
        tracing::debug!("Browser session {} started", id);
        Ok(Self { driver, id })
    }

    fn session_command(&self, method: Method, suffix: &str) -> HarvestResult<Value> {
        self.driver
            .command(method, &format!("session/{}/{}", self.id, suffix))
    }

    pub fn set_implicit_wait(&self, wait: Duration) -> HarvestResult<()> {
        let millis = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self.session_command(Method::Post(json!({ "implicit": millis })), "timeouts")?;
        Ok(())
    }

    pub fn navigate(&self, url: &str) -> HarvestResult<()> {
        self.session_command(Method::Post(json!({ "url": url })), "url")?;
        Ok(())
    }

    pub fn current_url(&self) -> HarvestResult<String> {
        let value = self.session_command(Method::Get, "url")?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| HarvestError::auth_flow("WebDriver returned no current URL"))
    }

    pub fn find_by_id(&self, element_id: &str) -> HarvestResult<ElementRef> {
        let query = json!({
            "using": "css selector",
            "value": format!("[id=\"{}\"]", element_id),
        });
        let found = self
            .session_command(Method::Post(query), "element")
            .map_err(|e| {
                HarvestError::auth_flow(format!("login form has no #{}: {}", element_id, e))
            })?;
        found[ELEMENT_KEY]
            .as_str()
            .map(|id| ElementRef(id.to_string()))
            .ok_or_else(|| {
                HarvestError::auth_flow(format!("WebDriver returned no reference for #{}", element_id))
            })
    }

    pub fn send_keys(&self, element: &ElementRef, text: &str) -> HarvestResult<()> {
        self.session_command(
            Method::Post(json!({ "text": text })),
            &format!("element/{}/value", element.0),
        )?;
        Ok(())
    }

    pub fn click(&self, element: &ElementRef) -> HarvestResult<()> {
        self.session_command(Method::Post(json!({})), &format!("element/{}/click", element.0))?;
        Ok(())
    }
}

impl Drop for BrowserSession<'_> {
    fn drop(&mut self) {
        let path = format!("session/{}", self.id);
        if let Err(e) = self.driver.command(Method::Delete, &path) {
            tracing::debug!("Closing browser session failed: {}", e);
        }
    }
}
