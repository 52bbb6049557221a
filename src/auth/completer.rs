//! Credential-entry strategies for the authorization step.

use crate::errors::{HarvestError, HarvestResult};
use anyhow::{anyhow, Result};
use std::io::{BufRead, Stderr, StdinLock, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use url::Url;

/// Takes the user through the provider's login page and returns the URL the
/// browser ended up on. Validation of that URL is left to the caller.
pub trait AuthorizationCompleter {
    fn name(&self) -> &'static str;

    fn complete(&mut self, auth_uri: &Url) -> HarvestResult<String>;
}

/// Launches a browser on the given URL.
pub type BrowserOpener = fn(&str) -> Result<()>;

/// Operator-driven login: show the URL, maybe open a browser, then read the
/// final redirect URL from the terminal.
pub struct ManualCompleter<R, W> {
    input: R,
    output: W,
    opener: Option<BrowserOpener>,
}

impl ManualCompleter<StdinLock<'static>, Stderr> {
    pub fn stdio() -> Self {
        Self::new(
            std::io::stdin().lock(),
            std::io::stderr(),
            Some(open_in_browser as BrowserOpener),
        )
    }
}

impl<R: BufRead, W: Write> ManualCompleter<R, W> {
    pub fn new(input: R, output: W, opener: Option<BrowserOpener>) -> Self {
        Self {
            input,
            output,
            opener,
        }
    }

    fn prompt(&mut self, auth_uri: &Url) -> std::io::Result<String> {
        writeln!(self.output, "Go to this URL to login: {}", auth_uri)?;
        if let Some(open) = self.opener {
            match open(auth_uri.as_str()) {
                Ok(()) => writeln!(
                    self.output,
                    "A browser window should open automatically, if not enter the URL above"
                )?,
                Err(e) => tracing::warn!("Could not open a browser ({}), open the URL manually", e),
            }
        }
        write!(self.output, "Enter resulting redirect_url: ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "input closed before a redirect URL was entered",
            ));
        }
        Ok(line.trim_end().to_string())
    }
}

impl<R: BufRead, W: Write> AuthorizationCompleter for ManualCompleter<R, W> {
    fn name(&self) -> &'static str {
        "manual browser login"
    }

    fn complete(&mut self, auth_uri: &Url) -> HarvestResult<String> {
        self.prompt(auth_uri)
            .map_err(|e| HarvestError::io(PathBuf::from("<terminal>"), &e))
    }
}

/// Best-effort launch of the platform's default browser.
///
/// - macOS: `open`
/// - Linux: `xdg-open`, then `gio open`
/// - Windows: `cmd /c start`
pub fn open_in_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        spawn_detached("open", &[url])
    }

    #[cfg(target_os = "linux")]
    {
        if which::which("xdg-open").is_ok() {
            return spawn_detached("xdg-open", &[url]);
        }
        if which::which("gio").is_ok() {
            return spawn_detached("gio", &["open", url]);
        }
        Err(anyhow!("neither xdg-open nor gio found on PATH"))
    }

    #[cfg(target_os = "windows")]
    {
        spawn_detached("cmd", &["/C", "start", "", url])
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = url;
        Err(anyhow!("Unsupported platform for opening a browser"))
    }
}

fn spawn_detached(program: &str, args: &[&str]) -> Result<()> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow!("Failed to spawn {}: {}", program, e))?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/completer_tests.rs"]
mod tests;
