//! Error taxonomy for a harvest run.
//!
//! Every variant is fatal: nothing in the pipeline recovers locally, errors
//! travel up to `main` where they end the process.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Errors that can abort authentication or harvesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestError {
    /// The identity provider rejected the authorization request, or the
    /// local provider configuration is unusable.
    Configuration { message: String },
    /// The authorization-code flow did not complete: wrong redirect target,
    /// state mismatch, no code or token, or the browser automation failed.
    AuthFlow { message: String },
    /// Transport failure or non-success HTTP status.
    Network { url: String, message: String },
    /// A body that is not JSON, or JSON lacking a required field.
    MalformedResponse { url: String, message: String },
    /// Local file or terminal I/O failure.
    Io { path: PathBuf, message: String },
}

impl HarvestError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn auth_flow(message: impl Into<String>) -> Self {
        Self::AuthFlow {
            message: message.into(),
        }
    }

    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn malformed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl Display for HarvestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration { message } => write!(f, "configuration error: {}", message),
            Self::AuthFlow { message } => write!(f, "authentication failed: {}", message),
            Self::Network { url, message } => write!(f, "request to {} failed: {}", url, message),
            Self::MalformedResponse { url, message } => {
                write!(f, "malformed response from {}: {}", url, message)
            }
            Self::Io { path, message } => write!(f, "I/O error on {}: {}", path.display(), message),
        }
    }
}

impl std::error::Error for HarvestError {}

pub type HarvestResult<T> = Result<T, HarvestError>;
