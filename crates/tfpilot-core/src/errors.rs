//! Error types shared across the tfpilot core
//!
//! One enum covers the whole pipeline. The variants mirror how failures are
//! surfaced to callers: `MalformedLocator` and `NotFound` are returned
//! synchronously from the parse path, everything after a deployment has been
//! accepted travels over the event channel instead.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PilotError {
    #[error("Malformed repository locator: {0}")]
    MalformedLocator(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("GitHub request failed: {0}")]
    Fetch(String),
    #[error("Parsing error: {0}")]
    Parse(String),
    #[error("Deployment error: {0}")]
    Deploy(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PilotError {
    fn from(err: std::io::Error) -> Self {
        PilotError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for PilotError {
    fn from(err: reqwest::Error) -> Self {
        PilotError::Fetch(err.to_string())
    }
}

impl From<serde_json::Error> for PilotError {
    fn from(err: serde_json::Error) -> Self {
        PilotError::Parse(err.to_string())
    }
}
