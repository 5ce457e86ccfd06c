use std::io;
use std::result::Result as StdResult;
use thiserror::Error;

/// Crate-wide error taxonomy. Variants carry rendered messages so the type
/// stays `Clone`, which lets one failed upstream fetch be surfaced to every
/// caller sharing the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
    #[error("supply data integrity violation: {0}")]
    DataIntegrity(String),
    #[error("state persistence failed: {0}")]
    State(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::InvalidResponse(err.to_string())
        } else {
            // Timeouts, connect failures and error statuses all land here.
            Error::UpstreamUnavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidResponse(err.to_string())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::State(err.to_string())
    }
}

impl From<teloxide::RequestError> for Error {
    fn from(err: teloxide::RequestError) -> Self {
        Error::UpstreamUnavailable(err.to_string())
    }
}

pub type Result<T> = StdResult<T, Error>;
