//! Provider call error type for retry classification.

use std::fmt;

/// Error returned by a single geocoding provider call.
/// Used so we can classify and decide retries before converting to anyhow.
#[derive(Debug)]
pub enum CallError {
    /// The per-call deadline elapsed.
    Timeout,
    /// Network-level failure (connect, DNS, reset).
    Connection(String),
    /// HTTP response had a non-2xx status.
    Http(u16),
    /// Malformed response body or any other failure. Not retried.
    Other(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Timeout => write!(f, "call timed out"),
            CallError::Connection(e) => write!(f, "connection: {}", e),
            CallError::Http(code) => write!(f, "HTTP {}", code),
            CallError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CallError {}

impl From<reqwest::Error> for CallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CallError::Timeout
        } else if e.is_connect() {
            CallError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            CallError::Http(status.as_u16())
        } else {
            CallError::Other(e.to_string())
        }
    }
}
