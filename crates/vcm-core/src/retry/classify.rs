//! Classify HTTP status and transport errors into retry policy error kinds.

use crate::retry::error::CallError;
use crate::retry::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

/// Classify a reqwest transport error for retry decisions.
pub fn classify_reqwest_error(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        return ErrorKind::Timeout;
    }
    if e.is_connect() {
        return ErrorKind::Connection;
    }
    if let Some(status) = e.status() {
        return classify_http_status(status.as_u16());
    }
    ErrorKind::Other
}

/// Classify a provider call error into an ErrorKind.
pub fn classify(e: &CallError) -> ErrorKind {
    match e {
        CallError::Timeout => ErrorKind::Timeout,
        CallError::Connection(_) => ErrorKind::Connection,
        CallError::Http(code) => classify_http_status(*code),
        CallError::Other(_) => ErrorKind::Other,
    }
}
