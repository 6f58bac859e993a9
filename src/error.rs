//! Error model for the identity resolution crate.
//! Library APIs return `GateResult<T>`; verification failures are not errors here,
//! they are `VerificationOutcome` values consumed by the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Cache value exists but fails parsing or shape validation.
    #[error("malformed_cache: {0}")]
    MalformedCache(String),
    #[error("store: {0}")]
    Store(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("http_client: {0}")]
    Http(#[from] reqwest::Error),
}

impl GateError {
    pub fn code_str(&self) -> &'static str {
        match self {
            GateError::MalformedCache(_) => "malformed_cache",
            GateError::Store(_) => "store",
            GateError::Config(_) => "config",
            GateError::Http(_) => "http_client",
        }
    }

    pub fn malformed<S: Into<String>>(msg: S) -> Self { GateError::MalformedCache(msg.into()) }
    pub fn config<S: Into<String>>(msg: S) -> Self { GateError::Config(msg.into()) }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::MalformedCache(err.to_string())
    }
}

pub type GateResult<T> = Result<T, GateError>;

/// Reason carried by a `NetworkFailure`. Never proof that the caller is not who the
/// cache says they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifyError {
    #[error("timed out after {millis}ms")]
    Timeout { millis: u64 },
    #[error("transport: {message}")]
    Transport { message: String },
    #[error("unexpected status {status}")]
    Status { status: u16 },
    #[error("undecodable body: {message}")]
    Decode { message: String },
}

impl VerifyError {
    pub fn timeout(after: Duration) -> Self { VerifyError::Timeout { millis: after.as_millis() as u64 } }
    pub fn transport<S: Into<String>>(msg: S) -> Self { VerifyError::Transport { message: msg.into() } }
    pub fn decode<S: Into<String>>(msg: S) -> Self { VerifyError::Decode { message: msg.into() } }

    pub fn is_timeout(&self) -> bool { matches!(self, VerifyError::Timeout { .. }) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping() {
        assert_eq!(GateError::malformed("x").code_str(), "malformed_cache");
        assert_eq!(GateError::config("x").code_str(), "config");
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(GateError::from(io).code_str(), "store");
    }

    #[test]
    fn json_errors_become_malformed_cache() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let e: GateError = err.into();
        assert!(matches!(e, GateError::MalformedCache(_)));
        assert!(e.to_string().starts_with("malformed_cache: "));
    }

    #[test]
    fn timeout_reason_reports_millis() {
        let e = VerifyError::timeout(Duration::from_millis(2500));
        assert!(e.is_timeout());
        assert_eq!(e.to_string(), "timed out after 2500ms");
        assert!(!VerifyError::Status { status: 502 }.is_timeout());
    }
}
