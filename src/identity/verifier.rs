//! Verification against the two remote authorities.
//!
//! `VerificationClient` owns the timeout: whatever the underlying `Verifier` does, a call
//! that does not answer in time comes back as `NetworkFailure`, never `Rejected`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::GateConfig;
use crate::error::{GateError, GateResult, VerifyError};
use super::principal::{Authority, Identity, Principal};

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Authoritative(Identity),
    /// 401/403: the authority says the caller is not this identity.
    Rejected,
    NetworkFailure(VerifyError),
}

impl VerificationOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationOutcome::Authoritative(_) => "authoritative",
            VerificationOutcome::Rejected => "rejected",
            VerificationOutcome::NetworkFailure(_) => "network_failure",
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            VerificationOutcome::Authoritative(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool { matches!(self, VerificationOutcome::Rejected) }
    pub fn is_network_failure(&self) -> bool { matches!(self, VerificationOutcome::NetworkFailure(_)) }
}

pub trait Verifier: Send + Sync {
    fn verify(&self, authority: Authority) -> BoxFuture<'_, VerificationOutcome>;
}

#[derive(Clone)]
pub struct VerificationClient {
    verifier: Arc<dyn Verifier>,
    timeout: Duration,
}

impl VerificationClient {
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self { verifier, timeout: DEFAULT_VERIFY_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration { self.timeout }

    pub async fn verify_super_admin(&self) -> VerificationOutcome { self.verify(Authority::SuperAdmin).await }

    pub async fn verify_admin(&self) -> VerificationOutcome { self.verify(Authority::Admin).await }

    pub async fn verify(&self, authority: Authority) -> VerificationOutcome {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.verifier.verify(authority)).await {
            Ok(VerificationOutcome::Authoritative(id)) if id.authority != authority => {
                VerificationOutcome::NetworkFailure(VerifyError::decode(format!(
                    "{} endpoint answered for {}", authority, id.authority
                )))
            }
            Ok(o) => o,
            Err(_) => VerificationOutcome::NetworkFailure(VerifyError::timeout(self.timeout)),
        };
        match &outcome {
            VerificationOutcome::NetworkFailure(e) => debug!(
                target: "gatekeeper::verify",
                "verify authority={} outcome={} reason={} elapsed_ms={}",
                authority, outcome.kind(), e, started.elapsed().as_millis()
            ),
            _ => debug!(
                target: "gatekeeper::verify",
                "verify authority={} outcome={} elapsed_ms={}",
                authority, outcome.kind(), started.elapsed().as_millis()
            ),
        }
        outcome
    }
}

/// Verifier backed by one HTTP endpoint per authority. The client keeps cookies so a
/// session cookie set by the login flow rides along.
#[derive(Clone)]
pub struct HttpVerifier {
    client: reqwest::Client,
    super_admin_url: Url,
    admin_url: Url,
    bearer: Option<String>,
    timeout: Duration,
}

impl HttpVerifier {
    pub fn new(super_admin_url: &str, admin_url: &str, timeout: Duration) -> GateResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            super_admin_url: parse_url(super_admin_url)?,
            admin_url: parse_url(admin_url)?,
            bearer: None,
            timeout,
        })
    }

    pub fn from_config(cfg: &GateConfig) -> GateResult<Self> {
        let v = Self::new(&cfg.super_admin_verify_url, &cfg.admin_verify_url, cfg.verify_timeout())?;
        Ok(match &cfg.bearer_token {
            Some(t) => v.with_bearer_token(t.clone()),
            None => v,
        })
    }

    pub fn with_bearer_token<S: Into<String>>(mut self, token: S) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn url_for(&self, authority: Authority) -> &Url {
        match authority {
            Authority::SuperAdmin => &self.super_admin_url,
            Authority::Admin => &self.admin_url,
        }
    }

    async fn call(&self, authority: Authority) -> VerificationOutcome {
        let mut req = self.client.get(self.url_for(authority).clone());
        if let Some(t) = &self.bearer {
            req = req.bearer_auth(t);
        }
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return VerificationOutcome::NetworkFailure(VerifyError::timeout(self.timeout)),
            Err(e) => return VerificationOutcome::NetworkFailure(VerifyError::transport(e.to_string())),
        };
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return VerificationOutcome::Rejected;
        }
        if !status.is_success() {
            return VerificationOutcome::NetworkFailure(VerifyError::Status { status: status.as_u16() });
        }
        let body: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) if e.is_timeout() => return VerificationOutcome::NetworkFailure(VerifyError::timeout(self.timeout)),
            Err(e) => return VerificationOutcome::NetworkFailure(VerifyError::decode(e.to_string())),
        };
        match identity_from_body(authority, body) {
            Ok(id) => VerificationOutcome::Authoritative(id),
            Err(e) => VerificationOutcome::NetworkFailure(e),
        }
    }
}

impl Verifier for HttpVerifier {
    fn verify(&self, authority: Authority) -> BoxFuture<'_, VerificationOutcome> {
        self.call(authority).boxed()
    }
}

fn parse_url(s: &str) -> GateResult<Url> {
    Url::parse(s).map_err(|e| GateError::config(format!("invalid verification URL '{}': {}", s, e)))
}

/// Accepts `{"role": .., "principal": {..}}` or a bare principal object.
pub fn identity_from_body(authority: Authority, body: Value) -> Result<Identity, VerifyError> {
    let Value::Object(mut obj) = body else {
        return Err(VerifyError::decode("expected a JSON object"));
    };
    let role = obj
        .get("role")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string());
    let principal = match obj.remove("principal") {
        Some(p) => Principal::from_value(p).ok_or_else(|| VerifyError::decode("principal is not an object"))?,
        None => Principal(obj),
    };
    if !principal.fits(authority) {
        return Err(VerifyError::decode(format!(
            "{} principal without '{}'", authority, authority.required_field()
        )));
    }
    let role = role.unwrap_or_else(|| authority.default_role().to_string());
    Ok(Identity::new(authority, role, principal))
}
