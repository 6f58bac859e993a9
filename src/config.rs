//! Runtime configuration from `GATEKEEPER_*` environment variables with defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};
use crate::identity::RouteTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub super_admin_verify_url: String,
    pub admin_verify_url: String,
    pub verify_timeout_ms: u64,
    #[serde(default)]
    pub bearer_token: Option<String>,
    pub cache_path: PathBuf,
    pub routes: RouteTable,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            super_admin_verify_url: "http://127.0.0.1:8080/api/super-admin/me".into(),
            admin_verify_url: "http://127.0.0.1:8080/api/admin/me".into(),
            verify_timeout_ms: 5000,
            bearer_token: None,
            cache_path: PathBuf::from(".gatekeeper/session.json"),
            routes: RouteTable::default(),
        }
    }
}

impl GateConfig {
    pub fn from_env() -> GateResult<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable lookup; unset or empty variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> GateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = GateConfig::default();

        if let Some(v) = get("GATEKEEPER_SUPER_ADMIN_VERIFY_URL") { cfg.super_admin_verify_url = v; }
        if let Some(v) = get("GATEKEEPER_ADMIN_VERIFY_URL") { cfg.admin_verify_url = v; }
        if let Some(v) = get("GATEKEEPER_VERIFY_TIMEOUT_MS") {
            cfg.verify_timeout_ms = v
                .parse::<u64>()
                .map_err(|e| GateError::config(format!("GATEKEEPER_VERIFY_TIMEOUT_MS='{}': {}", v, e)))?;
        }
        cfg.bearer_token = get("GATEKEEPER_BEARER_TOKEN");
        if let Some(v) = get("GATEKEEPER_CACHE_PATH") { cfg.cache_path = PathBuf::from(v); }
        if let Some(v) = get("GATEKEEPER_DASHBOARD_ROUTE") { cfg.routes.dashboard = v; }
        if let Some(v) = get("GATEKEEPER_SUPER_ADMIN_LOGIN_ROUTE") { cfg.routes.super_admin_login = v; }
        if let Some(v) = get("GATEKEEPER_ADMIN_LOGIN_ROUTE") { cfg.routes.admin_login = v; }
        if let Some(v) = get("GATEKEEPER_AUTH_ROUTES") {
            cfg.routes.auth_routes = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.verify_timeout_ms == 0 {
            return Err(GateError::config("verification timeout must be positive"));
        }
        for (name, url) in [("super-admin", &self.super_admin_verify_url), ("admin", &self.admin_verify_url)] {
            reqwest::Url::parse(url).map_err(|e| GateError::config(format!("{} verify URL '{}': {}", name, url, e)))?;
        }
        Ok(())
    }

    pub fn verify_timeout(&self) -> Duration { Duration::from_millis(self.verify_timeout_ms) }
}
