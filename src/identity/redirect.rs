use serde::{Deserialize, Serialize};

use super::principal::{Authority, Identity};
use super::verifier::VerificationOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectTarget {
    Dashboard,
    SuperAdminLogin,
    AdminLogin,
    /// Already on a login/registration route: render nothing, navigate nowhere.
    Stay,
}

impl RedirectTarget {
    pub fn login_for(authority: Authority) -> Self {
        match authority {
            Authority::SuperAdmin => RedirectTarget::SuperAdminLogin,
            Authority::Admin => RedirectTarget::AdminLogin,
        }
    }
}

pub struct RedirectPolicy;

impl RedirectPolicy {
    /// Target once both authorities failed to vouch for the caller. `prior` is the
    /// authority of a cache entry that existed for this caller, if any; without one the
    /// regular-admin login is the default.
    pub fn decide(
        super_outcome: &VerificationOutcome,
        admin_outcome: &VerificationOutcome,
        prior: Option<Authority>,
    ) -> RedirectTarget {
        if super_outcome.identity().is_some() || admin_outcome.identity().is_some() {
            return RedirectTarget::Dashboard;
        }
        match prior {
            Some(a) => RedirectTarget::login_for(a),
            None => RedirectTarget::AdminLogin,
        }
    }

    pub fn after_login(_identity: &Identity) -> RedirectTarget { RedirectTarget::Dashboard }
}

/// Route strings for each target plus the set of routes on which resolution never runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTable {
    pub dashboard: String,
    pub super_admin_login: String,
    pub admin_login: String,
    pub auth_routes: Vec<String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            dashboard: "/admin/dashboard".into(),
            super_admin_login: "/super-admin/login".into(),
            admin_login: "/admin/login".into(),
            auth_routes: vec![
                "/super-admin/login".into(),
                "/admin/login".into(),
                "/super-admin/register".into(),
                "/admin/register".into(),
            ],
        }
    }
}

impl RouteTable {
    pub fn route_for(&self, target: RedirectTarget) -> Option<&str> {
        match target {
            RedirectTarget::Dashboard => Some(&self.dashboard),
            RedirectTarget::SuperAdminLogin => Some(&self.super_admin_login),
            RedirectTarget::AdminLogin => Some(&self.admin_login),
            RedirectTarget::Stay => None,
        }
    }

    pub fn is_auth_route(&self, path: &str) -> bool {
        let p = normalize(path);
        self.auth_routes.iter().any(|r| normalize(r) == p)
            || normalize(&self.super_admin_login) == p
            || normalize(&self.admin_login) == p
    }
}

// strips query/fragment and a trailing slash
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let p = &path[..end];
    if p.len() > 1 { p.trim_end_matches('/') } else { p }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerifyError;

    fn net() -> VerificationOutcome { VerificationOutcome::NetworkFailure(VerifyError::transport("refused")) }

    #[test]
    fn decision_table() {
        let rej = VerificationOutcome::Rejected;
        let n = net();
        for (s, a) in [(&rej, &rej), (&rej, &n), (&n, &rej), (&n, &n)] {
            assert_eq!(RedirectPolicy::decide(s, a, Some(Authority::SuperAdmin)), RedirectTarget::SuperAdminLogin);
            assert_eq!(RedirectPolicy::decide(s, a, Some(Authority::Admin)), RedirectTarget::AdminLogin);
            assert_eq!(RedirectPolicy::decide(s, a, None), RedirectTarget::AdminLogin);
        }
    }

    #[test]
    fn auth_routes_match_loosely() {
        let routes = RouteTable::default();
        assert!(routes.is_auth_route("/admin/login"));
        assert!(routes.is_auth_route("/admin/login/"));
        assert!(routes.is_auth_route("/super-admin/register?next=%2Fadmin"));
        assert!(routes.is_auth_route("/admin/login#top"));
        assert!(!routes.is_auth_route("/admin/dashboard"));
        assert!(!routes.is_auth_route("/admin/login/extra"));
        assert!(!routes.is_auth_route("/"));
    }

    #[test]
    fn login_routes_count_even_when_not_listed() {
        let routes = RouteTable { auth_routes: vec![], ..RouteTable::default() };
        assert!(routes.is_auth_route("/super-admin/login"));
        assert!(!routes.is_auth_route("/admin/register"));
    }

    #[test]
    fn stay_has_no_route() {
        let routes = RouteTable::default();
        assert_eq!(routes.route_for(RedirectTarget::Stay), None);
        assert_eq!(routes.route_for(RedirectTarget::AdminLogin), Some("/admin/login"));
    }
}
