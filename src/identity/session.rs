use tracing::info;

use crate::error::GateResult;
use super::engine::ResolutionEngine;
use super::principal::{Authority, Identity};
use super::redirect::{RedirectPolicy, RedirectTarget};

/// Login/logout side of the cache: the only writers besides the engine itself.
pub struct SessionActions {
    engine: ResolutionEngine,
}

impl SessionActions {
    pub fn new(engine: ResolutionEngine) -> Self { Self { engine } }

    /// Record a successful credential submission and say where to go next.
    pub fn login(&self, identity: &Identity) -> GateResult<RedirectTarget> {
        self.engine.cache().write_identity(identity)?;
        info!(target: "gatekeeper::session", "login authority={} principal={}", identity.authority, identity.principal.display_name());
        Ok(RedirectPolicy::after_login(identity))
    }

    /// Drop the cached identity and any remembered prior role, and return the login page
    /// matching whichever of the two was present.
    pub fn logout(&self) -> GateResult<RedirectTarget> {
        let cache = self.engine.cache();
        let authority = cache.read().map(|e| e.authority).or_else(|| cache.prior());
        cache.clear()?;
        cache.forget_prior()?;
        // the current view is gone; stop any in-flight work from applying to it
        self.engine.navigation().leave();
        info!(target: "gatekeeper::session", "logout authority={:?}", authority);
        Ok(RedirectTarget::login_for(authority.unwrap_or(Authority::Admin)))
    }
}
