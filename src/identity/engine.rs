//! Identity resolution state machine.
//!
//! A page entry with a cached identity renders it at once and re-verifies in the
//! background against that identity's authority only. Without a cache the engine blocks:
//! super-admin first, then admin, and a redirect when neither vouches for the caller.
//!
//! ```text
//! Start ─┬─> CacheHit ──> Reconciling            (Resolved(cached) emitted immediately)
//!        └─> CacheMiss ─> VerifyingSuper ─┬─> Terminal(Resolved)
//!                                         └─> VerifyingAdmin ─┬─> Terminal(Resolved)
//!                                                             └─> Terminal(Redirect)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::config::GateConfig;
use crate::error::GateResult;
use super::cache::{CacheLoad, FileStore, IdentityCache};
use super::navigation::{Navigation, Ticket};
use super::principal::{Authority, Identity};
use super::reconciler::{BackgroundReconciler, ReconcileOutcome};
use super::redirect::{RedirectPolicy, RedirectTarget, RouteTable};
use super::verifier::{HttpVerifier, VerificationClient, VerificationOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ResolutionResult {
    Resolved(Identity),
    Redirect(RedirectTarget),
    /// Authority checks outstanding, or the resolution was abandoned by navigation.
    Pending,
}

impl ResolutionResult {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            ResolutionResult::Resolved(id) => Some(id),
            _ => None,
        }
    }

    pub fn redirect(&self) -> Option<RedirectTarget> {
        match self {
            ResolutionResult::Redirect(t) => Some(*t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Start,
    CacheHit,
    CacheMiss,
    VerifyingSuper,
    VerifyingAdmin,
    Reconciling,
    Terminal(ResolutionResult),
}

/// What the page router gets back from one page entry.
pub struct PageEntry {
    /// Value to render now. On a cache hit this is the optimistic identity.
    pub result: ResolutionResult,
    /// Rendered identity over time; the reconciler may correct it.
    pub view: watch::Receiver<ResolutionResult>,
    pub transitions: Vec<State>,
    pub reconcile: Option<JoinHandle<ReconcileOutcome>>,
}

impl PageEntry {
    pub fn is_optimistic(&self) -> bool { self.reconcile.is_some() }

    /// Wait for background reconciliation, if any was scheduled.
    pub async fn reconciled(&mut self) -> Option<ReconcileOutcome> {
        let handle = self.reconcile.take()?;
        match handle.await {
            Ok(o) => Some(o),
            Err(e) => {
                warn!(target: "gatekeeper::engine", "reconcile task failed: {}", e);
                None
            }
        }
    }
}

struct Run {
    transitions: Vec<State>,
}

impl Run {
    fn go(&mut self, s: State) {
        trace!(target: "gatekeeper::engine", "transition -> {:?}", s);
        self.transitions.push(s);
    }
}

struct EngineInner {
    cache: IdentityCache,
    client: VerificationClient,
    routes: RouteTable,
    nav: Navigation,
}

#[derive(Clone)]
pub struct ResolutionEngine {
    inner: Arc<EngineInner>,
}

impl ResolutionEngine {
    pub fn new(cache: IdentityCache, client: VerificationClient, routes: RouteTable) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                cache,
                client,
                routes,
                nav: Navigation::new(),
            }),
        }
    }

    /// HTTP verifier plus a file-backed cache, both from configuration.
    pub fn from_config(cfg: &GateConfig) -> GateResult<Self> {
        let verifier = HttpVerifier::from_config(cfg)?;
        let client = VerificationClient::new(Arc::new(verifier)).with_timeout(cfg.verify_timeout());
        let cache = IdentityCache::new(Arc::new(FileStore::new(&cfg.cache_path)));
        Ok(Self::new(cache, client, cfg.routes.clone()))
    }

    pub fn cache(&self) -> &IdentityCache { &self.inner.cache }
    pub fn routes(&self) -> &RouteTable { &self.inner.routes }
    pub fn navigation(&self) -> &Navigation { &self.inner.nav }

    /// Authority whose login page a failed resolution falls back to, if one is known.
    pub fn prior_authority(&self) -> Option<Authority> { self.inner.cache.prior() }

    /// Resolve and return only the value to render.
    pub async fn resolve(&self, route: &str) -> ResolutionResult {
        self.enter(route).await.result
    }

    /// Run the protocol for one protected-page entry.
    pub async fn enter(&self, route: &str) -> PageEntry {
        if self.inner.routes.is_auth_route(route) {
            trace!(target: "gatekeeper::engine", "route {} is a login/registration route, not resolving", route);
            let result = ResolutionResult::Redirect(RedirectTarget::Stay);
            let (_tx, view) = watch::channel(result.clone());
            return PageEntry { result, view, transitions: Vec::new(), reconcile: None };
        }

        let ticket = self.inner.nav.begin();
        let mut run = Run { transitions: Vec::new() };
        run.go(State::Start);

        match self.inner.cache.load() {
            CacheLoad::Hit(entry) => {
                run.go(State::CacheHit);
                let optimistic = ResolutionResult::Resolved(entry.identity());
                let (tx, view) = watch::channel(optimistic.clone());
                info!(
                    target: "gatekeeper::engine",
                    "cache hit authority={} principal={}, rendering optimistically",
                    entry.authority, entry.principal.display_name()
                );
                run.go(State::Reconciling);
                let reconciler = BackgroundReconciler {
                    cache: self.inner.cache.clone(),
                    client: self.inner.client.clone(),
                };
                let handle = reconciler.spawn(entry, ticket, tx);
                PageEntry { result: optimistic, view, transitions: run.transitions, reconcile: Some(handle) }
            }
            _ => {
                run.go(State::CacheMiss);
                let (tx, view) = watch::channel(ResolutionResult::Pending);
                let result = self.verify_synchronously(&mut run, ticket).await;
                tx.send_replace(result.clone());
                PageEntry { result, view, transitions: run.transitions, reconcile: None }
            }
        }
    }

    async fn verify_synchronously(&self, run: &mut Run, mut ticket: Ticket) -> ResolutionResult {
        run.go(State::VerifyingSuper);
        let Some(super_outcome) = self.verify_unless_superseded(Authority::SuperAdmin, &mut ticket).await else {
            return self.abandoned(Authority::SuperAdmin);
        };
        if let Some(result) = self.accept(run, &super_outcome) {
            return result;
        }

        run.go(State::VerifyingAdmin);
        let Some(admin_outcome) = self.verify_unless_superseded(Authority::Admin, &mut ticket).await else {
            return self.abandoned(Authority::Admin);
        };
        if let Some(result) = self.accept(run, &admin_outcome) {
            return result;
        }

        let prior = self.prior_authority();
        let target = RedirectPolicy::decide(&super_outcome, &admin_outcome, prior);
        info!(
            target: "gatekeeper::engine",
            "no authority vouched (super={}, admin={}, prior={:?}), redirecting to {:?}",
            super_outcome.kind(), admin_outcome.kind(), prior, target
        );
        let result = ResolutionResult::Redirect(target);
        run.go(State::Terminal(result.clone()));
        result
    }

    async fn verify_unless_superseded(&self, authority: Authority, ticket: &mut Ticket) -> Option<VerificationOutcome> {
        let outcome = tokio::select! {
            biased;
            _ = ticket.superseded() => None,
            o = self.inner.client.verify(authority) => Some(o),
        };
        // a navigation can land between the answer and this check
        outcome.filter(|_| ticket.is_current())
    }

    fn accept(&self, run: &mut Run, outcome: &VerificationOutcome) -> Option<ResolutionResult> {
        let id = outcome.identity()?;
        if let Err(e) = self.inner.cache.write_identity(id) {
            warn!(target: "gatekeeper::engine", "could not cache verified identity: {}", e);
        }
        info!(
            target: "gatekeeper::engine",
            "resolved authority={} role={} principal={}",
            id.authority, id.role, id.principal.display_name()
        );
        let result = ResolutionResult::Resolved(id.clone());
        run.go(State::Terminal(result.clone()));
        Some(result)
    }

    fn abandoned(&self, during: Authority) -> ResolutionResult {
        info!(target: "gatekeeper::engine", "navigation moved on during {} verification, abandoning", during);
        ResolutionResult::Pending
    }
}
