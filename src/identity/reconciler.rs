//! Background re-verification of an identity that has already been rendered from cache.
//! Fails open for the current view and closed for the next one: a network failure keeps
//! the cached identity, a rejection evicts it without touching the rendered page.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::{CacheEntry, IdentityCache};
use super::engine::ResolutionResult;
use super::navigation::Ticket;
use super::verifier::{VerificationClient, VerificationOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Authority vouched again; `changed` when the cached identity was corrected. The
    /// rendered view follows only while the user is still on it.
    Confirmed { changed: bool },
    /// Authority rejected the cached identity; the entry was removed.
    Evicted,
    /// Network failure; the optimistic identity stands.
    Kept,
    /// The cache slot was rewritten (login, another resolution) before the answer arrived.
    Superseded,
}

pub struct BackgroundReconciler {
    pub(crate) cache: IdentityCache,
    pub(crate) client: VerificationClient,
}

impl BackgroundReconciler {
    pub fn spawn(
        self,
        cached: CacheEntry,
        ticket: Ticket,
        view: watch::Sender<ResolutionResult>,
    ) -> JoinHandle<ReconcileOutcome> {
        tokio::spawn(async move { self.run(cached, ticket, view).await })
    }

    pub async fn run(
        self,
        cached: CacheEntry,
        ticket: Ticket,
        view: watch::Sender<ResolutionResult>,
    ) -> ReconcileOutcome {
        let authority = cached.authority;
        match self.client.verify(authority).await {
            VerificationOutcome::Authoritative(id) => {
                if !self.slot_holds(&cached) {
                    debug!(target: "gatekeeper::reconcile", "cache slot changed during reconcile, discarding {}", authority);
                    return ReconcileOutcome::Superseded;
                }
                if let Err(e) = self.cache.write_identity(&id) {
                    warn!(target: "gatekeeper::reconcile", "cache refresh failed: {}", e);
                }
                let changed = id != cached.identity();
                if changed {
                    info!(target: "gatekeeper::reconcile", "identity corrected authority={} role={}", authority, id.role);
                    if ticket.is_current() {
                        view.send_replace(ResolutionResult::Resolved(id));
                    } else {
                        debug!(target: "gatekeeper::reconcile", "view already left, correction applies from the next entry");
                    }
                }
                ReconcileOutcome::Confirmed { changed }
            }
            VerificationOutcome::Rejected => {
                // the rejection is about `cached`; a newer write owns the slot now
                if !self.slot_holds(&cached) {
                    debug!(target: "gatekeeper::reconcile", "cache slot changed during reconcile, ignoring {} rejection", authority);
                    return ReconcileOutcome::Superseded;
                }
                match self.cache.evict(authority) {
                    Ok(()) => info!(target: "gatekeeper::reconcile", "{} rejected cached identity, evicted", authority),
                    Err(e) => warn!(target: "gatekeeper::reconcile", "eviction failed: {}", e),
                }
                ReconcileOutcome::Evicted
            }
            VerificationOutcome::NetworkFailure(e) => {
                debug!(target: "gatekeeper::reconcile", "{} unreachable ({}), keeping cached identity", authority, e);
                ReconcileOutcome::Kept
            }
        }
    }

    fn slot_holds(&self, cached: &CacheEntry) -> bool {
        self.cache.read().as_ref() == Some(cached)
    }
}
