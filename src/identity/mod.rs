//! Identity resolution for protected admin pages.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod cache;
mod verifier;
mod redirect;
mod navigation;
mod reconciler;
mod engine;
mod session;

pub use principal::{Authority, Identity, Principal};
pub use cache::{CacheEntry, CacheLoad, CacheStore, FileStore, IdentityCache, MemoryStore, PriorRole, CACHE_KEY, PRIOR_KEY};
pub use verifier::{identity_from_body, HttpVerifier, VerificationClient, VerificationOutcome, Verifier, DEFAULT_VERIFY_TIMEOUT};
pub use redirect::{RedirectPolicy, RedirectTarget, RouteTable};
pub use navigation::{Navigation, Ticket};
pub use reconciler::{BackgroundReconciler, ReconcileOutcome};
pub use engine::{PageEntry, ResolutionEngine, ResolutionResult, State};
pub use session::SessionActions;
