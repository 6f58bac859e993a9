//! gatekeeper: decides who the caller of a protected admin page is.
//!
//! A cached identity is trusted optimistically and re-verified in the background; with
//! no cache the super-admin and admin authorities are asked in that order, and a caller
//! neither vouches for is sent to the matching login page.

pub mod config;
pub mod error;
pub mod identity;

pub use config::GateConfig;
pub use error::{GateError, GateResult, VerifyError};
pub use identity::{ResolutionEngine, ResolutionResult};
