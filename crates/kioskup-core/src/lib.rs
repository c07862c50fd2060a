//! kioskup-core - stage logic for the kiosk self-update orchestrator.
//!
//! The pipeline refreshes a git-deployed kiosk application in place:
//! resolve the account that owns the checkout, repair writability drift,
//! hard-sync to the remote branch tip, rebuild the Python environment when
//! the manifest changed, sweep ephemeral caches, reapply display rotation,
//! reboot. Every OS touchpoint sits behind a narrow trait so the
//! orchestration is testable without a device.

pub mod cache;
pub mod config;
pub mod deps;
pub mod display;
pub mod error;
pub mod escalate;
pub mod executor;
pub mod identity;
pub mod orchestrator;
pub mod process;
pub mod reboot;
pub mod repair;
pub mod util;
pub mod vcs;

pub use config::UpdateConfig;
pub use error::UpdateError;
pub use executor::{UpdatePath, UpdateReport};
pub use identity::EffectiveIdentity;
pub use orchestrator::{Pipeline, RunSummary};
pub use reboot::{CancelToken, RebootOutcome};
