//! The update executor.
//!
//! Brings the working tree to the tip of the remote branch, discarding
//! every local modification, as the effective identity. The direct path is
//! the common case once the repairer has run; the escalated fallback only
//! exists for the race where something re-broke permissions between repair
//! and execution, and is never entered after a direct-path failure.

use std::path::Path;

use crate::error::UpdateError;
use crate::escalate::PrivilegeEscalator;
use crate::identity::EffectiveIdentity;
use crate::repair::chown_remedy;
use crate::vcs::VersionControl;

/// Which executor path produced the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePath {
    /// git ran as the current process against a writable tree.
    Direct,
    /// git ran as the effective identity through escalation.
    Elevated,
}

/// A successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// The path that succeeded.
    pub path: UpdatePath,
    /// Revision before the update.
    pub previous_revision: String,
    /// Revision after the update.
    pub new_revision: String,
}

/// Run the update.
///
/// Three steps on either path: discard local state (tolerated on failure,
/// a clean tree has nothing to discard), fetch the remote (fatal), hard
/// reset to the remote branch tip (fatal).
///
/// # Errors
///
/// [`UpdateError::Permissions`] when the tree is unwritable and no
/// escalated fallback is available; fetch and reset errors otherwise.
/// No retry on any of them: the scheduler re-invokes the whole run.
#[allow(clippy::too_many_arguments)]
pub fn execute(
    vcs: &dyn VersionControl,
    elevated: Option<&dyn VersionControl>,
    escalator: &dyn PrivilegeEscalator,
    identity: &EffectiveIdentity,
    root: &Path,
    remote: &str,
    branch: &str,
    writable: bool,
) -> Result<UpdateReport, UpdateError> {
    if writable {
        return sync_to_remote(vcs, remote, branch).map(|(previous, new)| UpdateReport {
            path: UpdatePath::Direct,
            previous_revision: previous,
            new_revision: new,
        });
    }

    // Defense in depth: writability was never established, but a
    // non-interactive escalator may still get us there as the owner.
    let (Some(elevated), true) = (elevated, escalator.available()) else {
        return Err(UpdateError::Permissions {
            remedy: chown_remedy(root, identity),
        });
    };

    println!("  tree not writable directly, updating as {}", identity.username);
    let (previous, new) = sync_to_remote(elevated, remote, branch)?;

    // The escalated git may still have dropped root-owned files (hooks,
    // lock files). Hand the whole tree back to the owner.
    let root_str = root.to_string_lossy().to_string();
    let spec = identity.chown_spec();
    escalator.run_root(&["chown", "-R", spec.as_str(), root_str.as_str()])?;

    Ok(UpdateReport {
        path: UpdatePath::Elevated,
        previous_revision: previous,
        new_revision: new,
    })
}

fn sync_to_remote(
    vcs: &dyn VersionControl,
    remote: &str,
    branch: &str,
) -> Result<(String, String), UpdateError> {
    let previous = vcs.current_revision()?;

    // Step 1: make the update deterministic regardless of prior state.
    // Failures tolerated; a clean repository has nothing to discard.
    if let Err(err) = vcs.reset_hard("HEAD") {
        println!("  note: discarding local edits failed ({err}), continuing");
        tracing::warn!(error = %err, "pre-update reset failed");
    }
    if let Err(err) = vcs.clean() {
        println!("  note: removing untracked files failed ({err}), continuing");
        tracing::warn!(error = %err, "pre-update clean failed");
    }

    // Steps 2 and 3: fatal on first failure.
    vcs.fetch(remote)?;
    let target = format!("{remote}/{branch}");
    vcs.reset_hard(&target)?;

    let new = vcs.current_revision()?;
    tracing::info!(previous = %previous, new = %new, "working tree synced");
    Ok((previous, new))
}
