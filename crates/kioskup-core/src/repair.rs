//! Repository writability repair.
//!
//! The checkout is owned by the desktop user but the updater frequently
//! runs as root, and past runs (or a root `git pull` by hand) may have left
//! root-owned objects behind. Before any update we verify the tree is
//! actually writable and, when it is not, repair ownership or at least
//! permissions.

use std::fs::OpenOptions;
use std::path::Path;

use xshell::Shell;

use crate::error::UpdateError;
use crate::escalate::PrivilegeEscalator;
use crate::identity::EffectiveIdentity;
use crate::util::best_effort;
use crate::vcs::VersionControl;

/// What the repairer found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    /// Whether the tree is writable now.
    pub writable: bool,
    /// Whether a repair was attempted.
    pub repaired: bool,
}

/// Ensure the metadata store and working tree are writable.
///
/// Probes by actually creating a file in each location rather than trusting
/// mode bits, because ownership drift is exactly the failure being hunted.
/// Repair prefers a privileged `chown -R` to the effective identity and
/// falls back to relaxing permissions when no escalation is available.
///
/// # Errors
///
/// - [`UpdateError::NotARepository`] when the root has no `.git`.
/// - [`UpdateError::Permissions`] when the tree is still unwritable after
///   repair. This is fatal and not retried; the message carries the exact
///   command an operator should run once.
pub fn ensure_writable(
    root: &Path,
    identity: &EffectiveIdentity,
    escalator: &dyn PrivilegeEscalator,
    vcs: &dyn VersionControl,
    elevated_vcs: Option<&dyn VersionControl>,
) -> Result<RepairReport, UpdateError> {
    if !vcs.is_repository() {
        return Err(UpdateError::NotARepository {
            path: root.to_path_buf(),
        });
    }

    // Avoid git's divergent-ownership refusal for both identities before
    // any repository command runs.
    best_effort("marking repository as a safe.directory", || {
        vcs.mark_safe_directory()?;
        Ok(())
    });
    if let Some(elevated) = elevated_vcs {
        best_effort("marking safe.directory for the repository owner", || {
            elevated.mark_safe_directory()?;
            Ok(())
        });
    }

    if tree_writable(root) {
        return Ok(RepairReport {
            writable: true,
            repaired: false,
        });
    }

    println!("  repository is not writable, attempting repair");
    repair(root, identity, escalator);

    if tree_writable(root) {
        return Ok(RepairReport {
            writable: true,
            repaired: true,
        });
    }

    Err(UpdateError::Permissions {
        remedy: chown_remedy(root, identity),
    })
}

/// The one-shot command an operator can run to fix ownership for good.
/// Uses the same numeric `uid:gid` spec the repair path chowns with.
pub fn chown_remedy(root: &Path, identity: &EffectiveIdentity) -> String {
    format!("sudo chown -R {} {}", identity.chown_spec(), root.display())
}

/// Whether the object store, refs area, and tree root are all writable.
pub fn tree_writable(root: &Path) -> bool {
    let git_dir = root.join(".git");
    [
        root.to_path_buf(),
        git_dir.clone(),
        git_dir.join("objects"),
        git_dir.join("refs"),
    ]
    .iter()
    .all(|p| probe_writable(p))
}

// Probe by creating and removing a file. Mode bits lie when the directory
// is owned by someone else.
fn probe_writable(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let probe = dir.join(".kioskup-write-probe");
    let created = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&probe)
        .is_ok();
    if created {
        let _ = std::fs::remove_file(&probe);
    }
    created
}

fn repair(root: &Path, identity: &EffectiveIdentity, escalator: &dyn PrivilegeEscalator) {
    let root_str = root.to_string_lossy().to_string();
    let git_dir = root.join(".git").to_string_lossy().to_string();

    if escalator.available() {
        let spec = identity.chown_spec();
        best_effort("restoring tree ownership", || {
            escalator.run_root(&["chown", "-R", spec.as_str(), root_str.as_str()])?;
            Ok(())
        });
        best_effort("relaxing metadata permissions", || {
            escalator.run_root(&["chmod", "-R", "ug+rwX", git_dir.as_str()])?;
            Ok(())
        });
    } else {
        // Ownership change needs privileges; permissions are all we can
        // touch from here.
        best_effort("relaxing metadata permissions", || {
            let sh = Shell::new()?;
            sh.cmd("chmod").args(["-R", "u+rwX", git_dir.as_str()]).run()?;
            Ok(())
        });
    }

    tracing::info!(root = %root.display(), "writability repair attempted");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::escalate::NoEscalator;
    use crate::vcs::GitCli;

    fn identity() -> EffectiveIdentity {
        EffectiveIdentity {
            username: "pi".to_string(),
            home: PathBuf::from("/home/pi"),
            uid: 1000,
            gid: 1000,
        }
    }

    fn scaffold_repo(root: &Path) {
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::create_dir_all(root.join(".git/refs")).unwrap();
    }

    struct NotARepo;
    impl VersionControl for NotARepo {
        fn is_repository(&self) -> bool {
            false
        }
        fn current_revision(&self) -> Result<String, UpdateError> {
            unreachable!()
        }
        fn fetch(&self, _: &str) -> Result<(), UpdateError> {
            unreachable!()
        }
        fn reset_hard(&self, _: &str) -> Result<(), UpdateError> {
            unreachable!()
        }
        fn clean(&self) -> Result<(), UpdateError> {
            unreachable!()
        }
        fn changed_files(&self, _: &str, _: &str) -> Result<Vec<String>, UpdateError> {
            unreachable!()
        }
        fn mark_safe_directory(&self) -> Result<(), UpdateError> {
            unreachable!()
        }
    }

    #[test]
    fn missing_repository_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_writable(
            dir.path(),
            &identity(),
            &NoEscalator,
            &NotARepo,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, UpdateError::NotARepository { .. }));
    }

    #[test]
    fn writable_scaffold_reports_no_repair() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_repo(dir.path());

        struct RecordingSafe;
        impl VersionControl for RecordingSafe {
            fn is_repository(&self) -> bool {
                true
            }
            fn current_revision(&self) -> Result<String, UpdateError> {
                unreachable!()
            }
            fn fetch(&self, _: &str) -> Result<(), UpdateError> {
                unreachable!()
            }
            fn reset_hard(&self, _: &str) -> Result<(), UpdateError> {
                unreachable!()
            }
            fn clean(&self) -> Result<(), UpdateError> {
                unreachable!()
            }
            fn changed_files(&self, _: &str, _: &str) -> Result<Vec<String>, UpdateError> {
                unreachable!()
            }
            fn mark_safe_directory(&self) -> Result<(), UpdateError> {
                Ok(())
            }
        }

        let report = ensure_writable(
            dir.path(),
            &identity(),
            &NoEscalator,
            &RecordingSafe,
            None,
        )
        .unwrap();
        assert!(report.writable);
        assert!(!report.repaired);
    }

    #[test]
    fn tree_writable_checks_all_locations() {
        let dir = tempfile::tempdir().unwrap();
        // No .git scaffold at all: root alone is not enough.
        assert!(!tree_writable(dir.path()));

        scaffold_repo(dir.path());
        assert!(tree_writable(dir.path()));
    }

    #[test]
    fn remedy_uses_the_numeric_chown_spec() {
        let remedy = chown_remedy(Path::new("/home/pi/dashboard"), &identity());
        assert_eq!(remedy, "sudo chown -R 1000:1000 /home/pi/dashboard");
    }

    #[test]
    fn git_cli_scaffold_counts_as_repository() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_repo(dir.path());
        assert!(GitCli::new(dir.path()).is_repository());
    }
}
