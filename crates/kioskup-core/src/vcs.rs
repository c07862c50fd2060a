//! Version-control interface.
//!
//! The orchestration logic only ever talks to the [`VersionControl`] trait,
//! so the pipeline is testable without a real repository. [`GitCli`] is the
//! production implementation, shelling out to git the same way for every
//! operation; it can optionally run every command as another user through
//! non-interactive sudo (the elevated fallback path).

use std::path::{Path, PathBuf};

use xshell::Shell;

use crate::error::UpdateError;

/// The narrow set of repository operations the updater needs.
pub trait VersionControl {
    /// Whether the configured root is a version-controlled tree.
    fn is_repository(&self) -> bool;

    /// The revision the working tree is currently at.
    fn current_revision(&self) -> Result<String, UpdateError>;

    /// Fetch the named remote.
    fn fetch(&self, remote: &str) -> Result<(), UpdateError>;

    /// Hard-reset the working tree to `target`, discarding local changes.
    fn reset_hard(&self, target: &str) -> Result<(), UpdateError>;

    /// Remove untracked files and directories.
    fn clean(&self) -> Result<(), UpdateError>;

    /// Paths changed between two revisions.
    fn changed_files(&self, old: &str, new: &str) -> Result<Vec<String>, UpdateError>;

    /// Record the repository root as a trusted path in global
    /// version-control configuration, so the divergent-ownership safety
    /// check cannot block later operations.
    fn mark_safe_directory(&self) -> Result<(), UpdateError>;
}

/// git via the command line.
pub struct GitCli {
    root: PathBuf,
    run_as: Option<String>,
}

impl GitCli {
    /// git running as the current process.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            run_as: None,
        }
    }

    /// git running as `user` through non-interactive sudo.
    pub fn as_user(root: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            run_as: Some(user.into()),
        }
    }

    /// The repository root this instance operates on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, action: &str, git_args: &[&str]) -> Result<String, UpdateError> {
        let sh = Shell::new().map_err(|e| UpdateError::command(action, e))?;
        let root = self
            .root
            .to_str()
            .ok_or_else(|| UpdateError::command(action, "repository path is not UTF-8"))?;

        let cmd = match &self.run_as {
            Some(user) => sh
                .cmd("sudo")
                .args(["-n", "-u", user.as_str(), "git", "-C", root])
                .args(git_args),
            None => sh.cmd("git").args(["-C", root]).args(git_args),
        };

        cmd.read().map_err(|e| UpdateError::command(action, e))
    }
}

impl VersionControl for GitCli {
    fn is_repository(&self) -> bool {
        self.root.join(".git").exists()
    }

    fn current_revision(&self) -> Result<String, UpdateError> {
        self.run("reading current revision", &["rev-parse", "HEAD"])
            .map(|s| s.trim().to_string())
    }

    fn fetch(&self, remote: &str) -> Result<(), UpdateError> {
        self.run("fetch", &["fetch", remote])
            .map(|_| ())
            .map_err(|e| UpdateError::Fetch {
                remote: remote.to_string(),
                message: e.to_string(),
            })
    }

    fn reset_hard(&self, target: &str) -> Result<(), UpdateError> {
        self.run("reset", &["reset", "--hard", target])
            .map(|_| ())
            .map_err(|e| UpdateError::Reset {
                target: target.to_string(),
                message: e.to_string(),
            })
    }

    fn clean(&self) -> Result<(), UpdateError> {
        self.run("clean", &["clean", "-fd"]).map(|_| ())
    }

    fn changed_files(&self, old: &str, new: &str) -> Result<Vec<String>, UpdateError> {
        let output = self.run("diffing revisions", &["diff", "--name-only", old, new])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn mark_safe_directory(&self) -> Result<(), UpdateError> {
        let root = self.root.to_string_lossy().to_string();
        self.run(
            "marking safe.directory",
            &["config", "--global", "--add", "safe.directory", root.as_str()],
        )
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_repository_requires_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        assert!(!git.is_repository());

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(git.is_repository());
    }

    #[test]
    fn as_user_keeps_root() {
        let git = GitCli::as_user("/home/pi/dashboard", "pi");
        assert_eq!(git.root(), Path::new("/home/pi/dashboard"));
    }
}
