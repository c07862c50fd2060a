//! Conditional dependency installation.
//!
//! The application runs out of an isolated Python environment next to the
//! checkout. When an update changes the dependency manifest, the new code
//! cannot run against the old environment, so the install is fatal on
//! failure and gates the reboot.

use std::path::{Path, PathBuf};

use xshell::Shell;

use crate::error::UpdateError;
use crate::executor::UpdateReport;
use crate::vcs::VersionControl;

/// Installs dependencies from the manifest into the isolated environment.
pub trait DependencyInstaller {
    /// Create the environment if needed and install from the manifest.
    fn sync(&self) -> Result<(), UpdateError>;
}

/// Whether the manifest changed between the two revisions of an update.
///
/// The manifest lives at the repository root, so the comparison is against
/// the exact relative path, not a basename match somewhere in the tree.
///
/// # Errors
///
/// Propagates revision-diff failures from the version control backend.
pub fn manifest_changed(
    vcs: &dyn VersionControl,
    report: &UpdateReport,
    manifest: &str,
) -> Result<bool, UpdateError> {
    if report.previous_revision == report.new_revision {
        return Ok(false);
    }
    let changed = vcs.changed_files(&report.previous_revision, &report.new_revision)?;
    Ok(changed.iter().any(|path| path == manifest))
}

/// `python3 -m venv` + pip, optionally running as the repository owner.
pub struct VenvInstaller {
    venv_dir: PathBuf,
    manifest_path: PathBuf,
    run_as: Option<String>,
}

impl VenvInstaller {
    /// An installer for the given environment and manifest.
    pub fn new(venv_dir: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            venv_dir: venv_dir.into(),
            manifest_path: manifest_path.into(),
            run_as: None,
        }
    }

    /// Run the interpreter and pip as `user` through non-interactive sudo,
    /// so the environment stays owned by the desktop account.
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    fn run(&self, sh: &Shell, argv: &[&str]) -> Result<(), UpdateError> {
        let cmd = match &self.run_as {
            Some(user) => sh.cmd("sudo").args(["-n", "-u", user.as_str()]).args(argv),
            None => sh.cmd(argv[0]).args(&argv[1..]),
        };
        cmd.run().map_err(|e| UpdateError::DependencyInstall {
            manifest: self.manifest_path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl DependencyInstaller for VenvInstaller {
    fn sync(&self) -> Result<(), UpdateError> {
        let sh = Shell::new().map_err(|e| UpdateError::DependencyInstall {
            manifest: self.manifest_path.display().to_string(),
            message: e.to_string(),
        })?;

        let venv = utf8_path(&self.venv_dir)?;
        let manifest = utf8_path(&self.manifest_path)?;

        if !self.venv_dir.join("bin").join("pip").exists() {
            println!("  creating Python environment at {venv}");
            self.run(&sh, &["python3", "-m", "venv", venv])?;
        }

        let pip = self.venv_dir.join("bin").join("pip");
        let pip = utf8_path(&pip)?;
        println!("  installing dependencies from {manifest}");
        self.run(&sh, &[pip, "install", "-r", manifest])
    }
}

fn utf8_path(path: &Path) -> Result<&str, UpdateError> {
    path.to_str().ok_or_else(|| UpdateError::DependencyInstall {
        manifest: path.display().to_string(),
        message: "path is not UTF-8".to_string(),
    })
}
