//! Non-interactive privilege escalation.
//!
//! Unattended maintenance cannot answer a password prompt, so the only
//! escalation we ever use is `sudo -n`. Availability is probed once and
//! the answer cached by the caller; a sudo that would prompt counts as
//! unavailable.

use std::path::Path;

use xshell::{cmd, Shell};

use crate::error::UpdateError;

/// A mechanism for running commands as another user without a prompt.
pub trait PrivilegeEscalator {
    /// Whether escalation can run right now without interaction.
    fn available(&self) -> bool;

    /// Run `argv` as root.
    fn run_root(&self, argv: &[&str]) -> Result<(), UpdateError>;

    /// Run `argv` as `user`, with `cwd` as the working directory.
    fn run_as(&self, user: &str, argv: &[&str], cwd: &Path) -> Result<(), UpdateError>;
}

/// `sudo -n` escalation.
pub struct SudoEscalator;

impl PrivilegeEscalator for SudoEscalator {
    fn available(&self) -> bool {
        let Ok(sh) = Shell::new() else {
            return false;
        };
        // `sudo -n true` fails fast when a password would be required.
        cmd!(sh, "sudo -n true").ignore_status().output().is_ok_and(|o| o.status.success())
    }

    fn run_root(&self, argv: &[&str]) -> Result<(), UpdateError> {
        let action = format!("sudo {}", argv.join(" "));
        let sh = Shell::new().map_err(|e| UpdateError::command(&action, e))?;
        sh.cmd("sudo")
            .arg("-n")
            .args(argv)
            .run()
            .map_err(|e| UpdateError::command(&action, e))
    }

    fn run_as(&self, user: &str, argv: &[&str], cwd: &Path) -> Result<(), UpdateError> {
        let action = format!("sudo -u {user} {}", argv.join(" "));
        let sh = Shell::new().map_err(|e| UpdateError::command(&action, e))?;
        let _dir = sh.push_dir(cwd);
        sh.cmd("sudo")
            .args(["-n", "-u", user])
            .args(argv)
            .run()
            .map_err(|e| UpdateError::command(&action, e))
    }
}

/// An escalator that reports itself unavailable and rejects every request.
///
/// Used when the host has no sudo at all, and by tests exercising the
/// no-escalation failure paths.
pub struct NoEscalator;

impl PrivilegeEscalator for NoEscalator {
    fn available(&self) -> bool {
        false
    }

    fn run_root(&self, argv: &[&str]) -> Result<(), UpdateError> {
        Err(UpdateError::command(
            format!("running {} as root", argv.join(" ")),
            "no non-interactive privilege escalation available",
        ))
    }

    fn run_as(&self, user: &str, argv: &[&str], _cwd: &Path) -> Result<(), UpdateError> {
        Err(UpdateError::command(
            format!("running {} as {user}", argv.join(" ")),
            "no non-interactive privilege escalation available",
        ))
    }
}
