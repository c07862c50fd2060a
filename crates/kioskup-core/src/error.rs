//! Error types for the update pipeline.
//!
//! Every fatal variant carries the literal remedial command an operator
//! should run, because the only consumer of these messages is a log line
//! tailed on a headless device.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort an update run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// The configured root is not a git working tree.
    #[error(
        "{path} is not a git repository.\n\
         Clone the application first: git clone <remote-url> {path}"
    )]
    NotARepository {
        /// The path that was checked.
        path: PathBuf,
    },

    /// Writability could not be established by any available path.
    #[error(
        "repository is not writable and cannot be repaired without privileges.\n\
         Run once as an administrator: {remedy}"
    )]
    Permissions {
        /// The exact command that fixes ownership.
        remedy: String,
    },

    /// Fetching from the remote failed.
    #[error(
        "fetching from {remote} failed: {message}\n\
         Check network connectivity, then re-run the updater."
    )]
    Fetch {
        /// The remote that was fetched.
        remote: String,
        /// The underlying command error.
        message: String,
    },

    /// A hard reset failed.
    #[error("hard reset to {target} failed: {message}")]
    Reset {
        /// The revision or ref the reset targeted.
        target: String,
        /// The underlying command error.
        message: String,
    },

    /// Installing dependencies from the manifest failed.
    #[error(
        "dependency install from {manifest} failed: {message}\n\
         The application cannot run against the new revision; not rebooting."
    )]
    DependencyInstall {
        /// The manifest file that was being installed.
        manifest: String,
        /// The underlying command error.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("io error at {path}")]
    Io {
        /// The path the operation touched.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An external command failed in a context with no more specific variant.
    #[error("{action} failed: {message}")]
    Command {
        /// What the command was doing.
        action: String,
        /// The underlying command error.
        message: String,
    },
}

impl UpdateError {
    /// Wrap an io error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a failed external command.
    pub fn command(action: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Command {
            action: action.into(),
            message: err.to_string(),
        }
    }
}
